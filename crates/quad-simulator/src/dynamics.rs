//! Rigid-body equations of motion.
//!
//! ```text
//!   state  [x y z | u v w | φ θ ψ | p q r]
//!            pos    body    euler    body
//!                   vel     ZYX      rates
//! ```
//!
//! Position rates are taken directly from (u, v, w). Trigonometric terms are
//! evaluated from the state passed in, so every RK4 stage sees the attitude
//! of its own evaluation point.

use quad_domain::{ControlInput, STATE_DIM, State, VehicleParams};

/// Time derivative of [`State`], same layout
pub type Derivative = [f64; STATE_DIM];

/// Nonlinear 6-DoF quadrotor model for one vehicle parameter set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicsModel {
    params: VehicleParams,
}

impl DynamicsModel {
    pub const fn new(params: VehicleParams) -> Self {
        Self { params }
    }

    pub const fn params(&self) -> &VehicleParams {
        &self.params
    }

    /// Evaluate `ẋ = f(x, u)`.
    ///
    /// The control input is used as given; callers sanitize it first.
    #[must_use]
    pub fn derivative(&self, state: &State, control: &ControlInput) -> Derivative {
        let VehicleParams {
            ixx,
            iyy,
            izz,
            mass,
            g,
        } = self.params;

        let (u, v, w) = state.velocity();
        let (phi, theta, _) = state.attitude();
        let (p, q, r) = state.rates();

        let (s_phi, c_phi) = phi.sin_cos();
        let (s_theta, c_theta) = theta.sin_cos();
        let t_theta = theta.tan();

        let u_dot = r * v - q * w - g * s_theta;
        let v_dot = p * w - r * u + g * c_theta * s_phi;
        let w_dot = q * u - p * v + g * c_theta * c_phi + control.thrust / mass;

        let phi_dot = p + (q * s_phi + r * c_phi) * t_theta;
        let theta_dot = q * c_phi - r * s_phi;
        let psi_dot = (q * s_phi + r * c_phi) / c_theta;

        let p_dot = ((iyy - izz) * q * r + control.tau_x) / ixx;
        let q_dot = ((izz - ixx) * p * r + control.tau_y) / iyy;
        let r_dot = ((ixx - iyy) * p * q + control.tau_z) / izz;

        [
            u, v, w, u_dot, v_dot, w_dot, phi_dot, theta_dot, psi_dot, p_dot, q_dot, r_dot,
        ]
    }
}
