//! Fixed-step fourth-order Runge-Kutta integration

use std::array;

use quad_domain::{ControlInput, DomainError, STATE_DIM, State, VehicleParams};

use crate::dynamics::{Derivative, DynamicsModel};

/// Integration step in seconds, always finite and strictly positive
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct StepSize(f64);

impl StepSize {
    /// # Errors
    ///
    /// [`DomainError::InvalidStepSize`] for zero, negative or non-finite values.
    pub fn new(seconds: f64) -> Result<Self, DomainError> {
        if seconds.is_finite() && seconds > 0.0 {
            Ok(Self(seconds))
        } else {
            Err(DomainError::InvalidStepSize(seconds))
        }
    }

    pub const fn seconds(self) -> f64 {
        self.0
    }
}

impl Default for StepSize {
    /// 10 ms
    fn default() -> Self {
        Self(0.01)
    }
}

impl TryFrom<f64> for StepSize {
    type Error = DomainError;

    fn try_from(seconds: f64) -> Result<Self, Self::Error> {
        Self::new(seconds)
    }
}

/// RK4 stepper bound to one [`DynamicsModel`].
///
/// Stateless between calls: the caller owns the state and decides what to
/// keep. Identical inputs give bit-identical outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rk4Integrator {
    model: DynamicsModel,
}

impl Rk4Integrator {
    pub const fn new(params: VehicleParams) -> Self {
        Self {
            model: DynamicsModel::new(params),
        }
    }

    pub const fn model(&self) -> &DynamicsModel {
        &self.model
    }

    /// Advance `state` by one step of `dt` under `control`.
    ///
    /// Control components that are non-finite or at least `1e4` in magnitude
    /// are replaced by 0 before any stage is evaluated.
    #[must_use]
    pub fn step(&self, state: &State, control: ControlInput, dt: StepSize) -> State {
        let control = if control.is_sane() {
            control
        } else {
            let sanitized = control.sanitized();
            tracing::debug!(?control, ?sanitized, "Control input clamped before integration");
            sanitized
        };

        let h = dt.seconds();
        let f = |s: &State| self.model.derivative(s, &control);

        let k1 = f(state);
        let k2 = f(&offset(state, &k1, h / 2.0));
        let k3 = f(&offset(state, &k2, h / 2.0));
        let k4 = f(&offset(state, &k3, h));

        let x = state.as_array();
        State::new(array::from_fn(|i| {
            x[i] + h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i])
        }))
    }

    /// Apply `steps` consecutive steps with a constant control input
    #[must_use]
    pub fn advance(&self, state: &State, control: ControlInput, dt: StepSize, steps: usize) -> State {
        (0..steps).fold(*state, |s, _| self.step(&s, control, dt))
    }
}

fn offset(state: &State, k: &Derivative, scale: f64) -> State {
    let x = state.as_array();
    State::new(array::from_fn::<f64, STATE_DIM, _>(|i| x[i] + scale * k[i]))
}
