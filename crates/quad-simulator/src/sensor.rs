//! Accelerometer and gyroscope synthesis from integrated state.

use std::f64::consts::TAU;

use quad_domain::{ControlInput, SensorFrame, State, VehicleParams};

/// Angles beyond this magnitude are treated as garbage and zeroed
pub const ANGLE_GARBAGE_LIMIT: f64 = 1e3;

/// 3x3 rotation, row-major
pub type Rotation = [[f64; 3]; 3];

/// ZYX (yaw, pitch, roll) body-to-inertial rotation
#[must_use]
pub fn rotation_matrix(phi: f64, theta: f64, psi: f64) -> Rotation {
    let (s_phi, c_phi) = phi.sin_cos();
    let (s_theta, c_theta) = theta.sin_cos();
    let (s_psi, c_psi) = psi.sin_cos();

    [
        [
            c_psi * c_theta,
            c_psi * s_theta * s_phi - s_psi * c_phi,
            c_psi * s_theta * c_phi + s_psi * s_phi,
        ],
        [
            s_psi * c_theta,
            s_psi * s_theta * s_phi + c_psi * c_phi,
            s_psi * s_theta * c_phi - c_psi * s_phi,
        ],
        [-s_theta, c_theta * s_phi, c_theta * c_phi],
    ]
}

/// Derive sensor readings from a post-integration state.
///
/// The specific force `[0, 0, T/mass - g]` is projected through the ZYX
/// rotation; gyro rates and angles are copied from the state in radians.
#[must_use]
pub fn synthesize(state: &State, control: &ControlInput, params: &VehicleParams) -> SensorFrame {
    let (phi, theta, psi) = state.attitude();
    let (p, q, r) = state.rates();
    let rotation = rotation_matrix(phi, theta, psi);
    let fz = control.thrust / params.mass - params.g;

    SensorFrame {
        roll: phi,
        pitch: theta,
        yaw: psi,
        ax: rotation[0][2] * fz,
        ay: rotation[1][2] * fz,
        az: rotation[2][2] * fz,
        gx: p,
        gy: q,
        gz: r,
    }
}

/// Zero garbage angles and clamp the rest to `[-2π, 2π]`.
#[must_use]
pub fn sanitize_angle(angle: f64) -> f64 {
    let sanitized = if !angle.is_finite() || angle.abs() > ANGLE_GARBAGE_LIMIT {
        0.0
    } else {
        angle.clamp(-TAU, TAU)
    };
    if sanitized.to_bits() != angle.to_bits() {
        tracing::debug!(angle, sanitized, "Angle output sanitized");
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn debug_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (result, logs)
    }

    const EPS: f64 = 1e-12;

    #[test]
    fn test_level_hover_reads_zero_specific_force() {
        let params = VehicleParams::default();
        let frame = synthesize(&State::zero(), &ControlInput::hover(&params), &params);
        assert!(frame.ax.abs() < EPS);
        assert!(frame.ay.abs() < EPS);
        assert!(frame.az.abs() < EPS);
    }

    #[test]
    fn test_free_fall_reads_minus_g() {
        let params = VehicleParams::default();
        let frame = synthesize(&State::zero(), &ControlInput::default(), &params);
        assert_eq!(frame.az, -9.81);
    }

    #[test]
    fn test_roll_moves_force_to_lateral_axis() {
        let params = VehicleParams::default();
        let state = State::zero().with(State::PHI, FRAC_PI_2);
        let frame = synthesize(&state, &ControlInput::default(), &params);
        // fz * (sψ sθ cφ - cψ sφ) with ψ = θ = 0, φ = π/2
        assert!((frame.ay - 9.81).abs() < EPS);
        assert!(frame.az.abs() < EPS);
    }

    #[test]
    fn test_copies_rates_and_angles() {
        let state = State::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1, -0.2, 0.3, 1.0, 2.0, 3.0]);
        let params = VehicleParams::default();
        let frame = synthesize(&state, &ControlInput::default(), &params);
        assert_eq!((frame.roll, frame.pitch, frame.yaw), (0.1, -0.2, 0.3));
        assert_eq!((frame.gx, frame.gy, frame.gz), (1.0, 2.0, 3.0));
    }

    #[test]
    fn test_rotation_is_orthonormal() {
        let rot = rotation_matrix(0.4, -0.7, 2.1);
        for i in 0..3 {
            for j in 0..3 {
                let dot: f64 = (0..3).map(|k| rot[i][k] * rot[j][k]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < EPS, "R Rᵀ[{i}][{j}] = {dot}");
            }
        }
    }

    #[test]
    fn test_angle_sanitization_is_logged() {
        let (clamped, logs) = debug_logs(|| sanitize_angle(7.0));
        assert_eq!(clamped, TAU);
        assert!(logs.contains("Angle output sanitized"));

        let (kept, logs) = debug_logs(|| sanitize_angle(0.5));
        assert_eq!(kept, 0.5);
        assert!(!logs.contains("Angle output sanitized"));
    }

    #[test]
    fn test_sanitize_angle() {
        assert_eq!(sanitize_angle(0.5), 0.5);
        assert_eq!(sanitize_angle(7.0), TAU);
        assert_eq!(sanitize_angle(-7.0), -TAU);
        assert_eq!(sanitize_angle(999.0), TAU);
        assert_eq!(sanitize_angle(1_000.5), 0.0);
        assert_eq!(sanitize_angle(f64::NAN), 0.0);
        assert_eq!(sanitize_angle(f64::NEG_INFINITY), 0.0);
    }
}
