//! # Quadrotor Telemetry Station - Domain Model
//!
//! Value types shared by the flight-dynamics simulator and the telemetry
//! fusion pipeline. Wire names follow the vehicle firmware (`AngleRoll`,
//! `tau_x`, `MotorInput1`, ...) so frames can be forwarded to observers
//! without a translation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Number of rigid-body variables in the state vector
pub const STATE_DIM: usize = 12;

/// Control components at or above this magnitude are treated as garbage
pub const CONTROL_LIMIT: f64 = 1e4;

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// Rigid-body state vector.
///
/// Layout: position `(x, y, z)`, body-frame velocity `(u, v, w)`, Euler
/// attitude `(phi, theta, psi)` and body rates `(p, q, r)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct State([f64; STATE_DIM]);

impl State {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const Z: usize = 2;
    pub const U: usize = 3;
    pub const V: usize = 4;
    pub const W: usize = 5;
    pub const PHI: usize = 6;
    pub const THETA: usize = 7;
    pub const PSI: usize = 8;
    pub const P: usize = 9;
    pub const Q: usize = 10;
    pub const R: usize = 11;

    #[must_use]
    pub const fn new(values: [f64; STATE_DIM]) -> Self {
        Self(values)
    }

    /// All-zero state: at the origin, level and at rest
    #[must_use]
    pub const fn zero() -> Self {
        Self([0.0; STATE_DIM])
    }

    #[must_use]
    pub const fn as_array(&self) -> &[f64; STATE_DIM] {
        &self.0
    }

    #[must_use]
    pub const fn get(&self, index: usize) -> f64 {
        self.0[index]
    }

    /// Return a copy with one component replaced
    #[must_use]
    pub const fn with(mut self, index: usize, value: f64) -> Self {
        self.0[index] = value;
        self
    }

    #[must_use]
    pub const fn position(&self) -> (f64, f64, f64) {
        (self.0[Self::X], self.0[Self::Y], self.0[Self::Z])
    }

    #[must_use]
    pub const fn velocity(&self) -> (f64, f64, f64) {
        (self.0[Self::U], self.0[Self::V], self.0[Self::W])
    }

    /// Euler angles `(phi, theta, psi)` in radians
    #[must_use]
    pub const fn attitude(&self) -> (f64, f64, f64) {
        (self.0[Self::PHI], self.0[Self::THETA], self.0[Self::PSI])
    }

    /// Body angular rates `(p, q, r)` in rad/s
    #[must_use]
    pub const fn rates(&self) -> (f64, f64, f64) {
        (self.0[Self::P], self.0[Self::Q], self.0[Self::R])
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl Default for State {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<[f64; STATE_DIM]> for State {
    fn from(values: [f64; STATE_DIM]) -> Self {
        Self(values)
    }
}

/// Thrust and body torques applied for one integration step
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlInput {
    #[serde(rename = "T")]
    pub thrust: f64,
    pub tau_x: f64,
    pub tau_y: f64,
    pub tau_z: f64,
}

impl ControlInput {
    #[must_use]
    pub const fn new(thrust: f64, tau_x: f64, tau_y: f64, tau_z: f64) -> Self {
        Self {
            thrust,
            tau_x,
            tau_y,
            tau_z,
        }
    }

    /// Thrust equal to the vehicle weight, no torque
    #[must_use]
    pub fn hover(params: &VehicleParams) -> Self {
        Self::new(params.mass * params.g, 0.0, 0.0, 0.0)
    }

    /// Replace every non-finite or out-of-range component with zero.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            thrust: sanitize_control(self.thrust),
            tau_x: sanitize_control(self.tau_x),
            tau_y: sanitize_control(self.tau_y),
            tau_z: sanitize_control(self.tau_z),
        }
    }

    #[must_use]
    pub fn is_sane(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite() && v.abs() < CONTROL_LIMIT)
    }

    #[must_use]
    pub const fn as_array(&self) -> [f64; 4] {
        [self.thrust, self.tau_x, self.tau_y, self.tau_z]
    }
}

fn sanitize_control(value: f64) -> f64 {
    if value.is_finite() && value.abs() < CONTROL_LIMIT {
        value
    } else {
        0.0
    }
}

/// Mass properties and gravity used by the dynamics model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    #[serde(rename = "Ixx")]
    pub ixx: f64,
    #[serde(rename = "Iyy")]
    pub iyy: f64,
    #[serde(rename = "Izz")]
    pub izz: f64,
    pub mass: f64,
    pub g: f64,
}

impl VehicleParams {
    /// Check every parameter is physically usable.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidParams`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DomainError> {
        let positive = [
            ("Ixx", self.ixx),
            ("Iyy", self.iyy),
            ("Izz", self.izz),
            ("mass", self.mass),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(DomainError::InvalidParams {
                    field: field.to_string(),
                    value,
                });
            }
        }
        if !self.g.is_finite() || self.g < 0.0 {
            return Err(DomainError::InvalidParams {
                field: "g".to_string(),
                value: self.g,
            });
        }
        Ok(())
    }
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            ixx: 0.01,
            iyy: 0.01,
            izz: 0.02,
            mass: 1.0,
            g: 9.81,
        }
    }
}

/// Accelerometer/gyroscope-equivalent readings derived from one state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorFrame {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
}

// =============================================================================
// ENUMS
// =============================================================================

/// Vehicle operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Mode {
    Pilot = 0,
    #[default]
    Standby = 1,
    Manual = 2,
}

impl Mode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pilot => "PILOT",
            Self::Standby => "STANDBY",
            Self::Manual => "MANUAL",
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> Self {
        mode as Self
    }
}

impl TryFrom<u8> for Mode {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        <Self as TryFrom<i64>>::try_from(i64::from(value))
    }
}

impl TryFrom<i64> for Mode {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pilot),
            1 => Ok(Self::Standby),
            2 => Ok(Self::Manual),
            other => Err(DomainError::InvalidMode(other)),
        }
    }
}

/// Source tag of a telemetry fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Angles,
    Control,
    Motors,
}

impl FragmentKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Angles => "angles",
            Self::Control => "control",
            Self::Motors => "motors",
        }
    }
}

// =============================================================================
// FRAGMENTS
// =============================================================================

/// Attitude/IMU report. Absent fields are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnglesFragment {
    #[serde(rename = "RateRoll", skip_serializing_if = "Option::is_none")]
    pub rate_roll: Option<f64>,
    #[serde(rename = "RatePitch", skip_serializing_if = "Option::is_none")]
    pub rate_pitch: Option<f64>,
    #[serde(rename = "RateYaw", skip_serializing_if = "Option::is_none")]
    pub rate_yaw: Option<f64>,
    #[serde(rename = "AngleRoll", skip_serializing_if = "Option::is_none")]
    pub angle_roll: Option<f64>,
    #[serde(rename = "AngleRoll_est", skip_serializing_if = "Option::is_none")]
    pub angle_roll_est: Option<f64>,
    #[serde(rename = "AnglePitch", skip_serializing_if = "Option::is_none")]
    pub angle_pitch: Option<f64>,
    #[serde(rename = "AnglePitch_est", skip_serializing_if = "Option::is_none")]
    pub angle_pitch_est: Option<f64>,
    #[serde(rename = "AngleYaw", skip_serializing_if = "Option::is_none")]
    pub angle_yaw: Option<f64>,
    #[serde(rename = "AngleYaw_est", skip_serializing_if = "Option::is_none")]
    pub angle_yaw_est: Option<f64>,
    #[serde(rename = "RawRoll", skip_serializing_if = "Option::is_none")]
    pub raw_roll: Option<f64>,
    #[serde(rename = "RawPitch", skip_serializing_if = "Option::is_none")]
    pub raw_pitch: Option<f64>,
    #[serde(rename = "RawYaw", skip_serializing_if = "Option::is_none")]
    pub raw_yaw: Option<f64>,
    #[serde(rename = "AccX", skip_serializing_if = "Option::is_none")]
    pub acc_x: Option<f64>,
    #[serde(rename = "AccY", skip_serializing_if = "Option::is_none")]
    pub acc_y: Option<f64>,
    #[serde(rename = "AccZ", skip_serializing_if = "Option::is_none")]
    pub acc_z: Option<f64>,
}

/// Controller internals reported by the flight firmware
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlFragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tau_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tau_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tau_z: Option<f64>,
    #[serde(rename = "KalmanAngleRoll", skip_serializing_if = "Option::is_none")]
    pub kalman_angle_roll: Option<f64>,
    #[serde(rename = "KalmanAnglePitch", skip_serializing_if = "Option::is_none")]
    pub kalman_angle_pitch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_phi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_theta: Option<f64>,
    #[serde(rename = "InputThrottle", skip_serializing_if = "Option::is_none")]
    pub input_throttle: Option<f64>,
    #[serde(rename = "InputRoll", skip_serializing_if = "Option::is_none")]
    pub input_roll: Option<f64>,
    #[serde(rename = "InputPitch", skip_serializing_if = "Option::is_none")]
    pub input_pitch: Option<f64>,
    #[serde(rename = "InputYaw", skip_serializing_if = "Option::is_none")]
    pub input_yaw: Option<f64>,
}

/// Actuator commands, altitude and the firmware's own mode field
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorsFragment {
    #[serde(rename = "MotorInput1", skip_serializing_if = "Option::is_none")]
    pub motor_input1: Option<f64>,
    #[serde(rename = "MotorInput2", skip_serializing_if = "Option::is_none")]
    pub motor_input2: Option<f64>,
    #[serde(rename = "MotorInput3", skip_serializing_if = "Option::is_none")]
    pub motor_input3: Option<f64>,
    #[serde(rename = "MotorInput4", skip_serializing_if = "Option::is_none")]
    pub motor_input4: Option<f64>,
    #[serde(rename = "Altura", skip_serializing_if = "Option::is_none")]
    pub altura: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modo: Option<f64>,
}

/// One partial telemetry update, tagged by kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fragment {
    Angles(AnglesFragment),
    Control(ControlFragment),
    Motors(MotorsFragment),
}

impl Fragment {
    pub const fn kind(&self) -> FragmentKind {
        match self {
            Self::Angles(_) => FragmentKind::Angles,
            Self::Control(_) => FragmentKind::Control,
            Self::Motors(_) => FragmentKind::Motors,
        }
    }
}

// =============================================================================
// FUSED TELEMETRY
// =============================================================================

/// Resolved attitude/IMU block of a fused frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AngleBlock {
    #[serde(rename = "AngleRoll")]
    pub angle_roll: f64,
    #[serde(rename = "AnglePitch")]
    pub angle_pitch: f64,
    #[serde(rename = "AngleYaw")]
    pub angle_yaw: f64,
    #[serde(rename = "RateRoll")]
    pub rate_roll: f64,
    #[serde(rename = "RatePitch")]
    pub rate_pitch: f64,
    #[serde(rename = "RateYaw")]
    pub rate_yaw: f64,
    #[serde(rename = "AccX")]
    pub acc_x: f64,
    #[serde(rename = "AccY")]
    pub acc_y: f64,
    #[serde(rename = "AccZ")]
    pub acc_z: f64,
    #[serde(rename = "RawRoll")]
    pub raw_roll: f64,
    #[serde(rename = "RawPitch")]
    pub raw_pitch: f64,
    #[serde(rename = "RawYaw")]
    pub raw_yaw: f64,
}

/// Resolved controller block of a fused frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ControlBlock {
    pub tau_x: f64,
    pub tau_y: f64,
    pub tau_z: f64,
    #[serde(rename = "KalmanAngleRoll")]
    pub kalman_angle_roll: f64,
    #[serde(rename = "KalmanAnglePitch")]
    pub kalman_angle_pitch: f64,
    pub error_phi: f64,
    pub error_theta: f64,
    #[serde(rename = "InputThrottle")]
    pub input_throttle: f64,
    #[serde(rename = "InputRoll")]
    pub input_roll: f64,
    #[serde(rename = "InputPitch")]
    pub input_pitch: f64,
    #[serde(rename = "InputYaw")]
    pub input_yaw: f64,
}

/// Resolved actuator block of a fused frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MotorBlock {
    #[serde(rename = "MotorInput1")]
    pub motor_input1: f64,
    #[serde(rename = "MotorInput2")]
    pub motor_input2: f64,
    #[serde(rename = "MotorInput3")]
    pub motor_input3: f64,
    #[serde(rename = "MotorInput4")]
    pub motor_input4: f64,
    #[serde(rename = "Altura")]
    pub altura: f64,
    pub modo: f64,
}

/// Canonical telemetry record combining the latest fragment of each kind.
///
/// The `roll`/`pitch`/`yaw` aliases are not stored; they are read from the
/// angle block when the frame is serialized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub angles: AngleBlock,
    pub control: ControlBlock,
    pub motors: MotorBlock,
    pub mode: Mode,
    pub time: DateTime<Utc>,
}

impl TelemetryFrame {
    #[must_use]
    pub const fn roll(&self) -> f64 {
        self.angles.angle_roll
    }

    #[must_use]
    pub const fn pitch(&self) -> f64 {
        self.angles.angle_pitch
    }

    #[must_use]
    pub const fn yaw(&self) -> f64 {
        self.angles.angle_yaw
    }
}

impl Serialize for TelemetryFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(flatten)]
            angles: &'a AngleBlock,
            #[serde(flatten)]
            control: &'a ControlBlock,
            #[serde(flatten)]
            motors: &'a MotorBlock,
            roll: f64,
            pitch: f64,
            yaw: f64,
            mode: Mode,
            time: DateTime<Utc>,
        }

        Wire {
            angles: &self.angles,
            control: &self.control,
            motors: &self.motors,
            roll: self.roll(),
            pitch: self.pitch(),
            yaw: self.yaw(),
            mode: self.mode,
            time: self.time,
        }
        .serialize(serializer)
    }
}

/// One simulation tick as published to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationFrame {
    #[serde(rename = "AngleRoll")]
    pub angle_roll: f64,
    #[serde(rename = "AnglePitch")]
    pub angle_pitch: f64,
    #[serde(rename = "AngleYaw")]
    pub angle_yaw: f64,
    #[serde(rename = "AccX")]
    pub acc_x: f64,
    #[serde(rename = "AccY")]
    pub acc_y: f64,
    #[serde(rename = "AccZ")]
    pub acc_z: f64,
    #[serde(rename = "RateRoll")]
    pub rate_roll: f64,
    #[serde(rename = "RatePitch")]
    pub rate_pitch: f64,
    #[serde(rename = "RateYaw")]
    pub rate_yaw: f64,
    pub time: DateTime<Utc>,
    #[serde(rename = "simTime")]
    pub sim_time: f64,
    pub state: State,
    /// `[T, tau_x, tau_y, tau_z, roll, pitch, yaw]`
    pub inputs: [f64; 7],
}

impl SimulationFrame {
    /// The attitude/IMU part of this tick as an `angles` fragment
    #[must_use]
    pub const fn angles_fragment(&self) -> AnglesFragment {
        AnglesFragment {
            rate_roll: Some(self.rate_roll),
            rate_pitch: Some(self.rate_pitch),
            rate_yaw: Some(self.rate_yaw),
            angle_roll: Some(self.angle_roll),
            angle_roll_est: None,
            angle_pitch: Some(self.angle_pitch),
            angle_pitch_est: None,
            angle_yaw: Some(self.angle_yaw),
            angle_yaw_est: None,
            raw_roll: None,
            raw_pitch: None,
            raw_yaw: None,
            acc_x: Some(self.acc_x),
            acc_y: Some(self.acc_y),
            acc_z: Some(self.acc_z),
        }
    }
}

// =============================================================================
// DEVICE COMMANDS
// =============================================================================

/// Command payload sent to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceCommand {
    Mode { mode: Mode },
    Led { led: bool },
    Motors { motors: bool },
}

/// Wire envelope: `{"type": "command", "payload": {...}}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum DeviceEnvelope {
    Command(DeviceCommand),
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid mode: {0} (expected 0=pilot, 1=standby, 2=manual)")]
    InvalidMode(i64),

    #[error("Invalid vehicle parameter: {field}={value}")]
    InvalidParams { field: String, value: f64 },

    #[error("Invalid step size: {0} (must be finite and > 0)")]
    InvalidStepSize(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_zeroes_garbage() {
        let input = ControlInput::new(f64::NAN, 1e4, -2e4, 0.5);
        assert_eq!(input.sanitized(), ControlInput::new(0.0, 0.0, 0.0, 0.5));
        assert!(input.sanitized().is_sane());
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            ControlInput::new(9.81, 0.1, -0.2, 0.0),
            ControlInput::new(f64::INFINITY, f64::NEG_INFINITY, 9_999.0, -9_999.9),
        ];
        for input in inputs {
            let once = input.sanitized();
            assert_eq!(once.sanitized(), once);
        }
    }

    #[test]
    fn test_mode_conversion() {
        assert_eq!(Mode::try_from(0_u8), Ok(Mode::Pilot));
        assert_eq!(Mode::try_from(2_i64), Ok(Mode::Manual));
        assert_eq!(Mode::try_from(3_u8), Err(DomainError::InvalidMode(3)));
        assert_eq!(Mode::try_from(-1_i64), Err(DomainError::InvalidMode(-1)));
        assert_eq!(Mode::default(), Mode::Standby);
    }

    #[test]
    fn test_mode_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Mode::Manual).unwrap(), "2");
        assert!(serde_json::from_str::<Mode>("7").is_err());
    }

    #[test]
    fn test_params_partial_deserialize() {
        let params: VehicleParams = serde_json::from_str(r#"{"mass": 1.2, "Izz": 0.04}"#).unwrap();
        assert_eq!(params.mass, 1.2);
        assert_eq!(params.izz, 0.04);
        assert_eq!(params.ixx, 0.01);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_validation() {
        let params = VehicleParams {
            mass: 0.0,
            ..VehicleParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(DomainError::InvalidParams { ref field, .. }) if field == "mass"
        ));

        let params = VehicleParams {
            g: f64::NAN,
            ..VehicleParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_frame_serializes_aliases() {
        let frame = TelemetryFrame {
            angles: AngleBlock {
                angle_roll: 0.1,
                angle_pitch: -0.2,
                ..AngleBlock::default()
            },
            control: ControlBlock::default(),
            motors: MotorBlock::default(),
            mode: Mode::Standby,
            time: Utc::now(),
        };
        let json = serde_json::to_value(frame).unwrap();
        assert_eq!(json["AngleRoll"], 0.1);
        assert_eq!(json["roll"], 0.1);
        assert_eq!(json["pitch"], -0.2);
        assert_eq!(json["yaw"], 0.0);
        assert_eq!(json["MotorInput4"], 0.0);
        assert_eq!(json["mode"], 1);
    }

    #[test]
    fn test_command_envelope() {
        let cmd = DeviceEnvelope::Command(DeviceCommand::Mode { mode: Mode::Pilot });
        assert_eq!(
            serde_json::to_string(&cmd).unwrap(),
            r#"{"type":"command","payload":{"mode":0}}"#
        );
        let led = DeviceEnvelope::Command(DeviceCommand::Led { led: true });
        assert_eq!(
            serde_json::to_string(&led).unwrap(),
            r#"{"type":"command","payload":{"led":true}}"#
        );
    }
}
