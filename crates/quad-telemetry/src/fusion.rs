//! Fragment fusion.
//!
//! Keeps the last-known fragment of each kind and resolves them into one
//! canonical [`TelemetryFrame`]. A new fragment of a kind replaces the stored
//! one wholesale, whatever transport it came from.

use chrono::{DateTime, Utc};
use quad_domain::{
    AngleBlock, AnglesFragment, ControlBlock, ControlFragment, Fragment, FragmentKind, Mode,
    MotorBlock, MotorsFragment, TelemetryFrame,
};

/// Last-known fragment of each kind
#[derive(Debug, Clone, Default)]
pub struct FragmentStore {
    angles: Option<AnglesFragment>,
    control: Option<ControlFragment>,
    motors: Option<MotorsFragment>,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored fragment of the same kind
    pub fn put(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::Angles(f) => self.angles = Some(f),
            Fragment::Control(f) => self.control = Some(f),
            Fragment::Motors(f) => self.motors = Some(f),
        }
    }

    pub const fn angles(&self) -> Option<&AnglesFragment> {
        self.angles.as_ref()
    }

    pub const fn control(&self) -> Option<&ControlFragment> {
        self.control.as_ref()
    }

    pub const fn motors(&self) -> Option<&MotorsFragment> {
        self.motors.as_ref()
    }

    pub const fn has(&self, kind: FragmentKind) -> bool {
        match kind {
            FragmentKind::Angles => self.angles.is_some(),
            FragmentKind::Control => self.control.is_some(),
            FragmentKind::Motors => self.motors.is_some(),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Fusion state: stored fragments, the mode stamped on frames, and the
/// current outward-facing frame.
///
/// Mutation takes `&mut self`; callers sharing one instance between sources
/// put it behind a single lock (see [`crate::TelemetryHub`]).
#[derive(Debug, Clone, Default)]
pub struct TelemetryFusion {
    store: FragmentStore,
    mode: Mode,
    current: Option<TelemetryFrame>,
}

impl TelemetryFusion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fragment, re-fuse, and make the result the current frame.
    pub fn ingest(&mut self, fragment: Fragment) -> TelemetryFrame {
        self.store.put(fragment);
        let frame = self.fuse();
        self.current = Some(frame);
        frame
    }

    /// Fuse the stored fragments, stamped with the current wall-clock time.
    #[must_use]
    pub fn fuse(&self) -> TelemetryFrame {
        self.fuse_at(Utc::now())
    }

    /// Fuse the stored fragments with an explicit timestamp.
    ///
    /// Estimator variants (`*_est`) win over primary keys; anything never
    /// received reads as 0.
    #[must_use]
    pub fn fuse_at(&self, time: DateTime<Utc>) -> TelemetryFrame {
        TelemetryFrame {
            angles: self.store.angles().map(resolve_angles).unwrap_or_default(),
            control: self.store.control().map(resolve_control).unwrap_or_default(),
            motors: self.store.motors().map(resolve_motors).unwrap_or_default(),
            mode: self.mode,
            time,
        }
    }

    pub const fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Most recently published frame, if any fragment has arrived
    pub const fn current(&self) -> Option<&TelemetryFrame> {
        self.current.as_ref()
    }

    pub const fn store(&self) -> &FragmentStore {
        &self.store
    }

    pub fn reset(&mut self) {
        self.store.clear();
        self.current = None;
    }
}

fn pick(est: Option<f64>, primary: Option<f64>) -> f64 {
    est.or(primary).unwrap_or(0.0)
}

fn value(field: Option<f64>) -> f64 {
    field.unwrap_or(0.0)
}

fn resolve_angles(f: &AnglesFragment) -> AngleBlock {
    AngleBlock {
        angle_roll: pick(f.angle_roll_est, f.angle_roll),
        angle_pitch: pick(f.angle_pitch_est, f.angle_pitch),
        angle_yaw: pick(f.angle_yaw_est, f.angle_yaw),
        rate_roll: value(f.rate_roll),
        rate_pitch: value(f.rate_pitch),
        rate_yaw: value(f.rate_yaw),
        acc_x: value(f.acc_x),
        acc_y: value(f.acc_y),
        acc_z: value(f.acc_z),
        raw_roll: value(f.raw_roll),
        raw_pitch: value(f.raw_pitch),
        raw_yaw: value(f.raw_yaw),
    }
}

fn resolve_control(f: &ControlFragment) -> ControlBlock {
    ControlBlock {
        tau_x: value(f.tau_x),
        tau_y: value(f.tau_y),
        tau_z: value(f.tau_z),
        kalman_angle_roll: value(f.kalman_angle_roll),
        kalman_angle_pitch: value(f.kalman_angle_pitch),
        error_phi: value(f.error_phi),
        error_theta: value(f.error_theta),
        input_throttle: value(f.input_throttle),
        input_roll: value(f.input_roll),
        input_pitch: value(f.input_pitch),
        input_yaw: value(f.input_yaw),
    }
}

fn resolve_motors(f: &MotorsFragment) -> MotorBlock {
    MotorBlock {
        motor_input1: value(f.motor_input1),
        motor_input2: value(f.motor_input2),
        motor_input3: value(f.motor_input3),
        motor_input4: value(f.motor_input4),
        altura: value(f.altura),
        modo: value(f.modo),
    }
}
