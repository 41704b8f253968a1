//! Control input held between ticks.
//!
//! The clock reads it once per tick. It is written by the session surface
//! and, while a session runs, by `control` fragments from the device.

use std::sync::Mutex;

use quad_domain::{ControlFragment, ControlInput};

use crate::lock;

#[derive(Debug, Default)]
pub struct HeldControl {
    current: Mutex<ControlInput>,
}

impl HeldControl {
    pub fn new(initial: ControlInput) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> ControlInput {
        *lock(&self.current)
    }

    pub fn set(&self, control: ControlInput) {
        *lock(&self.current) = control;
        tracing::debug!(?control, "Control input updated");
    }

    /// Overlay a device `control` fragment.
    ///
    /// `InputThrottle` drives thrust and `tau_*` drive the torques; absent
    /// fields keep their held value.
    pub fn apply_fragment(&self, fragment: &ControlFragment) -> ControlInput {
        let mut current = lock(&self.current);
        let next = ControlInput {
            thrust: fragment.input_throttle.unwrap_or(current.thrust),
            tau_x: fragment.tau_x.unwrap_or(current.tau_x),
            tau_y: fragment.tau_y.unwrap_or(current.tau_y),
            tau_z: fragment.tau_z.unwrap_or(current.tau_z),
        };
        *current = next;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_overlays_present_fields() {
        let held = HeldControl::new(ControlInput::new(9.81, 0.1, 0.2, 0.3));
        let applied = held.apply_fragment(&ControlFragment {
            tau_y: Some(-0.5),
            input_throttle: Some(12.0),
            kalman_angle_roll: Some(4.0),
            ..ControlFragment::default()
        });

        assert_eq!(applied, ControlInput::new(12.0, 0.1, -0.5, 0.3));
        assert_eq!(held.get(), applied);
    }

    #[test]
    fn test_set_replaces() {
        let held = HeldControl::default();
        held.set(ControlInput::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(held.get().as_array(), [1.0, 2.0, 3.0, 4.0]);
    }
}
