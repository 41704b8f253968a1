//! # Telemetry Hub
//!
//! Single entry point for every inbound source. Owns the fusion state behind
//! one mutex, the mode arbiter, the device command channel and the observer
//! broadcast.

use std::sync::{Arc, Mutex};

use quad_domain::{DeviceCommand, Fragment, Mode, SimulationFrame, TelemetryFrame};
use tokio::sync::{broadcast, mpsc};

use crate::error::Result;
use crate::event::TelemetryEvent;
use crate::fusion::TelemetryFusion;
use crate::lock;
use crate::mode::{DeviceChannel, ModeArbiter, ModeTransition};
use crate::transport::{self, InboundMessage};

/// Broadcast channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Result of ingesting one inbound message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ingested {
    Frame(TelemetryFrame),
    Mode(ModeTransition),
}

/// Shared telemetry state for device transports, the simulation clock and
/// observers.
///
/// Fragment writes from different sources are serialized by one lock and
/// resolve last-write-wins in arrival order.
pub struct TelemetryHub {
    fusion: Mutex<TelemetryFusion>,
    arbiter: ModeArbiter,
    device: Arc<DeviceChannel>,
    events: broadcast::Sender<TelemetryEvent>,
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let device = Arc::new(DeviceChannel::new());
        let arbiter = ModeArbiter::new(events.clone(), device.clone());

        Self {
            fusion: Mutex::new(TelemetryFusion::new()),
            arbiter,
            device,
            events,
        }
    }

    /// Subscribe an observer to every outbound event
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.events.subscribe()
    }

    /// Decode a raw device message and ingest everything it carries.
    ///
    /// # Errors
    ///
    /// Decode failures and invalid mode values. Messages decoded before an
    /// invalid one are still applied.
    pub fn ingest_text(&self, text: &str) -> Result<Vec<Ingested>> {
        transport::decode(text)?
            .into_iter()
            .map(|message| self.ingest(message))
            .collect()
    }

    /// Ingest one decoded message.
    ///
    /// # Errors
    ///
    /// Returns an error only for `state` messages carrying an invalid mode.
    pub fn ingest(&self, message: InboundMessage) -> Result<Ingested> {
        match message {
            InboundMessage::Fragment(fragment) => Ok(Ingested::Frame(self.ingest_fragment(fragment))),
            InboundMessage::State { mode } => self.request_mode(mode).map(Ingested::Mode),
        }
    }

    /// Store a fragment, re-fuse and broadcast the new current frame.
    ///
    /// Lock order is fusion, then mode. The frame is stamped and broadcast
    /// under both, so it never carries a mode older than the last `modo`
    /// event observers have seen.
    pub fn ingest_fragment(&self, fragment: Fragment) -> TelemetryFrame {
        let frame = {
            let mut fusion = lock(&self.fusion);
            self.arbiter.with_current(|mode| {
                fusion.set_mode(mode);
                let frame = fusion.ingest(fragment);
                let _ = self.events.send(TelemetryEvent::Telemetry(frame));
                frame
            })
        };

        tracing::trace!(kind = fragment.kind().as_str(), "Fragment fused");
        frame
    }

    /// Publish one simulation tick and fold its attitude block into the
    /// shared fragment store.
    pub fn publish_simulation(&self, frame: &SimulationFrame) -> TelemetryFrame {
        let _ = self.events.send(TelemetryEvent::Simulation(frame.clone()));
        self.ingest_fragment(Fragment::Angles(frame.angles_fragment()))
    }

    /// The current outward-facing frame, if any fragment has arrived
    pub fn current_frame(&self) -> Option<TelemetryFrame> {
        lock(&self.fusion).current().copied()
    }

    /// Fuse the stored fragments now without publishing
    pub fn fuse(&self) -> TelemetryFrame {
        let mut fusion = lock(&self.fusion);
        self.arbiter.with_current(|mode| {
            fusion.set_mode(mode);
            fusion.fuse()
        })
    }

    pub fn mode(&self) -> Mode {
        self.arbiter.current()
    }

    /// Validate and apply a raw mode value.
    ///
    /// # Errors
    ///
    /// Values outside `{0, 1, 2}` are rejected without any state change.
    pub fn request_mode(&self, requested: i64) -> Result<ModeTransition> {
        let transition = self.arbiter.request_change(requested)?;
        if transition.changed() {
            lock(&self.fusion).set_mode(transition.mode());
        }
        Ok(transition)
    }

    /// Apply an already-typed mode
    pub fn set_mode(&self, mode: Mode) -> ModeTransition {
        let transition = self.arbiter.set(mode);
        if transition.changed() {
            lock(&self.fusion).set_mode(mode);
        }
        transition
    }

    /// Register a device connection; the current mode is pushed at once
    pub fn connect_device(&self) -> mpsc::UnboundedReceiver<DeviceCommand> {
        tracing::info!(mode = self.mode().as_str(), "Device connected");
        self.arbiter.attach_device()
    }

    pub fn disconnect_device(&self) {
        self.device.disconnect();
        tracing::info!("Device disconnected");
    }

    pub fn device_connected(&self) -> bool {
        self.device.is_connected()
    }

    /// Resend the current mode to the device
    pub fn repush_mode(&self) -> bool {
        self.arbiter.repush()
    }

    /// Switch the vehicle's indicator LED and mirror it to observers
    pub fn send_led(&self, on: bool) -> bool {
        self.forward(DeviceCommand::Led { led: on }, TelemetryEvent::Led { led: on })
    }

    /// Arm or disarm the motors and mirror it to observers
    pub fn send_motors(&self, on: bool) -> bool {
        self.forward(
            DeviceCommand::Motors { motors: on },
            TelemetryEvent::Motors { motors: on },
        )
    }

    fn forward(&self, command: DeviceCommand, event: TelemetryEvent) -> bool {
        let delivered = self.device.send(command);
        if !delivered {
            tracing::debug!(event = event.name(), "No device connected, command dropped");
        }
        let _ = self.events.send(event);
        delivered
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quad_domain::State;
    use tokio_test::{assert_err, assert_ok};

    fn drain(rx: &mut broadcast::Receiver<TelemetryEvent>) -> Vec<TelemetryEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_inject_motors_then_angles() {
        let hub = TelemetryHub::new();
        assert_ok!(hub.ingest_text(r#"{"type":"motors","payload":{"MotorInput1":1500}}"#));
        assert_ok!(hub.ingest_text(r#"{"type":"angles","payload":{"AngleRoll":0.1}}"#));

        let frame = hub.fuse();
        assert_eq!(frame.motors.motor_input1, 1500.0);
        assert_eq!(frame.angles.angle_roll, 0.1);
        assert_eq!(frame.roll(), 0.1);
        assert_eq!(frame.motors.motor_input2, 0.0);
        assert_eq!(frame.motors.motor_input3, 0.0);
        assert_eq!(frame.motors.motor_input4, 0.0);
    }

    #[test]
    fn test_every_fragment_republishes() {
        let hub = TelemetryHub::new();
        let mut rx = hub.subscribe();

        hub.ingest_text(r#"{"type":"control","payload":{"tau_x":0.2}}"#).unwrap();
        hub.ingest_text(r#"{"type":"control","payload":{"tau_x":0.3}}"#).unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        let TelemetryEvent::Telemetry(last) = events[1] else {
            panic!("expected a telemetry event");
        };
        assert_eq!(last.control.tau_x, 0.3);
        assert_eq!(hub.current_frame(), Some(last));
    }

    #[test]
    fn test_state_message_drives_mode() {
        let hub = TelemetryHub::new();
        let mut rx = hub.subscribe();
        let mut device_rx = hub.connect_device();
        assert_eq!(
            device_rx.try_recv().unwrap(),
            DeviceCommand::Mode { mode: Mode::Standby }
        );

        let result = assert_ok!(hub.ingest_text(r#"{"type":"state","payload":{"mode":0}}"#));
        assert_eq!(
            result,
            vec![Ingested::Mode(ModeTransition::Changed {
                from: Mode::Standby,
                to: Mode::Pilot
            })]
        );
        assert_ok!(hub.ingest_text(r#"{"type":"state","payload":{"mode":0}}"#));

        assert_eq!(drain(&mut rx), vec![TelemetryEvent::Mode(Mode::Pilot)]);
        assert_eq!(
            device_rx.try_recv().unwrap(),
            DeviceCommand::Mode { mode: Mode::Pilot }
        );
        assert!(device_rx.try_recv().is_err());

        let frame = hub.ingest_fragment(Fragment::Angles(quad_domain::AnglesFragment::default()));
        assert_eq!(frame.mode, Mode::Pilot);
    }

    #[test]
    fn test_invalid_state_is_rejected() {
        let hub = TelemetryHub::new();
        let err = assert_err!(hub.ingest_text(r#"{"type":"state","payload":{"mode":5}}"#));
        assert_eq!(err.error_code(), "INVALID_MODE");
        assert_eq!(hub.mode(), Mode::Standby);
    }

    #[test]
    fn test_simulation_shares_fragment_store() {
        let hub = TelemetryHub::new();
        let mut rx = hub.subscribe();
        hub.ingest_text(r#"{"type":"angles","payload":{"AngleRoll":0.9,"RawRoll":0.8}}"#)
            .unwrap();

        let sim = SimulationFrame {
            angle_roll: 0.05,
            angle_pitch: 0.0,
            angle_yaw: 0.0,
            acc_x: 0.0,
            acc_y: 0.0,
            acc_z: 0.0,
            rate_roll: 0.0,
            rate_pitch: 0.0,
            rate_yaw: 0.0,
            time: Utc::now(),
            sim_time: 0.03,
            state: State::zero(),
            inputs: [0.0; 7],
        };
        let frame = hub.publish_simulation(&sim);

        // Last write wins; the simulator never reports raw angles
        assert_eq!(frame.roll(), 0.05);
        assert_eq!(frame.angles.raw_roll, 0.0);

        let names: Vec<_> = drain(&mut rx).iter().map(TelemetryEvent::name).collect();
        assert_eq!(names, vec!["sensorUpdate", "datosSimulacion", "sensorUpdate"]);
    }

    #[test]
    fn test_led_without_device_still_reaches_observers() {
        let hub = TelemetryHub::new();
        let mut rx = hub.subscribe();
        assert!(!hub.send_led(true));
        assert_eq!(drain(&mut rx), vec![TelemetryEvent::Led { led: true }]);

        let mut device_rx = hub.connect_device();
        let _ = device_rx.try_recv();
        assert!(hub.send_motors(false));
        assert_eq!(
            device_rx.try_recv().unwrap(),
            DeviceCommand::Motors { motors: false }
        );
    }

    #[test]
    fn test_frames_never_lag_mode_events() {
        let hub = TelemetryHub::with_capacity(8192);
        let mut rx = hub.subscribe();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..500 {
                    hub.request_mode([0, 2][i % 2]).unwrap();
                }
            });
            scope.spawn(|| {
                for _ in 0..1000 {
                    hub.ingest_fragment(Fragment::Motors(quad_domain::MotorsFragment::default()));
                }
            });
        });

        let mut announced = Mode::Standby;
        for event in drain(&mut rx) {
            match event {
                TelemetryEvent::Mode(mode) => announced = mode,
                TelemetryEvent::Telemetry(frame) => assert_eq!(frame.mode, announced),
                other => panic!("unexpected event {}", other.name()),
            }
        }
        assert_eq!(hub.fuse().mode, hub.mode());
    }

    #[tokio::test]
    async fn test_observer_receives_fused_frame() {
        let hub = Arc::new(TelemetryHub::new());
        let mut rx = hub.subscribe();

        let writer = hub.clone();
        tokio::spawn(async move {
            writer
                .ingest_text("0,0.2,0.1,0,0,0,0,0,0,9.8,0,0,0,0,0,0,0,0,0,0,0,1000,1000,1000,1000,0,1")
                .unwrap();
        })
        .await
        .unwrap();

        let mut last = None;
        for _ in 0..3 {
            if let TelemetryEvent::Telemetry(frame) = rx.recv().await.unwrap() {
                last = Some(frame);
            }
        }
        let frame = last.unwrap();
        assert_eq!(frame.roll(), 0.2);
        assert_eq!(frame.motors.motor_input4, 1000.0);
        assert_eq!(frame.motors.modo, 1.0);
    }
}
