//! Mode arbitration.
//!
//! One authoritative [`Mode`] per process. A change is an event: observers
//! are told first, then the vehicle. Unchanged writes are suppressed.

use std::sync::{Arc, Mutex};

use quad_domain::{DeviceCommand, Mode};
use tokio::sync::{broadcast, mpsc};

use crate::error::Result;
use crate::event::TelemetryEvent;
use crate::lock;

/// Outcome of a mode request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTransition {
    /// Requested mode was already current; nothing was emitted
    Unchanged(Mode),
    Changed { from: Mode, to: Mode },
}

impl ModeTransition {
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    pub const fn mode(&self) -> Mode {
        match self {
            Self::Unchanged(mode) | Self::Changed { to: mode, .. } => *mode,
        }
    }
}

/// Command channel to the vehicle.
///
/// Each connection gets a fresh receiver; a new connection replaces the old
/// one. Delivery is fire-and-forget with no queueing across disconnects.
#[derive(Debug, Default)]
pub struct DeviceChannel {
    tx: Mutex<Option<mpsc::UnboundedSender<DeviceCommand>>>,
}

impl DeviceChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new device connection
    pub fn connect(&self) -> mpsc::UnboundedReceiver<DeviceCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        if lock(&self.tx).replace(tx).is_some() {
            tracing::info!("Device connection replaced");
        }
        rx
    }

    pub fn disconnect(&self) {
        lock(&self.tx).take();
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.tx).as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Send a command. Returns `false` if no device is listening.
    pub fn send(&self, command: DeviceCommand) -> bool {
        let mut tx = lock(&self.tx);
        let Some(sender) = tx.as_ref() else {
            return false;
        };
        if sender.send(command).is_ok() {
            true
        } else {
            tracing::info!("Device receiver dropped, marking disconnected");
            *tx = None;
            false
        }
    }
}

/// Holder of the process-wide mode value
pub struct ModeArbiter {
    current: Mutex<Mode>,
    events: broadcast::Sender<TelemetryEvent>,
    device: Arc<DeviceChannel>,
}

impl ModeArbiter {
    /// Start in [`Mode::Standby`]
    pub fn new(
        events: broadcast::Sender<TelemetryEvent>,
        device: Arc<DeviceChannel>,
    ) -> Self {
        Self {
            current: Mutex::new(Mode::default()),
            events,
            device,
        }
    }

    pub fn current(&self) -> Mode {
        *lock(&self.current)
    }

    /// Run `f` with the current mode while holding the mode lock, so no
    /// change notification can interleave with whatever `f` emits.
    pub fn with_current<R>(&self, f: impl FnOnce(Mode) -> R) -> R {
        let current = lock(&self.current);
        f(*current)
    }

    /// Validate a raw mode value and apply it.
    ///
    /// # Errors
    ///
    /// Returns [`quad_domain::DomainError::InvalidMode`] (wrapped) for values
    /// outside `{0, 1, 2}`; the current mode is left untouched.
    pub fn request_change(&self, requested: i64) -> Result<ModeTransition> {
        let mode = Mode::try_from(requested).inspect_err(|err| {
            tracing::warn!(requested, error = %err, "Rejected mode change");
        })?;
        Ok(self.set(mode))
    }

    /// Apply a typed mode.
    ///
    /// Notifications are sent while the lock is held so that concurrent
    /// writers emit in the same order they changed the value.
    pub fn set(&self, mode: Mode) -> ModeTransition {
        let mut current = lock(&self.current);
        if *current == mode {
            tracing::debug!(mode = mode.as_str(), "Mode unchanged, not re-broadcast");
            return ModeTransition::Unchanged(mode);
        }

        let from = std::mem::replace(&mut *current, mode);

        // A send error only means nobody is subscribed right now
        let _ = self.events.send(TelemetryEvent::Mode(mode));
        let delivered = self.device.send(DeviceCommand::Mode { mode });

        tracing::info!(
            from = from.as_str(),
            to = mode.as_str(),
            device_delivered = delivered,
            "Mode changed"
        );

        ModeTransition::Changed { from, to: mode }
    }

    /// Connect a device and immediately push the current mode to it
    pub fn attach_device(&self) -> mpsc::UnboundedReceiver<DeviceCommand> {
        let rx = self.device.connect();
        self.repush();
        rx
    }

    /// Resend the current mode to the device. Returns whether it was delivered.
    pub fn repush(&self) -> bool {
        let current = lock(&self.current);
        self.device.send(DeviceCommand::Mode { mode: *current })
    }
}
