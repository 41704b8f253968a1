//! # Ground Station
//!
//! Wires one [`TelemetryHub`] and one [`SimulationClock`] together.
//!
//! ```text
//!   device text ──► decode ──► TelemetryHub ──► observers
//!                     │             ▲
//!                     │ control     │ datosSimulacion + angles
//!                     ▼             │
//!                HeldControl ──► SimulationClock
//! ```

use std::sync::Arc;

use quad_domain::Fragment;
use quad_telemetry::transport::{self, InboundMessage};
use quad_telemetry::{Ingested, TelemetryHub};

use crate::clock::{ClockConfig, SimulationClock};
use crate::control::HeldControl;

pub struct GroundStation {
    hub: Arc<TelemetryHub>,
    clock: SimulationClock,
    control: Arc<HeldControl>,
}

impl GroundStation {
    pub fn new(config: ClockConfig, channel_capacity: usize) -> Self {
        let hub = Arc::new(TelemetryHub::with_capacity(channel_capacity));
        let control = Arc::new(HeldControl::default());
        let clock = SimulationClock::new(config, control.clone(), hub.clone());
        Self {
            hub,
            clock,
            control,
        }
    }

    pub const fn hub(&self) -> &Arc<TelemetryHub> {
        &self.hub
    }

    pub const fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Route one raw device message.
    ///
    /// While a session runs, `control` fragments also drive the held control
    /// input of the next tick.
    ///
    /// # Errors
    ///
    /// Undecodable text, unknown envelope types and invalid `state` modes.
    pub fn handle_device_message(&self, text: &str) -> quad_telemetry::Result<Vec<Ingested>> {
        let messages = transport::decode(text).inspect_err(|err| {
            tracing::warn!(error = %err, code = err.error_code(), "Device message dropped");
        })?;
        let mut ingested = Vec::with_capacity(messages.len());

        for message in messages {
            if let InboundMessage::Fragment(Fragment::Control(fragment)) = &message {
                if self.clock.is_running() {
                    let control = self.control.apply_fragment(fragment);
                    tracing::debug!(?control, "Device control applied to simulation");
                }
            }
            ingested.push(self.hub.ingest(message)?);
        }
        Ok(ingested)
    }
}
