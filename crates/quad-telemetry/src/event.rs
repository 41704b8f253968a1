//! Outbound events delivered to telemetry observers.

use quad_domain::{Mode, SimulationFrame, TelemetryFrame};
use serde::Serialize;

/// Event fanned out to every observer subscribed to the hub
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum TelemetryEvent {
    /// Freshly fused frame
    #[serde(rename = "sensorUpdate")]
    Telemetry(TelemetryFrame),

    /// The authoritative mode changed
    #[serde(rename = "modo")]
    Mode(Mode),

    /// One simulation tick
    #[serde(rename = "datosSimulacion")]
    Simulation(SimulationFrame),

    #[serde(rename = "led")]
    Led { led: bool },

    #[serde(rename = "motors")]
    Motors { motors: bool },
}

impl TelemetryEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Telemetry(_) => "sensorUpdate",
            Self::Mode(_) => "modo",
            Self::Simulation(_) => "datosSimulacion",
            Self::Led { .. } => "led",
            Self::Motors { .. } => "motors",
        }
    }
}
