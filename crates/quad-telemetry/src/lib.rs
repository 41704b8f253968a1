//! # Quadrotor Telemetry Pipeline
//!
//! Merges fragmentary device reports into one authoritative telemetry frame
//! and keeps a single operating mode consistent between vehicle and
//! observers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │   Device transport       │   │   Simulation clock       │
//! │ (JSON envelope / CSV)    │   │   (datosSimulacion)      │
//! └──────────────────────────┘   └──────────────────────────┘
//!              │ transport::decode            │ publish_simulation
//!              ▼                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TelemetryHub                           │
//! │   Mutex<TelemetryFusion>          ModeArbiter               │
//! │   (FragmentStore, last-write-wins) (single mode value)      │
//! └─────────────────────────────────────────────────────────────┘
//!              │ broadcast                    │ mpsc
//!              ▼                              ▼
//!        Observers (sensorUpdate, modo)   Vehicle (command)
//! ```
//!
//! Every operation here is synchronous and non-blocking. Writers are
//! serialized by the hub's mutexes, so concurrent sources resolve by
//! arrival order.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod event;
pub mod fusion;
pub mod hub;
pub mod mode;
pub mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use error::{Result, TelemetryError};
pub use event::TelemetryEvent;
pub use fusion::{FragmentStore, TelemetryFusion};
pub use hub::{DEFAULT_CHANNEL_CAPACITY, Ingested, TelemetryHub};
pub use mode::{DeviceChannel, ModeArbiter, ModeTransition};
pub use transport::InboundMessage;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every guarded value here is replaced wholesale, so a poisoned lock never
/// exposes a half-written record.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
