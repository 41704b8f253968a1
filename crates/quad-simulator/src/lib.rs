//! # Quadrotor Simulator
//!
//! Nonlinear 6-DoF rigid-body simulation of a quadrotor, publishing frames
//! with the same shape as live device telemetry.
//!
//! ## Features
//!
//! - Rigid-body equations of motion over a 12-value state vector
//! - Fixed-step RK4 integration with control-input sanitization
//! - Accelerometer/gyroscope synthesis through a ZYX rotation
//! - Cancellable periodic clock with one session per process
//! - Ground station wiring device traffic, simulation and observers together

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod control;
pub mod dynamics;
pub mod error;
pub mod integrator;
pub mod sensor;
pub mod station;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use clock::{ClockConfig, FrameSink, SessionHandle, SimulationClock, SimulationStatus};
pub use config::Config;
pub use control::HeldControl;
pub use dynamics::DynamicsModel;
pub use error::{Result, SimulationError};
pub use integrator::{Rk4Integrator, StepSize};
pub use sensor::{sanitize_angle, synthesize};
pub use station::GroundStation;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
