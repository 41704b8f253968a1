//! # Simulation Clock
//!
//! Periodic driver for one simulation session at a time.
//!
//! ```text
//!   start() ──► spawn task ──► interval (30 ms) ──► tick ──► FrameSink
//!                   ▲                                │
//!   stop()  ── watch signal                          ▼
//!                                        integrate ► synthesize ► history
//! ```
//!
//! A tick runs synchronously under the session lock, so ticks never overlap
//! and `stop` lands between ticks, never inside one.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use quad_domain::{ControlInput, SimulationFrame, State, VehicleParams};
use quad_telemetry::TelemetryHub;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::control::HeldControl;
use crate::error::{Result, SimulationError};
use crate::integrator::{Rk4Integrator, StepSize};
use crate::lock;
use crate::sensor::{sanitize_angle, synthesize};

/// Nominal wall-clock tick period
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(30);

/// Destination for published simulation frames
pub trait FrameSink: Send + Sync {
    fn publish(&self, frame: &SimulationFrame);
}

impl FrameSink for TelemetryHub {
    fn publish(&self, frame: &SimulationFrame) {
        self.publish_simulation(frame);
    }
}

/// Clock timing and retention settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockConfig {
    tick_period: Duration,
    step: StepSize,
    history_limit: Option<NonZeroUsize>,
}

impl ClockConfig {
    /// # Errors
    ///
    /// [`SimulationError::InvalidTickPeriod`] for a zero period.
    pub fn new(tick_period: Duration, step: StepSize) -> Result<Self> {
        if tick_period.is_zero() {
            return Err(SimulationError::InvalidTickPeriod);
        }
        Ok(Self {
            tick_period,
            step,
            history_limit: None,
        })
    }

    /// Keep at most `limit` frames, dropping the oldest first
    #[must_use]
    pub const fn with_history_limit(mut self, limit: Option<NonZeroUsize>) -> Self {
        self.history_limit = limit;
        self
    }

    pub const fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub const fn step(&self) -> StepSize {
        self.step
    }

    pub const fn history_limit(&self) -> Option<NonZeroUsize> {
        self.history_limit
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            step: StepSize::default(),
            history_limit: None,
        }
    }
}

/// Returned by a successful start
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub params: VehicleParams,
    pub started_at: DateTime<Utc>,
}

/// Snapshot of the most recent session
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatus {
    pub running: bool,
    pub session_id: Option<Uuid>,
    pub sim_time: f64,
    pub ticks: u64,
}

struct Session {
    id: Uuid,
    params: VehicleParams,
    integrator: Rk4Integrator,
    state: State,
    sim_time: f64,
    ticks: u64,
    started_at: DateTime<Utc>,
    stop: watch::Sender<bool>,
}

#[derive(Default)]
struct Inner {
    running: bool,
    session: Option<Session>,
    history: VecDeque<SimulationFrame>,
}

/// Process-wide simulation clock; at most one session runs at a time.
pub struct SimulationClock {
    inner: Arc<Mutex<Inner>>,
    control: Arc<HeldControl>,
    sink: Arc<dyn FrameSink>,
    config: ClockConfig,
}

impl SimulationClock {
    pub fn new(config: ClockConfig, control: Arc<HeldControl>, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            control,
            sink,
            config,
        }
    }

    pub const fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Start a session from `initial` (all zeros if `None`).
    ///
    /// Simulation time and history are reset and the held control input is
    /// set to hover thrust for `params`.
    ///
    /// # Errors
    ///
    /// - [`SimulationError::AlreadyRunning`] if a session is active
    /// - [`SimulationError::Invalid`] for unusable vehicle parameters
    /// - [`SimulationError::InvalidInitialState`] for non-finite initial state
    /// - [`SimulationError::NoRuntime`] outside a Tokio runtime
    pub fn start(&self, params: VehicleParams, initial: Option<State>) -> Result<SessionHandle> {
        params.validate()?;
        let state = initial.unwrap_or_default();
        if !state.is_finite() {
            return Err(SimulationError::InvalidInitialState);
        }

        let mut inner = lock(&self.inner);
        if let Some(session) = inner.session.as_ref().filter(|_| inner.running) {
            return Err(SimulationError::AlreadyRunning {
                session_id: session.id,
            });
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SimulationError::NoRuntime)?;

        let (stop, stop_rx) = watch::channel(false);
        let session = Session {
            id: Uuid::new_v4(),
            params,
            integrator: Rk4Integrator::new(params),
            state,
            sim_time: 0.0,
            ticks: 0,
            started_at: Utc::now(),
            stop,
        };
        let handle = SessionHandle {
            session_id: session.id,
            params,
            started_at: session.started_at,
        };

        self.control.set(ControlInput::hover(&params));
        inner.history.clear();
        inner.session = Some(session);
        inner.running = true;

        runtime.spawn(run(
            self.inner.clone(),
            self.control.clone(),
            self.sink.clone(),
            self.config,
            handle.session_id,
            stop_rx,
        ));

        tracing::info!(
            session_id = %handle.session_id,
            mass = params.mass,
            g = params.g,
            tick_ms = self.config.tick_period.as_millis(),
            dt = self.config.step.seconds(),
            "Simulation started"
        );
        Ok(handle)
    }

    /// Stop the running session. No tick runs after this returns.
    ///
    /// # Errors
    ///
    /// [`SimulationError::NotRunning`] when idle.
    pub fn stop(&self) -> Result<()> {
        let mut inner = lock(&self.inner);
        if !inner.running {
            return Err(SimulationError::NotRunning);
        }
        inner.running = false;

        if let Some(session) = &inner.session {
            // The task also exits if the receiver sees the sender dropped
            let _ = session.stop.send(true);
            tracing::info!(
                session_id = %session.id,
                ticks = session.ticks,
                sim_time = session.sim_time,
                "Simulation stopped"
            );
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner).running
    }

    pub fn status(&self) -> SimulationStatus {
        let inner = lock(&self.inner);
        let session = inner.session.as_ref();
        SimulationStatus {
            running: inner.running,
            session_id: session.map(|s| s.id),
            sim_time: session.map_or(0.0, |s| s.sim_time),
            ticks: session.map_or(0, |s| s.ticks),
        }
    }

    /// Frames published since the last start, oldest first
    pub fn history(&self) -> Vec<SimulationFrame> {
        lock(&self.inner).history.iter().cloned().collect()
    }

    /// Last integrated state of the most recent session
    pub fn state(&self) -> Option<State> {
        lock(&self.inner).session.as_ref().map(|s| s.state)
    }

    pub fn control(&self) -> ControlInput {
        self.control.get()
    }

    /// Replace the control input read by subsequent ticks
    pub fn set_control(&self, control: ControlInput) {
        self.control.set(control);
    }
}

async fn run(
    inner: Arc<Mutex<Inner>>,
    control: Arc<HeldControl>,
    sink: Arc<dyn FrameSink>,
    config: ClockConfig,
    session_id: Uuid,
    mut stop: watch::Receiver<bool>,
) {
    let period = config.tick_period;
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,
            _ = interval.tick() => {
                if !tick(&inner, &control, sink.as_ref(), &config, session_id) {
                    break;
                }
            }
        }
    }

    tracing::debug!(%session_id, "Simulation task exited");
}

/// One integration/publish cycle. Returns `false` once the session is over.
fn tick(
    inner: &Mutex<Inner>,
    control: &HeldControl,
    sink: &dyn FrameSink,
    config: &ClockConfig,
    session_id: Uuid,
) -> bool {
    let mut guard = lock(inner);
    let Inner {
        running,
        session,
        history,
    } = &mut *guard;
    let Some(session) = session.as_mut().filter(|s| *running && s.id == session_id) else {
        return false;
    };

    let held = control.get();
    let applied = held.sanitized();
    if applied != held {
        tracing::debug!(%session_id, ?held, ?applied, "Held control clamped for this tick");
    }
    let next = session.integrator.step(&session.state, applied, config.step);
    if next.is_finite() {
        session.state = next;
    } else {
        tracing::warn!(
            %session_id,
            ticks = session.ticks,
            "Non-finite state discarded, holding previous"
        );
    }

    let sensor = synthesize(&session.state, &applied, &session.params);
    let roll = sanitize_angle(sensor.roll);
    let pitch = sanitize_angle(sensor.pitch);
    let yaw = sanitize_angle(sensor.yaw);

    session.sim_time += config.tick_period.as_secs_f64();
    session.ticks += 1;

    let [thrust, tau_x, tau_y, tau_z] = applied.as_array();
    let frame = SimulationFrame {
        angle_roll: roll,
        angle_pitch: pitch,
        angle_yaw: yaw,
        acc_x: sensor.ax,
        acc_y: sensor.ay,
        acc_z: sensor.az,
        rate_roll: sensor.gx,
        rate_pitch: sensor.gy,
        rate_yaw: sensor.gz,
        time: Utc::now(),
        sim_time: session.sim_time,
        state: session.state,
        inputs: [thrust, tau_x, tau_y, tau_z, roll, pitch, yaw],
    };

    if let Some(limit) = config.history_limit {
        while history.len() >= limit.get() {
            history.pop_front();
        }
    }
    history.push_back(frame.clone());

    tracing::trace!(%session_id, ticks = session.ticks, sim_time = session.sim_time, "Tick");
    sink.publish(&frame);
    true
}
