//! Quadrotor Simulation Runner
//!
//! Runs one simulation session against an in-process ground station,
//! optionally replaying recorded device traffic alongside it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use quad_domain::{ControlInput, VehicleParams};
use quad_simulator::{Config, GroundStation};
use quad_telemetry::TelemetryEvent;
use quad_telemetry::transport::encode_command;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "quad-sim")]
#[command(about = "Run a quadrotor flight-dynamics simulation session")]
struct Args {
    /// Number of ticks to run
    #[arg(short, long, default_value = "100")]
    ticks: u64,

    /// Tick period in milliseconds (overrides SIM_TICK_MS)
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Vehicle mass in kg
    #[arg(long)]
    mass: Option<f64>,

    /// Gravity in m/s²
    #[arg(long)]
    g: Option<f64>,

    /// Roll inertia
    #[arg(long)]
    ixx: Option<f64>,

    /// Pitch inertia
    #[arg(long)]
    iyy: Option<f64>,

    /// Yaw inertia
    #[arg(long)]
    izz: Option<f64>,

    /// Constant thrust; hover thrust when omitted
    #[arg(long)]
    thrust: Option<f64>,

    /// Constant body torques
    #[arg(long, num_args = 3, value_names = ["TAU_X", "TAU_Y", "TAU_Z"], allow_negative_numbers = true)]
    torque: Option<Vec<f64>>,

    /// Request this mode (0=pilot, 1=standby, 2=manual) before the first tick
    #[arg(long)]
    mode: Option<i64>,

    /// Device log to replay, one message per tick
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Print every outbound event as a JSON line
    #[arg(long)]
    json: bool,
}

impl Args {
    fn params(&self) -> VehicleParams {
        let defaults = VehicleParams::default();
        VehicleParams {
            ixx: self.ixx.unwrap_or(defaults.ixx),
            iyy: self.iyy.unwrap_or(defaults.iyy),
            izz: self.izz.unwrap_or(defaults.izz),
            mass: self.mass.unwrap_or(defaults.mass),
            g: self.g.unwrap_or(defaults.g),
        }
    }

    fn control(&self, params: &VehicleParams) -> Option<ControlInput> {
        if self.thrust.is_none() && self.torque.is_none() {
            return None;
        }
        let thrust = self.thrust.unwrap_or_else(|| ControlInput::hover(params).thrust);
        let torque = self.torque.as_deref().unwrap_or(&[0.0, 0.0, 0.0]);
        Some(ControlInput::new(thrust, torque[0], torque[1], torque[2]))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut config = Config::from_env();
    init_tracing(&config);

    let args = Args::parse();
    if let Some(tick_ms) = args.tick_ms {
        config.tick_ms = tick_ms;
    }

    let replay: Vec<String> = match &args.replay {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading replay file {}", path.display()))?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(String::from)
            .collect(),
        None => Vec::new(),
    };

    let station = GroundStation::new(config.clock_config()?, config.channel_capacity);
    let mut events = station.hub().subscribe();
    let mut device = station.hub().connect_device();

    let params = args.params();
    let session = station.clock().start(params, None)?;
    info!(
        session_id = %session.session_id,
        ticks = args.ticks,
        tick_ms = config.tick_ms,
        replay_lines = replay.len(),
        "Simulation session running"
    );

    if let Some(control) = args.control(&params) {
        station.clock().set_control(control);
    }
    if let Some(mode) = args.mode {
        station.hub().request_mode(mode)?;
    }

    let mut replay = replay.into_iter();
    let mut ticks = 0_u64;

    while ticks < args.ticks {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping simulation");
                break;
            }
        };

        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event observer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        tracing::debug!(event = event.name(), "Event published");
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
        }

        if let TelemetryEvent::Simulation(frame) = &event {
            ticks += 1;
            if ticks % 30 == 0 {
                info!(
                    tick = ticks,
                    sim_time = frame.sim_time,
                    roll = frame.angle_roll,
                    pitch = frame.angle_pitch,
                    yaw = frame.angle_yaw,
                    "Simulation progress"
                );
            }

            if let Some(line) = replay.next() {
                // Rejected lines are logged by the station
                let _ = station.handle_device_message(&line);
            }
        }

        while let Ok(command) = device.try_recv() {
            info!(command = %encode_command(command)?, "Command to vehicle");
        }
    }

    station.clock().stop()?;

    let status = station.clock().status();
    let history = station.clock().history();
    info!(
        ticks = status.ticks,
        sim_time = status.sim_time,
        frames = history.len(),
        mode = station.hub().mode().as_str(),
        "Simulation complete"
    );
    if let Some(state) = station.clock().state() {
        let (x, y, z) = state.position();
        let (phi, theta, psi) = state.attitude();
        info!(x, y, z, phi, theta, psi, "Final state");
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
