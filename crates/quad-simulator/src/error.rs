//! Simulation session error types

use quad_domain::DomainError;
use thiserror::Error;
use uuid::Uuid;

/// Simulation control errors
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Simulation already running (session {session_id})")]
    AlreadyRunning { session_id: Uuid },

    #[error("No simulation running")]
    NotRunning,

    #[error("Initial state must contain 12 finite values")]
    InvalidInitialState,

    #[error("Tick period must be non-zero")]
    InvalidTickPeriod,

    #[error("History limit must be at least 1 (leave unset for unbounded)")]
    InvalidHistoryLimit,

    #[error("Simulation clock requires a Tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl SimulationError {
    /// Stable code for the outer HTTP layer
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning { .. } => "ALREADY_RUNNING",
            Self::NotRunning => "NOT_RUNNING",
            Self::InvalidInitialState => "INVALID_INITIAL_STATE",
            Self::InvalidTickPeriod => "INVALID_TICK_PERIOD",
            Self::InvalidHistoryLimit => "INVALID_HISTORY_LIMIT",
            Self::NoRuntime => "NO_RUNTIME",
            Self::Invalid(DomainError::InvalidMode(_)) => "INVALID_MODE",
            Self::Invalid(DomainError::InvalidStepSize(_)) => "INVALID_STEP_SIZE",
            Self::Invalid(_) => "INVALID_PARAMS",
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
