//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from worker coordination, the turn engine, and the
//! command/AI providers so clients can bubble them up with consistent context.
use std::fmt;

use thiserror::Error;
use tokio::sync::oneshot;
use turn_core::{EngineError, ErrorSeverity, GameError, UnitId};

use crate::oracle::GridParseError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{kind} provider not set")]
    ProviderNotSet { kind: ProviderKind },

    #[error("{kind} provider failed: {message}")]
    Provider {
        kind: ProviderKind,
        message: String,
    },

    #[error("turn worker command channel closed")]
    CommandChannelClosed,

    #[error("completion channel closed")]
    CompletionChannelClosed,

    #[error("turn worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("turn worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("runtime requires a unit roster with at least one unit")]
    MissingUnits,

    #[error("runtime requires a grid map before building")]
    MissingGrid,

    #[error(transparent)]
    Grid(#[from] GridParseError),

    #[error("player unit {0} is not in the roster")]
    MissingPlayer(UnitId),

    #[error("input window rejected {attempts} commands in a row")]
    InputAttemptsExhausted { attempts: u32 },
}

impl RuntimeError {
    /// True when the failure came from the engine refusing a request rather
    /// than from the runtime plumbing.
    pub fn is_engine_rejection(&self) -> bool {
        matches!(
            self,
            Self::Engine(err)
                if matches!(err.severity(), ErrorSeverity::Recoverable | ErrorSeverity::Validation)
        )
    }

    /// Stable code for logs and client summaries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Engine(err) => err.error_code(),
            Self::ProviderNotSet { .. } => "RUNTIME_PROVIDER_NOT_SET",
            Self::Provider { .. } => "RUNTIME_PROVIDER_FAILED",
            Self::CommandChannelClosed => "RUNTIME_COMMAND_CHANNEL_CLOSED",
            Self::CompletionChannelClosed => "RUNTIME_COMPLETION_CHANNEL_CLOSED",
            Self::ReplyChannelClosed(_) => "RUNTIME_REPLY_CHANNEL_CLOSED",
            Self::WorkerJoin(_) => "RUNTIME_WORKER_JOIN",
            Self::MissingUnits => "RUNTIME_MISSING_UNITS",
            Self::MissingGrid => "RUNTIME_MISSING_GRID",
            Self::Grid(_) => "RUNTIME_GRID_PARSE",
            Self::MissingPlayer(_) => "RUNTIME_MISSING_PLAYER",
            Self::InputAttemptsExhausted { .. } => "RUNTIME_INPUT_ATTEMPTS_EXHAUSTED",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    Player,
    Ai,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderKind::Player => "player command",
            ProviderKind::Ai => "ai planner",
        };
        write!(f, "{}", label)
    }
}
