//! Async orchestration around the deterministic turn engine.
//!
//! A single worker task owns the [`turn_core::TurnEngine`]; everything else
//! talks to it through [`RuntimeHandle`] messages. Completions produced by
//! the [`TaskExecutor`] (or any host executor holding a [`CompletionSender`])
//! flow back over a channel, and the advance guard's retry runs on a tokio
//! timer inside the worker loop.
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`events`] provides the topic-based event bus
//! - [`executor`] starts actions as timed tokio tasks
//! - [`oracle`] ships in-memory grid and occupancy services
//! - `workers` keeps the engine task internal to the crate
pub mod api;
pub mod events;
pub mod executor;
pub mod oracle;
pub mod runtime;

mod workers;

pub use api::{
    AiPlan, AiPlanner, ChasePlanner, CommandProvider, CompletionSender, HoldPositionPlanner,
    ProviderKind, Result, RuntimeError, RuntimeHandle, ScriptStep, ScriptedCommandProvider,
    WaitCommandProvider,
};
pub use events::{ActionEvent, DiagnosticEvent, Event, EventBus, Topic, TurnEvent};
pub use executor::{ExecutorTiming, TaskExecutor};
pub use oracle::{GridMap, GridParseError, OccupancyMap};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig, TurnReport};
pub use workers::{DispatchResults, RuntimeMetrics, RuntimeMetricsSnapshot};
