//! Worker tasks that back the runtime orchestration.
//!
//! The turn worker exclusively owns the engine; every other component
//! reaches it through channel messages.

mod metrics;
mod turn;

pub use metrics::{RuntimeMetrics, RuntimeMetricsSnapshot};
pub use turn::{Command, DispatchResults, TurnWorker};
