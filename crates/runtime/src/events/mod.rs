//! Topic-based event bus for runtime events.
//!
//! Events are published to specific topics, and consumers subscribe only to
//! the topics they need.

mod bus;
mod observer;
mod types;

pub use bus::{Event, EventBus, Topic};
pub(crate) use observer::BusObserver;
pub use types::{ActionEvent, DiagnosticEvent, TurnEvent};
