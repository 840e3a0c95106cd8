//! Deterministic turn synchronization for simultaneous-turn grid games.
//!
//! `turn-core` coordinates many independently timed per-unit actions so that
//! a turn only advances once every action registered for it has finished.
//! It reserves destination cells so no two units are routed into the same
//! one, and gates player input to a single `(turn, window)` pair.
//!
//! The crate performs no I/O and never spawns tasks. Collaborators
//! (pathfinding, occupancy, the ability engine) are consumed through the
//! traits in [`env`], and completions are fed back in as
//! [`CompletionSignal`] values. [`TurnEngine`] wires every component together.
pub mod action;
pub mod barrier;
pub mod config;
pub mod context;
pub mod encoding;
pub mod engine;
pub mod env;
pub mod error;
pub mod flow;
pub mod guard;
pub mod input;
pub mod movement;
pub mod sequencer;
pub mod state;

pub use action::{ActionKind, ActionRequest, AttackTarget};
pub use barrier::{ActionBarrier, BarrierDump, CompletionOutcome, PendingEntry, TurnBarrier};
pub use config::TurnConfig;
pub use context::TurnContext;
pub use encoding::{
    DecodeError, Magnitude, decode_magnitude, pack_cell, pack_dir, pack_direction, unpack_cell,
    unpack_dir,
};
pub use engine::{
    CompletionSignal, EndOfPhase, EngineError, EngineSnapshot, SignalEffect, TurnEngine,
};
pub use env::{
    ActionExecutor, InertExecutor, MoveRejection, OccupancyService, PathfindingOracle,
    ServiceError, Services,
};
pub use error::{ErrorContext, ErrorSeverity, GameError};
pub use flow::{FlowSnapshot, TurnFlowCoordinator, TurnObserver};
pub use guard::{
    AdvanceBlocker, AdvanceCheck, GuardMetrics, GuardMetricsSnapshot, PhaseEndDecision,
    TurnAdvanceGuard,
};
pub use input::{
    Command, CommandGate, CommandKind, CommandOutcome, CommandRejection, DeclaredIntent,
    InputWindow, IntentBoard,
};
pub use movement::{
    DispatchError, DispatchOutcome, MoveDispatcher, ReservationError, ReservationTable,
    ResolvedMove,
};
pub use sequencer::{AttackEntry, AttackSequencer, SequencerStep};
pub use state::{
    ActionId, ActionMarker, ActionState, ActionTicket, Cell, ClearedMarkers, CompletionListener,
    Controller, Direction, Epoch, ListenerOwner, MarkerCounts, MarkerSet, UnitId, UnitKind,
    UnitRoster, UnitState, WindowId, WorldPos,
};
