//! Event types for different topics.

use serde::{Deserialize, Serialize};
use turn_core::{
    AdvanceCheck, Command, CommandOutcome, CompletionSignal, DispatchOutcome, Epoch, InputWindow,
    SequencerStep, SignalEffect, UnitId,
};

/// Turn flow and player input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TurnEvent {
    Started {
        epoch: Epoch,
    },
    Ended {
        epoch: Epoch,
    },
    WindowOpened {
        window: InputWindow,
    },
    CommandAccepted {
        unit: UnitId,
        command: Command,
        outcome: CommandOutcome,
    },
    CommandRejected {
        unit: UnitId,
        command: Command,
        code: String,
        message: String,
    },
    /// The guard let the epoch advance and the next window is open.
    Advanced {
        epoch: Epoch,
        window: InputWindow,
        forced_clear: bool,
    },
}

/// Per-unit action lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionEvent {
    MoveDispatched {
        unit: UnitId,
        outcome: DispatchOutcome,
    },
    MoveFailed {
        unit: UnitId,
        code: String,
        message: String,
    },
    AttackStep {
        step: SequencerStep,
    },
    /// A completion signal reached the engine.
    Completed {
        signal: CompletionSignal,
        effect: SignalEffect,
    },
}

/// Advance guard activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiagnosticEvent {
    /// Nothing registered for the epoch is pending anymore.
    PhaseQuiet { epoch: Epoch },
    RetryScheduled { epoch: Epoch, delay_ms: u64 },
    RetrySuppressed { epoch: Epoch },
    Stalled { epoch: Epoch, check: AdvanceCheck },
}
