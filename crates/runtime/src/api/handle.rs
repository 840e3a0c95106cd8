//! Cloneable façade for issuing commands to the runtime.
//!
//! [`RuntimeHandle`] hides channel plumbing and offers async helpers for
//! driving turn phases or streaming events from specific topics.
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use turn_core::{
    AttackTarget, BarrierDump, Cell, CommandOutcome, CompletionSignal, EndOfPhase,
    EngineSnapshot, InputWindow, SequencerStep, UnitId, UnitRoster,
};

use super::errors::{Result, RuntimeError};
use crate::events::{Event, EventBus, Topic};
use crate::workers::{Command, DispatchResults, RuntimeMetrics};

/// Feeds completion signals to the turn worker.
///
/// Hosts with their own ability engine clone this and report every started
/// action through it.
#[derive(Clone, Debug)]
pub struct CompletionSender {
    tx: mpsc::UnboundedSender<CompletionSignal>,
}

impl CompletionSender {
    pub fn new(tx: mpsc::UnboundedSender<CompletionSignal>) -> Self {
        Self { tx }
    }

    pub fn send(&self, signal: CompletionSignal) -> Result<()> {
        self.tx
            .send(signal)
            .map_err(|_| RuntimeError::CompletionChannelClosed)
    }
}

/// Client-facing handle to interact with the runtime
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: mpsc::Sender<Command>,
    completions: CompletionSender,
    event_bus: EventBus,
    metrics: Arc<RuntimeMetrics>,
}

impl RuntimeHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<Command>,
        completions: CompletionSender,
        event_bus: EventBus,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        Self {
            command_tx,
            completions,
            event_bus,
            metrics,
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Start the first turn (or the resumed one) and open its input window.
    pub async fn start(&self) -> Result<InputWindow> {
        self.request(|reply| Command::Start { reply }).await
    }

    /// Open a fresh input window for the current turn.
    pub async fn open_input_window(&self) -> Result<InputWindow> {
        self.request(|reply| Command::OpenWindow { reply }).await
    }

    pub async fn input_window(&self) -> Result<InputWindow> {
        self.request(|reply| Command::QueryWindow { reply }).await
    }

    /// Submit a player command against the open input window.
    pub async fn submit_command(
        &self,
        unit: UnitId,
        command: turn_core::Command,
    ) -> Result<CommandOutcome> {
        self.request(|reply| Command::SubmitCommand {
            unit,
            command,
            reply,
        })
        .await?
    }

    /// Declare and reserve an AI unit's step for this turn.
    pub async fn declare_ai_move(&self, unit: UnitId, next: Cell) -> Result<()> {
        self.request(|reply| Command::DeclareAiMove { unit, next, reply })
            .await?
    }

    pub async fn plan_attack(&self, attacker: UnitId, target: AttackTarget) -> Result<()> {
        self.request(|reply| Command::PlanAttack {
            attacker,
            target,
            reply,
        })
        .await
    }

    pub async fn dispatch_move_phase(&self) -> Result<DispatchResults> {
        self.request(|reply| Command::DispatchMovePhase { reply })
            .await
    }

    pub async fn begin_attack_phase(&self) -> Result<SequencerStep> {
        self.request(|reply| Command::BeginAttackPhase { reply })
            .await
    }

    /// Wait until every action registered for the current turn completed.
    pub async fn wait_for_quiet(&self) -> Result<()> {
        self.request(|reply| Command::AwaitQuiet { reply }).await
    }

    /// Ask the advance guard to end the current phase.
    ///
    /// When the guard schedules a retry this resolves after the retry ran.
    pub async fn end_phase(&self) -> Result<EndOfPhase> {
        self.request(|reply| Command::EndPhase { reply }).await
    }

    /// Query the current unit roster (read-only copy)
    pub async fn units(&self) -> Result<UnitRoster> {
        self.request(|reply| Command::QueryUnits { reply }).await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        self.request(|reply| Command::QuerySnapshot { reply }).await
    }

    /// Pending barrier actions of the current turn, for diagnostics.
    pub async fn barrier_dump(&self) -> Result<BarrierDump> {
        self.request(|reply| Command::QueryBarrier { reply }).await
    }

    /// Report a completion for an action started by a host executor.
    pub fn signal(&self, signal: CompletionSignal) -> Result<()> {
        self.completions.send(signal)
    }

    pub fn completion_sender(&self) -> CompletionSender {
        self.completions.clone()
    }

    /// Subscribe to events from a specific topic
    ///
    /// # Topics
    ///
    /// - `Topic::Turn` - Turn boundaries, windows and commands
    /// - `Topic::Action` - Dispatches, attack steps and completions
    /// - `Topic::Diagnostics` - Guard retries, stalls and quiescence
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Subscribe to multiple topics at once
    pub fn subscribe_multiple(
        &self,
        topics: &[Topic],
    ) -> std::collections::HashMap<Topic, broadcast::Receiver<Event>> {
        self.event_bus.subscribe_multiple(topics)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn metrics(&self) -> Arc<RuntimeMetrics> {
        Arc::clone(&self.metrics)
    }
}
