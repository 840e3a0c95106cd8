//! Turn worker that owns the authoritative [`TurnEngine`].
//!
//! Receives commands from [`RuntimeHandle`](crate::RuntimeHandle) and
//! completion signals from executors, applies them to the engine one at a
//! time, publishes events, and runs the advance guard's retry timer.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use turn_core::{
    AttackTarget, BarrierDump, Cell, CommandOutcome, CompletionSignal, DispatchOutcome,
    EndOfPhase, EngineError, EngineSnapshot, Epoch, GameError, InputWindow, SequencerStep,
    SignalEffect, TurnBarrier, TurnEngine, UnitId, UnitRoster,
};

use super::metrics::RuntimeMetrics;
use crate::api::{Result, RuntimeError};
use crate::events::{ActionEvent, DiagnosticEvent, EventBus, TurnEvent};
use crate::executor::saturating_millis;

pub type DispatchResults = Vec<(UnitId, std::result::Result<DispatchOutcome, EngineError>)>;

/// Commands that can be sent to the turn worker
pub enum Command {
    /// Start the first turn (or the resumed one) and open its input window.
    Start {
        reply: oneshot::Sender<InputWindow>,
    },
    /// Mint a fresh window for the current epoch.
    OpenWindow {
        reply: oneshot::Sender<InputWindow>,
    },
    SubmitCommand {
        unit: UnitId,
        command: turn_core::Command,
        reply: oneshot::Sender<Result<CommandOutcome>>,
    },
    DeclareAiMove {
        unit: UnitId,
        next: Cell,
        reply: oneshot::Sender<Result<()>>,
    },
    PlanAttack {
        attacker: UnitId,
        target: AttackTarget,
        reply: oneshot::Sender<()>,
    },
    DispatchMovePhase {
        reply: oneshot::Sender<DispatchResults>,
    },
    BeginAttackPhase {
        reply: oneshot::Sender<SequencerStep>,
    },
    /// Resolves once nothing registered for the epoch is pending.
    AwaitQuiet { reply: oneshot::Sender<()> },
    /// Resolves with the guard's final answer; a scheduled retry is awaited.
    EndPhase {
        reply: oneshot::Sender<EndOfPhase>,
    },
    QueryWindow {
        reply: oneshot::Sender<InputWindow>,
    },
    QueryUnits {
        reply: oneshot::Sender<UnitRoster>,
    },
    QuerySnapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },
    QueryBarrier {
        reply: oneshot::Sender<BarrierDump>,
    },
}

/// Background task that serializes every engine mutation.
pub struct TurnWorker {
    engine: TurnEngine,
    command_rx: mpsc::Receiver<Command>,
    completion_rx: mpsc::UnboundedReceiver<CompletionSignal>,
    event_bus: EventBus,
    metrics: Arc<RuntimeMetrics>,
    quiet: bool,
    quiet_waiters: Vec<oneshot::Sender<()>>,
    end_waiters: Vec<oneshot::Sender<EndOfPhase>>,
    retry_deadline: Option<Instant>,
    turn_started: Instant,
}

impl TurnWorker {
    pub fn new(
        engine: TurnEngine,
        command_rx: mpsc::Receiver<Command>,
        completion_rx: mpsc::UnboundedReceiver<CompletionSignal>,
        event_bus: EventBus,
        metrics: Arc<RuntimeMetrics>,
    ) -> Self {
        info!(
            target: "runtime::worker",
            units = engine.units().len(),
            epoch = %engine.epoch(),
            "turn worker initialized"
        );

        Self {
            engine,
            command_rx,
            completion_rx,
            event_bus,
            metrics,
            quiet: true,
            quiet_waiters: Vec::new(),
            end_waiters: Vec::new(),
            retry_deadline: None,
            turn_started: Instant::now(),
        }
    }

    /// Main worker loop. Exits once every command sender is dropped.
    pub async fn run(mut self) {
        loop {
            let deadline = self.retry_deadline;
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(signal) = self.completion_rx.recv() => {
                    self.handle_signal(signal);
                }
                () = retry_timer(deadline), if deadline.is_some() => {
                    self.fire_retry();
                }
            }
        }
        debug!(target: "runtime::worker", epoch = %self.engine.epoch(), "turn worker stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { reply } => {
                let window = self.engine.start();
                self.turn_started = Instant::now();
                self.event_bus.publish(TurnEvent::WindowOpened { window });
                respond(reply, window, "Start");
            }
            Command::OpenWindow { reply } => {
                let window = self.engine.open_input_window();
                self.event_bus.publish(TurnEvent::WindowOpened { window });
                respond(reply, window, "OpenWindow");
            }
            Command::SubmitCommand {
                unit,
                command,
                reply,
            } => {
                let result = self.submit(unit, command);
                respond(reply, result, "SubmitCommand");
            }
            Command::DeclareAiMove { unit, next, reply } => {
                let result = self
                    .engine
                    .declare_ai_move(unit, next)
                    .map_err(RuntimeError::from);
                respond(reply, result, "DeclareAiMove");
            }
            Command::PlanAttack {
                attacker,
                target,
                reply,
            } => {
                self.engine.plan_attack(attacker, target);
                respond(reply, (), "PlanAttack");
            }
            Command::DispatchMovePhase { reply } => {
                let results = self.dispatch_move_phase();
                respond(reply, results, "DispatchMovePhase");
            }
            Command::BeginAttackPhase { reply } => {
                let step = self.engine.begin_attack_phase();
                self.event_bus.publish(ActionEvent::AttackStep { step });
                self.observe_pending();
                self.check_quiet();
                respond(reply, step, "BeginAttackPhase");
            }
            Command::AwaitQuiet { reply } => {
                if self.engine.is_phase_quiet() {
                    respond(reply, (), "AwaitQuiet");
                } else {
                    self.quiet_waiters.push(reply);
                }
            }
            Command::EndPhase { reply } => self.end_phase(reply),
            Command::QueryWindow { reply } => {
                respond(reply, self.engine.input_window(), "QueryWindow");
            }
            Command::QueryUnits { reply } => {
                respond(reply, self.engine.units().clone(), "QueryUnits");
            }
            Command::QuerySnapshot { reply } => {
                respond(reply, self.engine.snapshot(), "QuerySnapshot");
            }
            Command::QueryBarrier { reply } => {
                let dump = self.engine.barrier().dump(self.engine.epoch());
                respond(reply, dump, "QueryBarrier");
            }
        }
    }

    fn submit(&mut self, unit: UnitId, command: turn_core::Command) -> Result<CommandOutcome> {
        match self.engine.submit_command(unit, command) {
            Ok(outcome) => {
                self.metrics.record_command(true);
                self.event_bus.publish(TurnEvent::CommandAccepted {
                    unit,
                    command,
                    outcome,
                });
                Ok(outcome)
            }
            Err(err) => {
                self.metrics.record_command(false);
                self.event_bus.publish(TurnEvent::CommandRejected {
                    unit,
                    command,
                    code: err.error_code().to_owned(),
                    message: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    fn dispatch_move_phase(&mut self) -> DispatchResults {
        let results = self.engine.dispatch_move_phase();
        for (unit, result) in &results {
            let event = match result {
                Ok(outcome) => ActionEvent::MoveDispatched {
                    unit: *unit,
                    outcome: *outcome,
                },
                Err(err) => ActionEvent::MoveFailed {
                    unit: *unit,
                    code: err.error_code().to_owned(),
                    message: err.to_string(),
                },
            };
            self.event_bus.publish(event);
        }
        self.observe_pending();
        self.check_quiet();
        results
    }

    fn handle_signal(&mut self, signal: CompletionSignal) {
        let effect = self.engine.handle_signal(signal);
        let handled = effect != SignalEffect::Ignored;
        self.metrics.record_signal(handled);
        if !handled {
            debug!(target: "runtime::worker", unit = %signal.unit(), "completion had no listener");
        }
        self.event_bus
            .publish(ActionEvent::Completed { signal, effect });
        self.check_quiet();
    }

    fn end_phase(&mut self, reply: oneshot::Sender<EndOfPhase>) {
        let epoch = self.engine.epoch();
        let end = self.engine.end_phase();
        self.record_end(epoch, end);

        match end {
            EndOfPhase::RetryScheduled { delay } => {
                self.retry_deadline = Some(Instant::now() + delay);
                self.end_waiters.push(reply);
            }
            EndOfPhase::RetrySuppressed if self.retry_deadline.is_some() => {
                self.end_waiters.push(reply);
            }
            _ => respond(reply, end, "EndPhase"),
        }
    }

    fn fire_retry(&mut self) {
        self.retry_deadline = None;
        let epoch = self.engine.epoch();
        let end = self.engine.retry_end_phase();
        self.record_end(epoch, end);

        if let EndOfPhase::RetryScheduled { delay } = end {
            self.retry_deadline = Some(Instant::now() + delay);
            return;
        }
        for waiter in self.end_waiters.drain(..) {
            respond(waiter, end, "EndPhase");
        }
    }

    fn record_end(&mut self, epoch: Epoch, end: EndOfPhase) {
        match end {
            EndOfPhase::Advanced {
                epoch: next,
                window,
                forced_clear,
            } => {
                self.metrics
                    .record_advance(self.turn_started.elapsed(), forced_clear);
                self.turn_started = Instant::now();
                info!(target: "runtime::worker", from = %epoch, to = %next, %forced_clear, "epoch advanced");
                self.event_bus.publish(TurnEvent::Advanced {
                    epoch: next,
                    window,
                    forced_clear,
                });
                self.event_bus.publish(TurnEvent::WindowOpened { window });
                self.quiet = true;
                for waiter in self.quiet_waiters.drain(..) {
                    respond(waiter, (), "AwaitQuiet");
                }
            }
            EndOfPhase::RetryScheduled { delay } => {
                self.event_bus.publish(DiagnosticEvent::RetryScheduled {
                    epoch,
                    delay_ms: saturating_millis(delay),
                });
            }
            EndOfPhase::RetrySuppressed => {
                self.event_bus
                    .publish(DiagnosticEvent::RetrySuppressed { epoch });
            }
            EndOfPhase::Stalled { check } => {
                self.metrics.record_stall();
                warn!(
                    target: "runtime::worker",
                    %epoch,
                    pending = check.pending_actions,
                    "epoch stalled after retry"
                );
                self.event_bus
                    .publish(DiagnosticEvent::Stalled { epoch, check });
            }
        }
    }

    fn observe_pending(&self) {
        let pending = self.engine.barrier().pending_count(self.engine.epoch());
        self.metrics.observe_pending(pending as u64);
    }

    fn check_quiet(&mut self) {
        let quiet = self.engine.is_phase_quiet();
        if quiet && !self.quiet {
            let epoch = self.engine.epoch();
            debug!(target: "runtime::worker", %epoch, "phase quiet");
            self.event_bus.publish(DiagnosticEvent::PhaseQuiet { epoch });
        }
        self.quiet = quiet;
        if quiet {
            for waiter in self.quiet_waiters.drain(..) {
                respond(waiter, (), "AwaitQuiet");
            }
        }
    }
}

async fn retry_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T, command: &'static str) {
    if reply.send(value).is_err() {
        debug!(target: "runtime::worker", command, "reply channel closed (caller dropped)");
    }
}
