//! High-level runtime orchestrator.
//!
//! The runtime owns the turn worker, wires up command/completion/event
//! channels, and exposes a builder-based API for clients to drive turns.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use turn_core::{
    ActionExecutor, CommandOutcome, EndOfPhase, Epoch, FlowSnapshot, SequencerStep, Services,
    TurnConfig, TurnEngine, UnitId, UnitRoster,
};

use crate::api::{
    AiPlan, AiPlanner, CommandProvider, CompletionSender, ProviderKind, Result, RuntimeError,
    RuntimeHandle,
};
use crate::events::{BusObserver, Event, EventBus, Topic};
use crate::executor::{ExecutorTiming, TaskExecutor, saturating_millis};
use crate::oracle::{GridMap, OccupancyMap};
use crate::workers::{RuntimeMetrics, TurnWorker};

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub turn: TurnConfig,
    pub command_buffer_size: usize,
    pub event_buffer_size: usize,
    /// Commands the player may have rejected in one turn before giving up.
    pub max_input_attempts: u32,
    /// How long a turn waits for its actions before handing over to the
    /// advance guard anyway.
    pub quiet_timeout: Duration,
    pub executor: ExecutorTiming,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            turn: TurnConfig::default(),
            command_buffer_size: 32,
            event_buffer_size: 100,
            max_input_attempts: 4,
            quiet_timeout: Duration::from_secs(5),
            executor: ExecutorTiming::default(),
        }
    }
}

/// What happened during one [`Runtime::step`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReport {
    pub epoch: Epoch,
    /// Accepted player command, if any.
    pub command: Option<CommandOutcome>,
    pub rejected_inputs: u32,
    pub moves_dispatched: usize,
    pub move_failures: usize,
    pub attack_start: SequencerStep,
    pub end: EndOfPhase,
}

impl TurnReport {
    pub fn advanced(&self) -> bool {
        matches!(self.end, EndOfPhase::Advanced { .. })
    }
}

type ExecutorFactory = Box<dyn FnOnce(CompletionSender) -> Box<dyn ActionExecutor> + Send>;

/// Main runtime that orchestrates turn simulation
///
/// [`RuntimeHandle`] provides a cloneable façade for clients.
pub struct Runtime {
    handle: RuntimeHandle,
    config: RuntimeConfig,
    player: UnitId,
    started: bool,

    player_provider: Option<Box<dyn CommandProvider>>,
    ai_planner: Option<Box<dyn AiPlanner>>,

    worker_handle: JoinHandle<()>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Get a cloneable handle to this runtime
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<RuntimeMetrics> {
        self.handle.metrics()
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.handle.subscribe(topic)
    }

    pub fn set_player_provider(&mut self, provider: impl CommandProvider + 'static) {
        self.player_provider = Some(Box::new(provider));
    }

    pub fn set_ai_planner(&mut self, planner: impl AiPlanner + 'static) {
        self.ai_planner = Some(Box::new(planner));
    }

    /// Plays one full turn: player input, AI plans, move phase, attack
    /// phase, then the end-of-phase guard.
    ///
    /// Requires both the player provider and the AI planner.
    pub async fn step(&mut self) -> Result<TurnReport> {
        if self.player_provider.is_none() {
            return Err(RuntimeError::ProviderNotSet {
                kind: ProviderKind::Player,
            });
        }
        if self.ai_planner.is_none() {
            return Err(RuntimeError::ProviderNotSet {
                kind: ProviderKind::Ai,
            });
        }
        if !self.started {
            self.handle.start().await?;
            self.started = true;
        }

        let units = self.handle.units().await?;
        let window = self.handle.input_window().await?;
        let (command, rejected_inputs) = self.collect_player_command(&units).await?;
        self.plan_ai_units(&units).await?;

        let dispatched = self.handle.dispatch_move_phase().await?;
        let move_failures = dispatched.iter().filter(|(_, r)| r.is_err()).count();
        let attack_start = self.handle.begin_attack_phase().await?;

        if tokio::time::timeout(self.config.quiet_timeout, self.handle.wait_for_quiet())
            .await
            .is_err()
        {
            warn!(
                target: "runtime",
                epoch = %window.turn_id,
                timeout_ms = saturating_millis(self.config.quiet_timeout),
                "actions still pending, handing over to the advance guard"
            );
        }

        let end = self.handle.end_phase().await?;
        Ok(TurnReport {
            epoch: window.turn_id,
            command,
            rejected_inputs,
            moves_dispatched: dispatched.len() - move_failures,
            move_failures,
            attack_start,
            end,
        })
    }

    /// Plays up to `turns` turns, stopping early when a turn stalls.
    pub async fn run_turns(&mut self, turns: u32) -> Result<Vec<TurnReport>> {
        let mut reports = Vec::with_capacity(turns as usize);
        for _ in 0..turns {
            let report = self.step().await?;
            let advanced = report.advanced();
            reports.push(report);
            if !advanced {
                warn!(target: "runtime", "turn did not advance, stopping");
                break;
            }
        }
        Ok(reports)
    }

    async fn collect_player_command(
        &self,
        units: &UnitRoster,
    ) -> Result<(Option<CommandOutcome>, u32)> {
        let Some(provider) = self.player_provider.as_deref() else {
            return Err(RuntimeError::ProviderNotSet {
                kind: ProviderKind::Player,
            });
        };

        let mut rejected = 0;
        for _ in 0..self.config.max_input_attempts {
            let window = self.handle.input_window().await?;
            let command = provider.provide_command(self.player, window, units).await?;
            match self.handle.submit_command(self.player, command).await {
                Ok(outcome @ CommandOutcome::Applied { .. }) => {
                    return Ok((Some(outcome), rejected));
                }
                Ok(CommandOutcome::RotatedNoTurn { facing }) => {
                    debug!(target: "runtime", %facing, "player turned in place");
                }
                Err(err) if err.is_engine_rejection() => {
                    rejected += 1;
                    warn!(target: "runtime", code = err.code(), error = %err, "player command rejected");
                }
                Err(err) => return Err(err),
            }
        }
        Err(RuntimeError::InputAttemptsExhausted { attempts: rejected })
    }

    async fn plan_ai_units(&self, units: &UnitRoster) -> Result<()> {
        let Some(planner) = self.ai_planner.as_deref() else {
            return Err(RuntimeError::ProviderNotSet {
                kind: ProviderKind::Ai,
            });
        };

        for unit in units.iter().filter(|unit| !unit.is_player_controlled()) {
            let plan = planner.plan(unit.id, units).await?;
            let result = match plan {
                AiPlan::Move(next) => self.handle.declare_ai_move(unit.id, next).await,
                AiPlan::Wait => self.handle.declare_ai_move(unit.id, unit.cell).await,
                AiPlan::Attack(target) => self.handle.plan_attack(unit.id, target).await,
            };
            match result {
                Ok(()) => {}
                Err(err) if err.is_engine_rejection() => {
                    debug!(target: "runtime", unit = %unit.id, code = err.code(), "ai plan downgraded to wait");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Shutdown the runtime gracefully
    pub async fn shutdown(self) -> Result<()> {
        drop(self.handle);
        self.worker_handle
            .await
            .map_err(RuntimeError::WorkerJoin)?;
        Ok(())
    }
}

/// Builder for [`Runtime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    units: Option<UnitRoster>,
    grid: Option<GridMap>,
    resume: Option<FlowSnapshot>,
    executor: Option<ExecutorFactory>,
    player_provider: Option<Box<dyn CommandProvider>>,
    ai_planner: Option<Box<dyn AiPlanner>>,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            units: None,
            grid: None,
            resume: None,
            executor: None,
            player_provider: None,
            ai_planner: None,
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn units(mut self, units: UnitRoster) -> Self {
        self.units = Some(units);
        self
    }

    pub fn grid(mut self, grid: GridMap) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Continue from previously captured flow counters instead of epoch 1.
    pub fn resume_from(mut self, snapshot: FlowSnapshot) -> Self {
        self.resume = Some(snapshot);
        self
    }

    /// Replace the default [`TaskExecutor`].
    ///
    /// The factory receives the sender its executor must report completions to.
    pub fn executor<F, E>(mut self, factory: F) -> Self
    where
        F: FnOnce(CompletionSender) -> E + Send + 'static,
        E: ActionExecutor + 'static,
    {
        self.executor = Some(Box::new(move |completions| {
            Box::new(factory(completions)) as Box<dyn ActionExecutor>
        }));
        self
    }

    pub fn player_provider(mut self, provider: impl CommandProvider + 'static) -> Self {
        self.player_provider = Some(Box::new(provider));
        self
    }

    pub fn ai_planner(mut self, planner: impl AiPlanner + 'static) -> Self {
        self.ai_planner = Some(Box::new(planner));
        self
    }

    /// Build the runtime and spawn its turn worker.
    pub async fn build(self) -> Result<Runtime> {
        let units = self
            .units
            .filter(|units| !units.is_empty())
            .ok_or(RuntimeError::MissingUnits)?;
        let grid = self.grid.ok_or(RuntimeError::MissingGrid)?;
        let player = units
            .iter()
            .find(|unit| unit.is_player_controlled())
            .map(|unit| unit.id)
            .ok_or(RuntimeError::MissingPlayer(UnitId::PLAYER))?;

        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer_size.max(1));
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let completions = CompletionSender::new(completion_tx);
        let event_bus = EventBus::with_capacity(self.config.event_buffer_size);
        let metrics = Arc::new(RuntimeMetrics::new());

        let executor: Box<dyn ActionExecutor> = match self.executor {
            Some(factory) => factory(completions.clone()),
            None => Box::new(TaskExecutor::new(
                completions.clone(),
                self.config.executor,
            )),
        };

        let services = Services::new(grid, OccupancyMap::from_roster(&units));
        let turn_config = self.config.turn.clone();
        let mut engine = match self.resume {
            Some(snapshot) => {
                info!(target: "runtime", epoch = %snapshot.epoch, window = %snapshot.window, "resuming turn flow");
                TurnEngine::resume(turn_config, snapshot, units, services, executor)
            }
            None => TurnEngine::new(turn_config, units, services, executor),
        };
        engine.add_observer(Box::new(BusObserver::new(event_bus.clone())));

        let handle = RuntimeHandle::new(command_tx, completions, event_bus.clone(), Arc::clone(&metrics));
        let worker = TurnWorker::new(engine, command_rx, completion_rx, event_bus, metrics);
        let worker_handle = tokio::spawn(worker.run());

        Ok(Runtime {
            handle,
            config: self.config,
            player,
            started: false,
            player_provider: self.player_provider,
            ai_planner: self.ai_planner,
            worker_handle,
        })
    }
}
