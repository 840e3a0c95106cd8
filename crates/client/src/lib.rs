//! Headless turn synchronization demo.
//!
//! Loads an ASCII arena, wires a scripted player and chasing AI units into
//! the runtime, plays a fixed number of turns and returns a serializable
//! summary of what happened.
pub mod config;
pub mod logging;
pub mod scenario;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use turn_core::{Cell, Controller, EngineSnapshot, UnitId};
use turn_runtime::{
    ChasePlanner, DiagnosticEvent, Event, GridMap, Runtime, RuntimeHandle, RuntimeMetricsSnapshot,
    ScriptedCommandProvider, Topic, TurnReport,
};

pub use config::ClientConfig;

/// Everything printed at the end of a run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub turns: Vec<TurnReport>,
    pub snapshot: EngineSnapshot,
    pub units: Vec<UnitSummary>,
    pub metrics: RuntimeMetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct UnitSummary {
    pub id: UnitId,
    pub controller: Controller,
    pub cell: Cell,
}

/// Plays `config.turns` turns and collects the summary.
pub async fn run(config: &ClientConfig) -> Result<RunSummary> {
    let map = load_map(config)?;
    let units = scenario::roster_from_map(&map)?;
    let script = scenario::parse_script(
        config
            .script
            .as_deref()
            .unwrap_or(scenario::DEFAULT_SCRIPT),
    )?;
    tracing::info!(
        units = units.len(),
        width = map.width(),
        height = map.height(),
        steps = script.len(),
        "scenario loaded"
    );

    let mut runtime = Runtime::builder()
        .config(config.runtime_config())
        .units(units)
        .grid(map)
        .player_provider(ScriptedCommandProvider::new(script))
        .ai_planner(ChasePlanner::new(UnitId::PLAYER))
        .build()
        .await?;
    let diagnostics = spawn_diagnostics_logger(&runtime.handle());

    let turns = runtime.run_turns(config.turns).await?;
    let handle = runtime.handle();
    let snapshot = handle.snapshot().await?;
    let units = handle
        .units()
        .await?
        .iter()
        .map(|unit| UnitSummary {
            id: unit.id,
            controller: unit.controller,
            cell: unit.cell,
        })
        .collect();
    let metrics = runtime.metrics().snapshot();
    drop(handle);

    runtime.shutdown().await?;
    diagnostics.abort();

    Ok(RunSummary {
        turns,
        snapshot,
        units,
        metrics,
    })
}

fn load_map(config: &ClientConfig) -> Result<GridMap> {
    match &config.map_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading map {}", path.display()))?;
            Ok(GridMap::parse(&text)?)
        }
        None => Ok(GridMap::parse(scenario::DEFAULT_MAP)?),
    }
}

/// Mirrors guard diagnostics into the log.
fn spawn_diagnostics_logger(handle: &RuntimeHandle) -> JoinHandle<()> {
    let mut rx = handle.subscribe(Topic::Diagnostics);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Event::Diagnostics(event)) => match event {
                    DiagnosticEvent::Stalled { epoch, check } => {
                        tracing::warn!(
                            %epoch,
                            pending = check.pending_actions,
                            in_progress = check.in_progress,
                            blocker = ?check.blocker,
                            "turn stalled"
                        );
                    }
                    DiagnosticEvent::RetryScheduled { epoch, delay_ms } => {
                        tracing::info!(%epoch, delay_ms, "end of phase retry scheduled");
                    }
                    other => tracing::debug!(?other, "diagnostic"),
                },
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "diagnostics logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
