mod common;

use std::time::Duration;

use turn_core::{
    ActionMarker, Cell, Command, CommandKind, CompletionSignal, Direction, EndOfPhase, Epoch,
    SequencerStep, SignalEffect, TurnConfig, UnitId,
};
use turn_runtime::{
    ActionEvent, ChasePlanner, DiagnosticEvent, Event, ExecutorTiming, HoldPositionPlanner,
    Runtime, RuntimeConfig, ScriptedCommandProvider, TaskExecutor, Topic, WaitCommandProvider,
};

use common::{fast_config, open_grid, roster};

fn drain_diagnostics(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<DiagnosticEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::Diagnostics(event) = event {
            seen.push(event);
        }
    }
    seen
}

/// A movement that never reports back holds the turn: the guard retries
/// once, then stalls. A late completion lets the next end of phase advance.
#[tokio::test]
async fn lost_completion_stalls_until_reported() {
    let config = RuntimeConfig {
        turn: TurnConfig::default().with_retry_delay(Duration::from_millis(30)),
        quiet_timeout: Duration::from_millis(80),
        ..fast_config()
    };
    let mut runtime = Runtime::builder()
        .config(config)
        .units(roster(&[Cell::new(7, 7)]))
        .grid(open_grid())
        .executor(|completions| {
            TaskExecutor::new(completions, ExecutorTiming::instant()).never_completing([UnitId(1)])
        })
        .player_provider(WaitCommandProvider)
        .ai_planner(ChasePlanner::new(UnitId::PLAYER))
        .build()
        .await
        .expect("runtime should build");
    let mut diag_rx = runtime.subscribe(Topic::Diagnostics);

    let report = runtime.step().await.expect("turn should run");
    let EndOfPhase::Stalled { check } = report.end else {
        panic!("expected a stall, got {:?}", report.end);
    };
    assert_eq!(check.epoch, Epoch(1));
    assert_eq!(check.pending_actions, 1);
    assert!(!check.barrier_quiet);
    assert_eq!(runtime.metrics().stalls(), 1);

    let diagnostics = drain_diagnostics(&mut diag_rx);
    assert!(matches!(
        diagnostics.as_slice(),
        [
            DiagnosticEvent::RetryScheduled { epoch: Epoch(1), delay_ms: 30 },
            DiagnosticEvent::Stalled { epoch: Epoch(1), .. },
        ]
    ));

    let handle = runtime.handle();
    let dump = handle.barrier_dump().await.expect("dump");
    assert_eq!(dump.pending_count(), 1);

    handle
        .signal(CompletionSignal::MovementFinished { unit: UnitId(1) })
        .expect("signal");
    handle.wait_for_quiet().await.expect("quiet");

    let end = handle.end_phase().await.expect("end phase");
    assert!(matches!(end, EndOfPhase::Advanced { epoch: Epoch(2), .. }));

    let units = handle.units().await.expect("units query");
    assert_eq!(units.get(UnitId(1)).map(|u| u.cell), Some(Cell::new(6, 6)));
}

/// Ending the phase before the actions landed schedules one retry. Both
/// callers waiting on it see the advance once the completion arrived.
#[tokio::test]
async fn retry_picks_up_completions_that_arrived_meanwhile() {
    let config = RuntimeConfig {
        turn: TurnConfig::default().with_retry_delay(Duration::from_millis(150)),
        executor: ExecutorTiming {
            move_duration: Duration::from_millis(20),
            attack_duration: Duration::ZERO,
            stagger: Duration::ZERO,
        },
        ..fast_config()
    };
    let runtime = Runtime::builder()
        .config(config)
        .units(roster(&[Cell::new(7, 7)]))
        .grid(open_grid())
        .build()
        .await
        .expect("runtime should build");
    let handle = runtime.handle();
    let mut diag_rx = handle.subscribe(Topic::Diagnostics);

    let window = handle.start().await.expect("start");
    handle
        .submit_command(
            UnitId::PLAYER,
            Command::new(window.turn_id, window.window_id, CommandKind::Wait),
        )
        .await
        .expect("wait accepted");
    handle
        .declare_ai_move(UnitId(1), Cell::new(6, 6))
        .await
        .expect("ai move reserved");
    handle.dispatch_move_phase().await.expect("dispatch");
    handle.begin_attack_phase().await.expect("attack phase");

    let other = handle.clone();
    let (first, second) = tokio::join!(handle.end_phase(), other.end_phase());
    let first = first.expect("first end phase");
    let second = second.expect("second end phase");
    assert!(matches!(first, EndOfPhase::Advanced { epoch: Epoch(2), .. }));
    assert_eq!(first, second);

    let diagnostics = drain_diagnostics(&mut diag_rx);
    assert!(diagnostics.contains(&DiagnosticEvent::RetryScheduled {
        epoch: Epoch(1),
        delay_ms: 150,
    }));
    assert!(diagnostics.contains(&DiagnosticEvent::RetrySuppressed { epoch: Epoch(1) }));
    assert!(!diagnostics
        .iter()
        .any(|event| matches!(event, DiagnosticEvent::Stalled { .. })));
}

#[tokio::test]
async fn refused_attack_is_skipped_and_the_turn_advances() {
    let mut runtime = Runtime::builder()
        .config(fast_config())
        .units(roster(&[Cell::new(3, 3)]))
        .grid(open_grid())
        .executor(|completions| {
            TaskExecutor::new(completions, ExecutorTiming::instant()).refusing([UnitId(1)])
        })
        .player_provider(WaitCommandProvider)
        .ai_planner(ChasePlanner::new(UnitId::PLAYER))
        .build()
        .await
        .expect("runtime should build");

    let report = runtime.step().await.expect("turn should run");
    assert!(matches!(
        report.attack_start,
        SequencerStep::Finished {
            epoch: Epoch(1),
            dispatched: 0,
            skipped: 1,
        }
    ));
    assert!(report.advanced());
}

#[tokio::test]
async fn attacks_resolve_one_after_another() {
    let mut runtime = Runtime::builder()
        .config(fast_config())
        .units(roster(&[Cell::new(3, 3), Cell::new(1, 1)]))
        .grid(open_grid())
        .player_provider(WaitCommandProvider)
        .ai_planner(ChasePlanner::new(UnitId::PLAYER))
        .build()
        .await
        .expect("runtime should build");
    let mut action_rx = runtime.subscribe(Topic::Action);

    let report = runtime.step().await.expect("turn should run");
    assert!(matches!(
        report.attack_start,
        SequencerStep::Waiting { index: 0, attacker: UnitId(1) }
    ));
    assert!(report.advanced());

    let mut steps = Vec::new();
    while let Ok(event) = action_rx.try_recv() {
        if let Event::Action(turn_runtime::ActionEvent::Completed {
            effect: turn_core::SignalEffect::Attack(step),
            ..
        }) = event
        {
            steps.push(step);
        }
    }
    assert!(matches!(
        steps.as_slice(),
        [
            SequencerStep::Waiting { index: 1, attacker: UnitId(2) },
            SequencerStep::Finished { dispatched: 2, skipped: 0, .. },
        ]
    ));
}

/// The player's move completes but its ability never takes the `InProgress`
/// marker off. The barrier goes quiet, so the guard clears the marker and
/// advances with `forced_clear` set.
#[tokio::test]
async fn leaked_marker_is_cleared_when_the_phase_ends() {
    let mut runtime = Runtime::builder()
        .config(fast_config())
        .units(roster(&[Cell::new(7, 7)]))
        .grid(open_grid())
        .executor(|completions| {
            TaskExecutor::new(completions, ExecutorTiming::instant())
                .leaking_markers([UnitId::PLAYER])
        })
        .player_provider(ScriptedCommandProvider::moves([Direction::NORTH]))
        .ai_planner(HoldPositionPlanner)
        .build()
        .await
        .expect("runtime should build");
    let mut action_rx = runtime.subscribe(Topic::Action);

    let report = runtime.step().await.expect("turn should run");
    assert!(matches!(
        report.end,
        EndOfPhase::Advanced { epoch: Epoch(2), forced_clear: true, .. }
    ));
    assert_eq!(runtime.metrics().forced_clears(), 1);
    assert_eq!(runtime.metrics().stalls(), 0);

    let mut marker_counts = Vec::new();
    while let Ok(event) = action_rx.try_recv() {
        if let Event::Action(ActionEvent::Completed {
            effect: SignalEffect::Marker { unit: UnitId::PLAYER, count, .. },
            ..
        }) = event
        {
            marker_counts.push(count);
        }
    }
    assert_eq!(marker_counts, vec![1]);

    let handle = runtime.handle();
    let units = handle.units().await.expect("units query");
    let player = units.get(UnitId::PLAYER).expect("player");
    assert_eq!(player.cell, Cell::new(2, 3));
    assert_eq!(
        units
            .action_state(UnitId::PLAYER)
            .map(|state| state.count(ActionMarker::InProgress)),
        Some(0)
    );
}

/// Without the leak the ability removes its own marker before completing,
/// so the same turn advances cleanly.
#[tokio::test]
async fn completed_ability_removes_its_marker() {
    let mut runtime = Runtime::builder()
        .config(fast_config())
        .units(roster(&[Cell::new(7, 7)]))
        .grid(open_grid())
        .player_provider(ScriptedCommandProvider::moves([Direction::NORTH]))
        .ai_planner(HoldPositionPlanner)
        .build()
        .await
        .expect("runtime should build");

    let report = runtime.step().await.expect("turn should run");
    assert!(matches!(
        report.end,
        EndOfPhase::Advanced { epoch: Epoch(2), forced_clear: false, .. }
    ));
    assert_eq!(runtime.metrics().forced_clears(), 0);
}
