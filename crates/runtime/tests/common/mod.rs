#![allow(dead_code)]

use std::time::Duration;

use turn_core::{Cell, Controller, TurnConfig, UnitId, UnitRoster, UnitState};
use turn_runtime::{ExecutorTiming, GridMap, RuntimeConfig};

/// Player at (2, 2) and one AI unit per extra cell, ids counting from 1.
pub fn roster(ai_cells: &[Cell]) -> UnitRoster {
    let mut units = UnitRoster::new();
    units.insert(UnitState::new(UnitId::PLAYER, Controller::Player, Cell::new(2, 2)));
    for (index, cell) in ai_cells.iter().enumerate() {
        units.insert(UnitState::new(UnitId(index as u32 + 1), Controller::Ai, *cell));
    }
    units
}

pub fn open_grid() -> GridMap {
    GridMap::open(10, 10)
}

/// Short timings so a full turn settles in a few tens of milliseconds.
pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        turn: TurnConfig::default().with_retry_delay(Duration::from_millis(60)),
        quiet_timeout: Duration::from_millis(500),
        executor: ExecutorTiming {
            move_duration: Duration::from_millis(5),
            attack_duration: Duration::from_millis(5),
            stagger: Duration::from_millis(2),
        },
        ..RuntimeConfig::default()
    }
}
