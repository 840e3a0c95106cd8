//! Asynchronous abstraction for sourcing player commands and AI plans.
//!
//! Runtime users plug in [`CommandProvider`] and [`AiPlanner`] implementations
//! so turns can run with human input, scripted fixtures, or AI policies.
use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;
use turn_core::{
    AttackTarget, Cell, Command, CommandKind, Direction, InputWindow, UnitId, UnitRoster,
};

use super::errors::Result;

/// Trait for producing the player's command for an open input window.
///
/// Implementations should stamp the command with the window's ids. A command
/// carrying stale ids is rejected by the engine and the provider is asked
/// again for the refreshed window.
#[async_trait]
pub trait CommandProvider: Send + Sync {
    async fn provide_command(
        &self,
        unit: UnitId,
        window: InputWindow,
        units: &UnitRoster,
    ) -> Result<Command>;
}

/// What an AI unit wants to do this turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiPlan {
    /// Step into the given cell.
    Move(Cell),
    Attack(AttackTarget),
    Wait,
}

/// Trait for deciding an AI unit's plan for the current turn.
#[async_trait]
pub trait AiPlanner: Send + Sync {
    async fn plan(&self, unit: UnitId, units: &UnitRoster) -> Result<AiPlan>;
}

/// Always waits. Useful for testing or as a fallback.
pub struct WaitCommandProvider;

#[async_trait]
impl CommandProvider for WaitCommandProvider {
    async fn provide_command(
        &self,
        _unit: UnitId,
        window: InputWindow,
        _units: &UnitRoster,
    ) -> Result<Command> {
        Ok(Command::new(window.turn_id, window.window_id, CommandKind::Wait))
    }
}

/// One scripted input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptStep {
    /// Bound to whatever window is open when the step is consumed.
    Input {
        kind: CommandKind,
        direction: Direction,
    },
    /// Submitted exactly as given, ids included.
    Raw(Command),
}

/// Replays a fixed list of inputs, then waits forever after.
#[derive(Default)]
pub struct ScriptedCommandProvider {
    steps: Mutex<VecDeque<ScriptStep>>,
}

impl ScriptedCommandProvider {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
        }
    }

    /// Script of directional moves.
    pub fn moves(directions: impl IntoIterator<Item = Direction>) -> Self {
        Self::new(directions.into_iter().map(|direction| ScriptStep::Input {
            kind: CommandKind::Move,
            direction,
        }))
    }

    pub async fn remaining(&self) -> usize {
        self.steps.lock().await.len()
    }
}

#[async_trait]
impl CommandProvider for ScriptedCommandProvider {
    async fn provide_command(
        &self,
        _unit: UnitId,
        window: InputWindow,
        _units: &UnitRoster,
    ) -> Result<Command> {
        let step = self.steps.lock().await.pop_front();
        let command = match step {
            Some(ScriptStep::Input { kind, direction }) => {
                Command::new(window.turn_id, window.window_id, kind).with_direction(direction)
            }
            Some(ScriptStep::Raw(command)) => command,
            None => Command::new(window.turn_id, window.window_id, CommandKind::Wait),
        };
        Ok(command)
    }
}

/// AI that never moves.
pub struct HoldPositionPlanner;

#[async_trait]
impl AiPlanner for HoldPositionPlanner {
    async fn plan(&self, _unit: UnitId, _units: &UnitRoster) -> Result<AiPlan> {
        Ok(AiPlan::Wait)
    }
}

/// Walks toward a target unit and attacks once adjacent.
pub struct ChasePlanner {
    target: UnitId,
}

impl ChasePlanner {
    pub const fn new(target: UnitId) -> Self {
        Self { target }
    }
}

#[async_trait]
impl AiPlanner for ChasePlanner {
    async fn plan(&self, unit: UnitId, units: &UnitRoster) -> Result<AiPlan> {
        let (Some(me), Some(target)) = (units.get(unit), units.get(self.target)) else {
            return Ok(AiPlan::Wait);
        };
        if me.cell.chebyshev_distance(target.cell) <= 1 {
            return Ok(AiPlan::Attack(AttackTarget::Unit(self.target)));
        }
        Ok(AiPlan::Move(me.cell.offset(me.cell.direction_to(target.cell))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turn_core::{Controller, Epoch, UnitState, WindowId};

    fn window() -> InputWindow {
        InputWindow {
            turn_id: Epoch(3),
            window_id: WindowId(7),
            open: true,
        }
    }

    #[tokio::test]
    async fn scripted_inputs_bind_to_the_open_window() {
        let provider = ScriptedCommandProvider::moves([Direction::EAST]);
        let units = UnitRoster::new();

        let first = provider
            .provide_command(UnitId::PLAYER, window(), &units)
            .await
            .unwrap();
        assert_eq!(first.kind, CommandKind::Move);
        assert_eq!((first.turn_id, first.window_id), (Epoch(3), WindowId(7)));

        let fallback = provider
            .provide_command(UnitId::PLAYER, window(), &units)
            .await
            .unwrap();
        assert_eq!(fallback.kind, CommandKind::Wait);
        assert_eq!(provider.remaining().await, 0);
    }

    #[tokio::test]
    async fn chase_planner_steps_then_attacks() {
        let mut units = UnitRoster::new();
        units.insert(UnitState::new(UnitId::PLAYER, Controller::Player, Cell::new(0, 0)));
        units.insert(UnitState::new(UnitId(1), Controller::Ai, Cell::new(3, 2)));
        let planner = ChasePlanner::new(UnitId::PLAYER);

        assert_eq!(
            planner.plan(UnitId(1), &units).await.unwrap(),
            AiPlan::Move(Cell::new(2, 1))
        );

        units.get_mut(UnitId(1)).unwrap().cell = Cell::new(1, 1);
        assert_eq!(
            planner.plan(UnitId(1), &units).await.unwrap(),
            AiPlan::Attack(AttackTarget::Unit(UnitId::PLAYER))
        );
    }
}
