use std::collections::BTreeMap;

use super::{ActionState, Cell, ClearedMarkers, Direction, MarkerCounts, MarkerSet, UnitId};

/// Who decides what a unit does each turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum Controller {
    /// Driven by player commands; moves run through the ability system.
    Player,
    /// Driven by the AI; moves are issued as direct movement commands.
    Ai,
}

/// Broad classification of what a unit can physically do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitKind {
    /// A mobile character that can be dispatched to other cells.
    #[default]
    Character,
    /// A static actor (turret, totem, ...). Never movable.
    Fixture,
}

impl UnitKind {
    pub const fn is_movable(self) -> bool {
        matches!(self, Self::Character)
    }
}

/// Everything the turn core tracks about a single unit.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitState {
    pub id: UnitId,
    pub controller: Controller,
    pub kind: UnitKind,
    pub cell: Cell,
    /// Height used when converting the unit's destination back to world space.
    pub elevation: f32,
    pub facing: Direction,
    /// `None` models a unit whose action-state component failed to resolve.
    pub action_state: Option<ActionState>,
}

impl UnitState {
    pub fn new(id: UnitId, controller: Controller, cell: Cell) -> Self {
        Self {
            id,
            controller,
            kind: UnitKind::Character,
            cell,
            elevation: 0.0,
            facing: Direction::NORTH,
            action_state: Some(ActionState::new()),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: UnitKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_elevation(mut self, elevation: f32) -> Self {
        self.elevation = elevation;
        self
    }

    #[must_use]
    pub fn without_action_state(mut self) -> Self {
        self.action_state = None;
        self
    }

    pub fn is_player_controlled(&self) -> bool {
        self.controller == Controller::Player
    }

    /// Rotates toward `direction`. A zero direction leaves facing untouched.
    pub fn face(&mut self, direction: Direction) {
        if !direction.is_zero() {
            self.facing = direction;
        }
    }
}

/// Deterministically ordered registry of units.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitRoster {
    units: BTreeMap<UnitId, UnitState>,
}

impl UnitRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a unit, returning the previous entry.
    pub fn insert(&mut self, unit: UnitState) -> Option<UnitState> {
        self.units.insert(unit.id, unit)
    }

    pub fn remove(&mut self, id: UnitId) -> Option<UnitState> {
        self.units.remove(&id)
    }

    pub fn get(&self, id: UnitId) -> Option<&UnitState> {
        self.units.get(&id)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut UnitState> {
        self.units.get_mut(&id)
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    pub fn action_state(&self, id: UnitId) -> Option<&ActionState> {
        self.units.get(&id)?.action_state.as_ref()
    }

    pub fn action_state_mut(&mut self, id: UnitId) -> Option<&mut ActionState> {
        self.units.get_mut(&id)?.action_state.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitState> {
        self.units.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units whose state participates in turn-advance checks.
    pub fn tracked(&self) -> impl Iterator<Item = &UnitState> {
        self.units.values().filter(|unit| unit.kind.is_movable())
    }

    pub fn unit_at(&self, cell: Cell) -> Option<UnitId> {
        self.units
            .values()
            .find(|unit| unit.cell == cell)
            .map(|unit| unit.id)
    }

    /// Clears the selected markers on every unit with an action-state component.
    ///
    /// Only units that actually lost at least one marker are reported.
    pub fn clear_markers(&mut self, selection: MarkerSet) -> Vec<ClearedMarkers> {
        self.units
            .values_mut()
            .filter_map(|unit| {
                let removed = unit.action_state.as_mut()?.clear_markers(selection);
                (!removed.is_empty()).then_some(ClearedMarkers {
                    unit: unit.id,
                    removed,
                })
            })
            .collect()
    }

    /// Sum of marker counts across all units that have an action state.
    pub fn marker_totals(&self) -> MarkerCounts {
        let mut totals = MarkerCounts::default();
        for state in self.units.values().filter_map(|u| u.action_state.as_ref()) {
            totals.accumulate(state.counts());
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ActionMarker;

    fn roster() -> UnitRoster {
        let mut roster = UnitRoster::new();
        roster.insert(UnitState::new(UnitId::PLAYER, Controller::Player, Cell::new(0, 0)));
        roster.insert(UnitState::new(UnitId(1), Controller::Ai, Cell::new(3, 3)));
        roster.insert(
            UnitState::new(UnitId(2), Controller::Ai, Cell::new(5, 5)).with_kind(UnitKind::Fixture),
        );
        roster
    }

    #[test]
    fn tracked_skips_fixtures() {
        let roster = roster();
        let tracked: Vec<_> = roster.tracked().map(|u| u.id).collect();
        assert_eq!(tracked, vec![UnitId::PLAYER, UnitId(1)]);
    }

    #[test]
    fn clear_markers_reports_only_affected_units() {
        let mut roster = roster();
        roster
            .action_state_mut(UnitId(1))
            .unwrap()
            .add_marker(ActionMarker::Moving);

        let cleared = roster.clear_markers(MarkerSet::RESIDUAL);
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].unit, UnitId(1));
        assert!(roster.marker_totals().is_empty());
    }

    #[test]
    fn facing_ignores_zero_direction() {
        let mut unit = UnitState::new(UnitId(9), Controller::Ai, Cell::ORIGIN);
        unit.face(Direction::EAST);
        unit.face(Direction::ZERO);
        assert_eq!(unit.facing, Direction::EAST);
    }
}
