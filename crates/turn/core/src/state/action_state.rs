//! Per-unit action state: counted markers plus a one-shot completion listener.
//!
//! Markers are counted, not boolean. An ability may add `InProgress` twice
//! (nested activations) and must remove it twice; the advance guard only
//! treats a unit as idle once every instance is gone.
use bitflags::bitflags;
use strum::{EnumCount, IntoEnumIterator};

use super::{Epoch, UnitId};

/// Named state markers placed on a unit while it is busy.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::AsRefStr,
    strum::EnumIter,
    strum::EnumCount,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum ActionMarker {
    /// The unit has an action that has not reported completion yet.
    InProgress,
    /// An ability is mid-execution.
    Executing,
    /// Locomotion toward a destination cell is underway.
    Moving,
    /// The unit is in a falling movement mode.
    Falling,
}

impl ActionMarker {
    pub const fn flag(self) -> MarkerSet {
        match self {
            Self::InProgress => MarkerSet::IN_PROGRESS,
            Self::Executing => MarkerSet::EXECUTING,
            Self::Moving => MarkerSet::MOVING,
            Self::Falling => MarkerSet::FALLING,
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

bitflags! {
    /// Selection of markers for bulk queries and clears.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct MarkerSet: u8 {
        const IN_PROGRESS = 1 << 0;
        const EXECUTING   = 1 << 1;
        const MOVING      = 1 << 2;
        const FALLING     = 1 << 3;

        /// Markers that block turn advancement when left behind.
        const RESIDUAL = Self::IN_PROGRESS.bits()
            | Self::EXECUTING.bits()
            | Self::MOVING.bits()
            | Self::FALLING.bits();
    }
}

impl MarkerSet {
    pub fn markers(self) -> impl Iterator<Item = ActionMarker> {
        ActionMarker::iter().filter(move |marker| self.contains(marker.flag()))
    }
}

/// Per-marker instance counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkerCounts([u32; ActionMarker::COUNT]);

impl MarkerCounts {
    pub fn get(&self, marker: ActionMarker) -> u32 {
        self.0[marker.slot()]
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn accumulate(&mut self, other: &MarkerCounts) {
        for (acc, value) in self.0.iter_mut().zip(other.0.iter()) {
            *acc += value;
        }
    }

    fn slot_mut(&mut self, marker: ActionMarker) -> &mut u32 {
        &mut self.0[marker.slot()]
    }
}

impl std::fmt::Display for MarkerCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for marker in ActionMarker::iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}={}", marker, self.get(marker))?;
        }
        Ok(())
    }
}

/// Who is waiting on a unit's next ability-completion signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ListenerOwner {
    AttackSequencer,
}

/// One-shot completion listener bound on a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompletionListener {
    pub owner: ListenerOwner,
    pub epoch: Epoch,
}

/// Action-state component attached to a unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionState {
    counts: MarkerCounts,
    listener: Option<CompletionListener>,
}

impl ActionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_marker(&mut self, marker: ActionMarker) {
        *self.counts.slot_mut(marker) += 1;
    }

    /// Removes a single instance. Returns `false` if none was present.
    pub fn remove_marker(&mut self, marker: ActionMarker) -> bool {
        let slot = self.counts.slot_mut(marker);
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    pub fn count(&self, marker: ActionMarker) -> u32 {
        self.counts.get(marker)
    }

    pub fn has(&self, marker: ActionMarker) -> bool {
        self.count(marker) > 0
    }

    pub fn counts(&self) -> &MarkerCounts {
        &self.counts
    }

    /// Removes every instance of the selected markers and reports what was removed.
    pub fn clear_markers(&mut self, selection: MarkerSet) -> MarkerCounts {
        let mut removed = MarkerCounts::default();
        for marker in selection.markers() {
            let slot = self.counts.slot_mut(marker);
            *removed.slot_mut(marker) = *slot;
            *slot = 0;
        }
        removed
    }

    /// Removes one instance of each blocking marker so a fresh ability can activate.
    pub fn cleanse_blocking(&mut self) -> MarkerCounts {
        let mut removed = MarkerCounts::default();
        for marker in MarkerSet::RESIDUAL.markers() {
            if self.remove_marker(marker) {
                *removed.slot_mut(marker) = 1;
            }
        }
        removed
    }

    /// Binds a listener, returning whichever listener it displaced.
    pub fn bind_listener(&mut self, listener: CompletionListener) -> Option<CompletionListener> {
        self.listener.replace(listener)
    }

    /// Consumes the bound listener. A listener fires at most once.
    pub fn take_listener(&mut self) -> Option<CompletionListener> {
        self.listener.take()
    }

    pub fn listener(&self) -> Option<&CompletionListener> {
        self.listener.as_ref()
    }
}

/// Marker totals removed from one unit during a bulk clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearedMarkers {
    pub unit: UnitId,
    pub removed: MarkerCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_counted_instances() {
        let mut state = ActionState::new();
        state.add_marker(ActionMarker::InProgress);
        state.add_marker(ActionMarker::InProgress);
        assert_eq!(state.count(ActionMarker::InProgress), 2);

        assert!(state.remove_marker(ActionMarker::InProgress));
        assert!(state.has(ActionMarker::InProgress));
        assert!(state.remove_marker(ActionMarker::InProgress));
        assert!(!state.remove_marker(ActionMarker::InProgress));
    }

    #[test]
    fn clear_markers_removes_every_instance_of_selection() {
        let mut state = ActionState::new();
        state.add_marker(ActionMarker::InProgress);
        state.add_marker(ActionMarker::InProgress);
        state.add_marker(ActionMarker::Moving);
        state.add_marker(ActionMarker::Falling);

        let removed = state.clear_markers(MarkerSet::IN_PROGRESS | MarkerSet::MOVING);
        assert_eq!(removed.get(ActionMarker::InProgress), 2);
        assert_eq!(removed.get(ActionMarker::Moving), 1);
        assert_eq!(removed.total(), 3);
        assert_eq!(state.count(ActionMarker::Falling), 1);
    }

    #[test]
    fn cleanse_blocking_drops_one_instance_each() {
        let mut state = ActionState::new();
        state.add_marker(ActionMarker::Executing);
        state.add_marker(ActionMarker::Executing);
        state.add_marker(ActionMarker::Moving);

        let removed = state.cleanse_blocking();
        assert_eq!(removed.total(), 2);
        assert_eq!(state.count(ActionMarker::Executing), 1);
        assert!(!state.has(ActionMarker::Moving));
    }

    #[test]
    fn listener_is_one_shot() {
        let mut state = ActionState::new();
        let listener = CompletionListener {
            owner: ListenerOwner::AttackSequencer,
            epoch: Epoch(3),
        };
        assert!(state.bind_listener(listener).is_none());
        assert_eq!(state.take_listener(), Some(listener));
        assert!(state.take_listener().is_none());
    }

    #[test]
    fn counts_display_lists_every_marker() {
        let mut state = ActionState::new();
        state.add_marker(ActionMarker::Moving);
        assert_eq!(
            state.counts().to_string(),
            "in_progress=0, executing=0, moving=1, falling=0"
        );
    }
}
