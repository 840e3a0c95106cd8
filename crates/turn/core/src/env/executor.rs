use crate::action::ActionRequest;
use crate::state::{UnitId, WorldPos};

/// The per-unit ability engine.
///
/// Both methods start work and return immediately. Completion is reported
/// back later through the host's completion channel.
pub trait ActionExecutor: Send {
    /// Emits the ability-triggering event for `request`.
    ///
    /// Returns how many capabilities reacted. Zero means nothing will ever
    /// report completion for this request.
    fn start(&mut self, request: &ActionRequest) -> u32;

    /// Issues a direct movement command along `waypoints`.
    ///
    /// Completion is reported as a movement-finished signal for `unit`.
    fn move_unit(&mut self, unit: UnitId, waypoints: &[WorldPos]);
}

/// Executor that never triggers anything. Useful for headless checks.
#[derive(Clone, Copy, Debug, Default)]
pub struct InertExecutor;

impl ActionExecutor for InertExecutor {
    fn start(&mut self, _request: &ActionRequest) -> u32 {
        0
    }

    fn move_unit(&mut self, _unit: UnitId, _waypoints: &[WorldPos]) {}
}

impl<E: ActionExecutor + ?Sized> ActionExecutor for Box<E> {
    fn start(&mut self, request: &ActionRequest) -> u32 {
        (**self).start(request)
    }

    fn move_unit(&mut self, unit: UnitId, waypoints: &[WorldPos]) {
        (**self).move_unit(unit, waypoints)
    }
}
