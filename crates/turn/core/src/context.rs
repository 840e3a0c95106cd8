use crate::barrier::TurnBarrier;
use crate::env::{ActionExecutor, Services};
use crate::state::{Epoch, UnitRoster};

/// Mutable view over everything a component touches while handling one step.
///
/// Components never own the barrier, roster or services; the engine lends
/// them out per call so each piece of state has exactly one owner.
pub struct TurnContext<'a> {
    pub epoch: Epoch,
    pub barrier: &'a mut dyn TurnBarrier,
    pub units: &'a mut UnitRoster,
    pub services: &'a mut Services,
    pub executor: &'a mut dyn ActionExecutor,
}
