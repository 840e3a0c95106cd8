use turn_core::{Epoch, TurnObserver};

use super::{EventBus, TurnEvent};

/// Forwards the engine's turn boundaries onto the bus.
pub(crate) struct BusObserver {
    bus: EventBus,
}

impl BusObserver {
    pub(crate) fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl TurnObserver for BusObserver {
    fn on_turn_started(&mut self, epoch: Epoch) {
        self.bus.publish(TurnEvent::Started { epoch });
    }

    fn on_turn_ended(&mut self, epoch: Epoch) {
        self.bus.publish(TurnEvent::Ended { epoch });
    }
}
