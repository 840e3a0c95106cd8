//! Topic-based event bus implementation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::types::{ActionEvent, DiagnosticEvent, TurnEvent};

/// Topics for event routing
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Topic {
    /// Turn boundaries, input windows and commands
    Turn,
    /// Move dispatch, attack steps and completions
    Action,
    /// Guard retries, stalls and quiescence
    Diagnostics,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Turn, Topic::Action, Topic::Diagnostics];
}

/// Event wrapper that carries the topic and typed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Turn(TurnEvent),
    Action(ActionEvent),
    Diagnostics(DiagnosticEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Turn(_) => Topic::Turn,
            Event::Action(_) => Topic::Action,
            Event::Diagnostics(_) => Topic::Diagnostics,
        }
    }
}

impl From<TurnEvent> for Event {
    fn from(event: TurnEvent) -> Self {
        Event::Turn(event)
    }
}

impl From<ActionEvent> for Event {
    fn from(event: ActionEvent) -> Self {
        Event::Action(event)
    }
}

impl From<DiagnosticEvent> for Event {
    fn from(event: DiagnosticEvent) -> Self {
        Event::Diagnostics(event)
    }
}

struct Channels {
    turn: broadcast::Sender<Event>,
    action: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
}

impl Channels {
    fn sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Turn => &self.turn,
            Topic::Action => &self.action,
            Topic::Diagnostics => &self.diagnostics,
        }
    }
}

/// Topic-based event bus
///
/// Allows consumers to subscribe to specific topics and only receive
/// events they care about. Publishing is best-effort: events sent while a
/// topic has no subscribers are dropped.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<Channels>,
}

impl EventBus {
    /// Creates a new event bus with default capacity for each topic
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Creates a new event bus with specified capacity per topic
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channels: Arc::new(Channels {
                turn: broadcast::channel(capacity).0,
                action: broadcast::channel(capacity).0,
                diagnostics: broadcast::channel(capacity).0,
            }),
        }
    }

    /// Publish an event to its corresponding topic
    pub fn publish(&self, event: impl Into<Event>) {
        let event = event.into();
        let topic = event.topic();
        if self.channels.sender(topic).send(event).is_err() {
            tracing::trace!("No subscribers for topic {:?}", topic);
        }
    }

    /// Subscribe to a specific topic
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.channels.sender(topic).subscribe()
    }

    /// Subscribe to multiple topics
    pub fn subscribe_multiple(
        &self,
        topics: &[Topic],
    ) -> HashMap<Topic, broadcast::Receiver<Event>> {
        topics
            .iter()
            .map(|&topic| (topic, self.subscribe(topic)))
            .collect()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels.sender(topic).receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("turn", &self.subscriber_count(Topic::Turn))
            .field("action", &self.subscriber_count(Topic::Action))
            .field("diagnostics", &self.subscriber_count(Topic::Diagnostics))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turn_core::Epoch;

    #[tokio::test]
    async fn subscribers_only_see_their_topic() {
        let bus = EventBus::with_capacity(8);
        let mut turn_rx = bus.subscribe(Topic::Turn);
        let mut diag_rx = bus.subscribe(Topic::Diagnostics);

        bus.publish(DiagnosticEvent::RetrySuppressed { epoch: Epoch(2) });
        bus.publish(TurnEvent::Started { epoch: Epoch(3) });

        assert_eq!(
            turn_rx.recv().await.unwrap(),
            Event::Turn(TurnEvent::Started { epoch: Epoch(3) })
        );
        assert_eq!(
            diag_rx.recv().await.unwrap(),
            Event::Diagnostics(DiagnosticEvent::RetrySuppressed { epoch: Epoch(2) })
        );
        assert!(turn_rx.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.publish(TurnEvent::Ended { epoch: Epoch(1) });
        assert_eq!(bus.subscriber_count(Topic::Action), 0);
    }
}
