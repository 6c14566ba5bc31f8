//! Broadcast channels, one per topic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::types::{GovernanceEvent, MutationEvent};

/// Channel an event is delivered on.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Topic {
    /// Plan applications (applied, failed, rolled back)
    Mutation,
    /// Guard findings
    Governance,
}

/// Any runtime event; the variant determines the topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Mutation(MutationEvent),
    Governance(GovernanceEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Mutation(_) => Topic::Mutation,
            Event::Governance(_) => Topic::Governance,
        }
    }
}

/// Fan-out of runtime events to interested subscribers.
///
/// Channels are fixed at construction, so publishing and subscribing never
/// contend on a lock. Cloning shares the same channels.
#[derive(Clone)]
pub struct EventBus {
    mutation: broadcast::Sender<Event>,
    governance: broadcast::Sender<Event>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 100;

    /// Bus with [`Self::DEFAULT_CAPACITY`] slots per topic.
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Bus buffering up to `capacity` events per topic for slow receivers.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            mutation: broadcast::channel(capacity).0,
            governance: broadcast::channel(capacity).0,
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Mutation => &self.mutation,
            Topic::Governance => &self.governance,
        }
    }

    /// Best effort: events published with no receivers are dropped.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        if self.sender(topic).send(event).is_err() {
            tracing::trace!(?topic, "event dropped, no subscribers");
        }
    }

    /// Receiver for one topic. Only events published after this call arrive.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.sender(topic).subscribe()
    }

    /// One receiver per requested topic.
    pub fn subscribe_multiple(
        &self,
        topics: &[Topic],
    ) -> HashMap<Topic, broadcast::Receiver<Event>> {
        topics
            .iter()
            .map(|&topic| (topic, self.subscribe(topic)))
            .collect()
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
            .field("mutation_subscribers", &self.mutation.receiver_count())
            .field("governance_subscribers", &self.governance.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheet_core::{EntityId, MutationPhase};

    #[tokio::test]
    async fn receivers_only_see_their_topic() {
        let bus = EventBus::with_capacity(4);
        let mut mutations = bus.subscribe(Topic::Mutation);
        let governance = bus.subscribe(Topic::Governance);

        bus.publish(Event::Mutation(MutationEvent::Failed {
            phase: MutationPhase::Set,
            error: "boom".into(),
            rolled_back: true,
        }));
        bus.publish(Event::Mutation(MutationEvent::RolledBack {
            restored: vec![EntityId(1)],
            discarded: Vec::new(),
        }));

        assert!(matches!(
            mutations.recv().await,
            Ok(Event::Mutation(MutationEvent::Failed { .. }))
        ));
        assert!(matches!(
            mutations.recv().await,
            Ok(Event::Mutation(MutationEvent::RolledBack { .. }))
        ));
        assert!(governance.is_empty());
    }
}
