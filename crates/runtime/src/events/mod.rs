//! Topic-based event bus for runtime events.
//!
//! Events are published to specific topics, and consumers can subscribe only
//! to the topics they need. Publishing is best-effort: with no subscribers
//! events are dropped.

mod bus;
mod types;

pub use bus::{Event, EventBus, Topic};
pub use types::{GovernanceEvent, MutationEvent};
