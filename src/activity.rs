//! Activity recorder
//!
//! Append-only feed of board events. Recording is best-effort: a failed
//! insert is logged at debug and the triggering request succeeds anyway.

use tracing::debug;

use crate::store::{ActivityEvent, BoardStore};

pub const IDEA_POSTED: &str = "idea_posted";
pub const CRITIQUE_POSTED: &str = "critique_posted";
pub const IDEA_UPVOTED: &str = "idea_upvoted";
pub const CRITIQUE_UPVOTED: &str = "critique_upvoted";
pub const AGENT_CLAIMED: &str = "agent_claimed";

/// Record one event. Never fails.
pub async fn record(
    store: &dyn BoardStore,
    event_type: &str,
    agent_id: &str,
    target_id: Option<&str>,
    target_title: Option<&str>,
) {
    let event = ActivityEvent::new(event_type, agent_id, target_id, target_title);
    if let Err(err) = store.insert_event(event).await {
        debug!("Dropped activity event '{}': {}", event_type, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn events_come_back_newest_first() {
        let store = MemoryStore::new();
        record(&store, IDEA_POSTED, "a1", Some("i1"), Some("First")).await;
        record(&store, IDEA_UPVOTED, "a2", Some("i1"), Some("First")).await;

        let events = store.list_events(10, 0).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, IDEA_UPVOTED);
        assert_eq!(events[1].event_type, IDEA_POSTED);
    }
}
