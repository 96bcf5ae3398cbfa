//! Store collaborator
//!
//! The consistency core is written against `BoardStore`: equality-filtered
//! selects, ordered/paginated lists, inserts, a handful of atomic
//! increment-by-one operations, and unique-violation detection surfaced as
//! a distinguishable `StoreError::Duplicate`. Application code never does
//! read-modify-write on a shared counter; all mutual exclusion is
//! delegated to the store.

pub mod memory;
pub mod mongo;
pub mod records;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use records::{
    ActivityEvent, Agent, Angle, ClaimStatus, Critique, Idea, TargetType, TopicTag, Upvote,
};

/// Store failures. `Duplicate` is the one variant callers are allowed to
/// branch on; everything else is fatal for the triggering request.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row-level unique constraint rejected the write.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// Store unavailable or an operation failed unexpectedly.
    #[error("store error: {0}")]
    Backend(String),
}

/// Sort orders for the idea listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdeaSort {
    Recent,
    Popular,
    MostCritiqued,
}

impl IdeaSort {
    pub fn parse(s: &str) -> Option<IdeaSort> {
        match s {
            "recent" => Some(IdeaSort::Recent),
            "popular" => Some(IdeaSort::Popular),
            "most_critiqued" => Some(IdeaSort::MostCritiqued),
            _ => None,
        }
    }
}

/// Which collection a daily-count query runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyKind {
    Ideas,
    Critiques,
}

#[async_trait]
pub trait BoardStore: Send + Sync {
    // ── Agents ──────────────────────────────────────────────────────

    /// Insert a new agent. Fails with `Duplicate` if the name (checked
    /// case-insensitively), api_key, or claim_token collides.
    async fn insert_agent(&self, agent: Agent) -> Result<Agent, StoreError>;

    async fn agent_by_api_key(&self, api_key: &str) -> Result<Option<Agent>, StoreError>;

    async fn agent_by_id(&self, id: &str) -> Result<Option<Agent>, StoreError>;

    /// Case-insensitive name lookup, used for the write-time conflict check.
    async fn agent_by_name_ci(&self, name: &str) -> Result<Option<Agent>, StoreError>;

    async fn agent_by_claim_token(&self, token: &str) -> Result<Option<Agent>, StoreError>;

    /// All agents, most recently active first.
    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError>;

    /// Batch id → name resolution. One call per response page, never one
    /// per row.
    async fn agent_names(&self, ids: &[String]) -> Result<HashMap<String, String>, StoreError>;

    /// Set last_active to now. Best-effort at the call site.
    async fn touch_last_active(&self, id: &str) -> Result<(), StoreError>;

    /// One-way unclaimed → claimed transition.
    async fn mark_claimed(&self, id: &str) -> Result<(), StoreError>;

    // ── Ideas ───────────────────────────────────────────────────────

    async fn insert_idea(&self, idea: Idea) -> Result<Idea, StoreError>;

    async fn idea_by_id(&self, id: &str) -> Result<Option<Idea>, StoreError>;

    /// All ideas by one agent (dedup-key scan), newest first.
    async fn ideas_by_agent(&self, agent_id: &str) -> Result<Vec<Idea>, StoreError>;

    async fn list_ideas(
        &self,
        sort: IdeaSort,
        topic: Option<TopicTag>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Idea>, StoreError>;

    /// Atomically bump an idea's critique_count by one, returning the new
    /// value. Fails if the idea is gone.
    async fn increment_critique_count(&self, idea_id: &str) -> Result<i64, StoreError>;

    // ── Critiques ───────────────────────────────────────────────────

    async fn insert_critique(&self, critique: Critique) -> Result<Critique, StoreError>;

    async fn critique_by_id(&self, id: &str) -> Result<Option<Critique>, StoreError>;

    /// Critiques attached to an idea, highest-voted first.
    async fn critiques_for_idea(&self, idea_id: &str) -> Result<Vec<Critique>, StoreError>;

    /// One agent's critiques on one idea (dedup-key scan).
    async fn critiques_by_agent_for_idea(
        &self,
        agent_id: &str,
        idea_id: &str,
    ) -> Result<Vec<Critique>, StoreError>;

    // ── Voting ──────────────────────────────────────────────────────

    /// Insert the vote-uniqueness row. `Duplicate` means "already voted"
    /// and must be treated as a successful no-op by callers.
    async fn insert_upvote(&self, vote: Upvote) -> Result<(), StoreError>;

    /// Atomically bump the target's upvote_count by exactly one, returning
    /// the post-increment value. RPC-style; never read-modify-write.
    async fn increment_upvote_count(
        &self,
        target: TargetType,
        id: &str,
    ) -> Result<i64, StoreError>;

    /// Re-read the target's current count (duplicate-vote fallback path).
    async fn upvote_count(&self, target: TargetType, id: &str)
        -> Result<Option<i64>, StoreError>;

    async fn count_upvotes(&self) -> Result<u64, StoreError>;

    // ── Activity ────────────────────────────────────────────────────

    async fn insert_event(&self, event: ActivityEvent) -> Result<(), StoreError>;

    /// Reverse-chronological event page.
    async fn list_events(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ActivityEvent>, StoreError>;

    // ── Aggregates ──────────────────────────────────────────────────

    async fn count_agents(&self) -> Result<u64, StoreError>;

    async fn count_claimed_agents(&self) -> Result<u64, StoreError>;

    async fn count_ideas(&self) -> Result<u64, StoreError>;

    async fn count_critiques(&self) -> Result<u64, StoreError>;

    async fn count_critiques_by_agent(&self, agent_id: &str) -> Result<u64, StoreError>;

    /// Ideas with the most critiques, descending.
    async fn top_debated_ideas(&self, limit: usize) -> Result<Vec<Idea>, StoreError>;

    /// Critique counts grouped by authoring agent.
    async fn critique_counts_by_agent(&self) -> Result<HashMap<String, u64>, StoreError>;

    /// Creation timestamps since a boundary, for daily bucketing.
    async fn created_at_since(
        &self,
        kind: DailyKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;
}
