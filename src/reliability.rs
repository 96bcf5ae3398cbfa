//! Retry-tolerance core
//!
//! Agents retry: network hiccups, crashed loops, and double-fired tool
//! calls all produce repeated writes. This module makes repeats converge.
//! Creates are deduplicated by content heuristics; votes are idempotent
//! through the store's unique constraint.

use std::future::Future;

use crate::store::{BoardStore, Critique, Idea, StoreError, TargetType, Upvote};

/// Critique duplicates are matched on the first characters of the body.
const CRITIQUE_PREFIX_CHARS: usize = 100;

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

fn body_prefix_key(body: &str) -> String {
    body.trim()
        .chars()
        .take(CRITIQUE_PREFIX_CHARS)
        .collect::<String>()
        .to_lowercase()
}

/// An idea is a repeat when the same agent already posted one with the
/// same trimmed title, case-insensitively. `existing` is the agent's own
/// ideas, newest first; the first hit wins.
pub fn find_idea_duplicate<'a>(title: &str, existing: &'a [Idea]) -> Option<&'a Idea> {
    let key = title_key(title);
    existing.iter().find(|i| title_key(&i.title) == key)
}

/// A critique is a repeat when the same agent already critiqued the same
/// idea with a body sharing the first 100 characters, case-insensitively.
pub fn find_critique_duplicate<'a>(body: &str, existing: &'a [Critique]) -> Option<&'a Critique> {
    let key = body_prefix_key(body);
    existing.iter().find(|c| body_prefix_key(&c.body) == key)
}

/// Insert only when the dedup lookup finds nothing. Returns the surviving
/// record and whether it was a pre-existing one; on a hit the insert
/// future is never polled, so counter and activity side effects are
/// skipped wholesale by the caller branching on the flag.
pub async fn submit_if_new<T, L, I>(lookup: L, insert: I) -> Result<(T, bool), StoreError>
where
    L: Future<Output = Result<Option<T>, StoreError>>,
    I: Future<Output = Result<T, StoreError>>,
{
    if let Some(existing) = lookup.await? {
        return Ok((existing, true));
    }
    let created = insert.await?;
    Ok((created, false))
}

/// Outcome of a vote attempt. `count` is always the target's current
/// total, whether or not this attempt changed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteResult {
    pub count: i64,
    pub first_vote: bool,
}

/// Record one vote, exactly once per (voter, target).
///
/// The uniqueness row is inserted first; only a successful insert earns an
/// increment. A duplicate re-reads the current count and changes nothing.
/// The counter can therefore never drift from the set of votes.
pub async fn cast_vote(
    store: &dyn BoardStore,
    voter_id: &str,
    target: TargetType,
    target_id: &str,
) -> Result<VoteResult, StoreError> {
    let vote = Upvote::new(voter_id.to_string(), target, target_id.to_string());
    match store.insert_upvote(vote).await {
        Ok(()) => {
            let count = store.increment_upvote_count(target, target_id).await?;
            Ok(VoteResult {
                count,
                first_vote: true,
            })
        }
        Err(StoreError::Duplicate(_)) => {
            let count = store
                .upvote_count(target, target_id)
                .await?
                .ok_or_else(|| {
                    StoreError::Backend(format!(
                        "{} '{}' not found",
                        target.as_str(),
                        target_id
                    ))
                })?;
            Ok(VoteResult {
                count,
                first_vote: false,
            })
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn idea_duplicate_ignores_case_and_whitespace() {
        let existing = vec![Idea::new(
            "a1".into(),
            "Solar Rickshaws".into(),
            "body".into(),
            None,
        )];
        assert!(find_idea_duplicate("  solar rickshaws ", &existing).is_some());
        assert!(find_idea_duplicate("Solar Rickshaws 2", &existing).is_none());
    }

    #[test]
    fn critique_duplicate_matches_on_first_100_chars() {
        let prefix = "x".repeat(100);
        let existing = vec![Critique::new(
            "i1".into(),
            "a1".into(),
            format!("{}first tail", prefix),
            vec![],
        )];
        // Same prefix, different tail: still a repeat.
        assert!(find_critique_duplicate(&format!("{}other tail", prefix), &existing).is_some());
        // Different within the first 100 characters: distinct.
        let mut changed = prefix.clone();
        changed.replace_range(0..1, "y");
        assert!(find_critique_duplicate(&format!("{}first tail", changed), &existing).is_none());
    }

    #[test]
    fn critique_prefix_counts_chars_not_bytes() {
        // Multibyte characters near the boundary must not panic.
        let body = "é".repeat(150);
        let existing = vec![Critique::new("i1".into(), "a1".into(), body.clone(), vec![])];
        assert!(find_critique_duplicate(&body, &existing).is_some());
    }

    #[tokio::test]
    async fn submit_if_new_skips_insert_on_a_hit() {
        let store = MemoryStore::new();
        let existing = store
            .insert_idea(Idea::new("a1".into(), "Kept".into(), "B".into(), None))
            .await
            .unwrap();

        let (record, was_duplicate) = submit_if_new(
            async { Ok(Some(existing.clone())) },
            store.insert_idea(Idea::new("a1".into(), "New".into(), "B".into(), None)),
        )
        .await
        .unwrap();
        assert!(was_duplicate);
        assert_eq!(record.id, existing.id);
        assert_eq!(store.count_ideas().await.unwrap(), 1);

        let (_, was_duplicate) = submit_if_new(
            async { Ok(None) },
            store.insert_idea(Idea::new("a1".into(), "New".into(), "B".into(), None)),
        )
        .await
        .unwrap();
        assert!(!was_duplicate);
        assert_eq!(store.count_ideas().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn vote_is_idempotent_per_voter() {
        let store = MemoryStore::new();
        let idea = store
            .insert_idea(Idea::new("author".into(), "T".into(), "B".into(), None))
            .await
            .unwrap();

        let first = cast_vote(&store, "voter", TargetType::Idea, &idea.id)
            .await
            .unwrap();
        assert_eq!(first, VoteResult { count: 1, first_vote: true });

        let repeat = cast_vote(&store, "voter", TargetType::Idea, &idea.id)
            .await
            .unwrap();
        assert_eq!(repeat, VoteResult { count: 1, first_vote: false });

        let other = cast_vote(&store, "voter2", TargetType::Idea, &idea.id)
            .await
            .unwrap();
        assert_eq!(other, VoteResult { count: 2, first_vote: true });
    }

    #[tokio::test]
    async fn same_voter_may_vote_both_target_types() {
        let store = MemoryStore::new();
        let idea = store
            .insert_idea(Idea::new("author".into(), "T".into(), "B".into(), None))
            .await
            .unwrap();
        let critique = store
            .insert_critique(Critique::new(idea.id.clone(), "author".into(), "B".into(), vec![]))
            .await
            .unwrap();

        let a = cast_vote(&store, "voter", TargetType::Idea, &idea.id)
            .await
            .unwrap();
        let b = cast_vote(&store, "voter", TargetType::Critique, &critique.id)
            .await
            .unwrap();
        assert!(a.first_vote);
        assert!(b.first_vote);
    }
}
