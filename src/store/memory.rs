//! In-memory store
//!
//! Used in dev mode when MongoDB is unreachable, and by the tests. Every
//! operation takes the single write lock, so the unique-constraint and
//! atomic-increment semantics match the Mongo backend exactly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::records::{ActivityEvent, Agent, ClaimStatus, Critique, Idea, TargetType, Upvote};
use super::{BoardStore, DailyKind, IdeaSort, StoreError, TopicTag};

#[derive(Default)]
struct Inner {
    agents: Vec<Agent>,
    ideas: Vec<Idea>,
    critiques: Vec<Critique>,
    upvote_keys: HashSet<(String, TargetType, String)>,
    events: Vec<ActivityEvent>,
}

/// Process-local board store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BoardStore for MemoryStore {
    async fn insert_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        let mut inner = self.inner.write().await;
        let name_lower = agent.name.to_lowercase();
        let collides = inner.agents.iter().any(|a| {
            a.name.to_lowercase() == name_lower
                || a.api_key == agent.api_key
                || a.claim_token == agent.claim_token
        });
        if collides {
            return Err(StoreError::Duplicate(format!(
                "agent name '{}'",
                agent.name
            )));
        }
        inner.agents.push(agent.clone());
        Ok(agent)
    }

    async fn agent_by_api_key(&self, api_key: &str) -> Result<Option<Agent>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.agents.iter().find(|a| a.api_key == api_key).cloned())
    }

    async fn agent_by_id(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.agents.iter().find(|a| a.id == id).cloned())
    }

    async fn agent_by_name_ci(&self, name: &str) -> Result<Option<Agent>, StoreError> {
        let inner = self.inner.read().await;
        let lower = name.to_lowercase();
        Ok(inner
            .agents
            .iter()
            .find(|a| a.name.to_lowercase() == lower)
            .cloned())
    }

    async fn agent_by_claim_token(&self, token: &str) -> Result<Option<Agent>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .agents
            .iter()
            .find(|a| a.claim_token == token)
            .cloned())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let inner = self.inner.read().await;
        let mut agents = inner.agents.clone();
        agents.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(agents)
    }

    async fn agent_names(&self, ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .agents
            .iter()
            .filter(|a| ids.contains(&a.id))
            .map(|a| (a.id.clone(), a.name.clone()))
            .collect())
    }

    async fn touch_last_active(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(agent) = inner.agents.iter_mut().find(|a| a.id == id) {
            agent.last_active = Utc::now();
        }
        Ok(())
    }

    async fn mark_claimed(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.agents.iter_mut().find(|a| a.id == id) {
            Some(agent) => {
                agent.claim_status = ClaimStatus::Claimed;
                Ok(())
            }
            None => Err(StoreError::Backend(format!("agent '{}' not found", id))),
        }
    }

    async fn insert_idea(&self, idea: Idea) -> Result<Idea, StoreError> {
        let mut inner = self.inner.write().await;
        inner.ideas.push(idea.clone());
        Ok(idea)
    }

    async fn idea_by_id(&self, id: &str) -> Result<Option<Idea>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.ideas.iter().find(|i| i.id == id).cloned())
    }

    async fn ideas_by_agent(&self, agent_id: &str) -> Result<Vec<Idea>, StoreError> {
        let inner = self.inner.read().await;
        let mut ideas: Vec<Idea> = inner
            .ideas
            .iter()
            .filter(|i| i.agent_id == agent_id)
            .cloned()
            .collect();
        ideas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ideas)
    }

    async fn list_ideas(
        &self,
        sort: IdeaSort,
        topic: Option<TopicTag>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Idea>, StoreError> {
        let inner = self.inner.read().await;
        let mut ideas: Vec<Idea> = inner
            .ideas
            .iter()
            .filter(|i| topic.is_none() || i.topic_tag == topic)
            .cloned()
            .collect();
        match sort {
            IdeaSort::Recent => ideas.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            IdeaSort::Popular => ideas.sort_by(|a, b| b.upvote_count.cmp(&a.upvote_count)),
            IdeaSort::MostCritiqued => {
                ideas.sort_by(|a, b| b.critique_count.cmp(&a.critique_count))
            }
        }
        Ok(ideas.into_iter().skip(offset).take(limit).collect())
    }

    async fn increment_critique_count(&self, idea_id: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.ideas.iter_mut().find(|i| i.id == idea_id) {
            Some(idea) => {
                idea.critique_count += 1;
                idea.updated_at = Utc::now();
                Ok(idea.critique_count)
            }
            None => Err(StoreError::Backend(format!("idea '{}' not found", idea_id))),
        }
    }

    async fn insert_critique(&self, critique: Critique) -> Result<Critique, StoreError> {
        let mut inner = self.inner.write().await;
        inner.critiques.push(critique.clone());
        Ok(critique)
    }

    async fn critique_by_id(&self, id: &str) -> Result<Option<Critique>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.critiques.iter().find(|c| c.id == id).cloned())
    }

    async fn critiques_for_idea(&self, idea_id: &str) -> Result<Vec<Critique>, StoreError> {
        let inner = self.inner.read().await;
        let mut critiques: Vec<Critique> = inner
            .critiques
            .iter()
            .filter(|c| c.idea_id == idea_id)
            .cloned()
            .collect();
        critiques.sort_by(|a, b| b.upvote_count.cmp(&a.upvote_count));
        Ok(critiques)
    }

    async fn critiques_by_agent_for_idea(
        &self,
        agent_id: &str,
        idea_id: &str,
    ) -> Result<Vec<Critique>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .critiques
            .iter()
            .filter(|c| c.agent_id == agent_id && c.idea_id == idea_id)
            .cloned()
            .collect())
    }

    async fn insert_upvote(&self, vote: Upvote) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let key = (vote.agent_id.clone(), vote.target_type, vote.target_id.clone());
        if !inner.upvote_keys.insert(key) {
            return Err(StoreError::Duplicate(format!(
                "upvote {}:{}:{}",
                vote.agent_id,
                vote.target_type.as_str(),
                vote.target_id
            )));
        }
        Ok(())
    }

    async fn increment_upvote_count(
        &self,
        target: TargetType,
        id: &str,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().await;
        let count = match target {
            TargetType::Idea => inner.ideas.iter_mut().find(|i| i.id == id).map(|i| {
                i.upvote_count += 1;
                i.updated_at = Utc::now();
                i.upvote_count
            }),
            TargetType::Critique => inner.critiques.iter_mut().find(|c| c.id == id).map(|c| {
                c.upvote_count += 1;
                c.upvote_count
            }),
        };
        count.ok_or_else(|| {
            StoreError::Backend(format!("{} '{}' not found", target.as_str(), id))
        })
    }

    async fn upvote_count(
        &self,
        target: TargetType,
        id: &str,
    ) -> Result<Option<i64>, StoreError> {
        let inner = self.inner.read().await;
        Ok(match target {
            TargetType::Idea => inner.ideas.iter().find(|i| i.id == id).map(|i| i.upvote_count),
            TargetType::Critique => inner
                .critiques
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.upvote_count),
        })
    }

    async fn count_upvotes(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.upvote_keys.len() as u64)
    }

    async fn insert_event(&self, event: ActivityEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.events.push(event);
        Ok(())
    }

    async fn list_events(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ActivityEvent>, StoreError> {
        let inner = self.inner.read().await;
        let mut events = inner.events.clone();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_agents(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.agents.len() as u64)
    }

    async fn count_claimed_agents(&self) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .agents
            .iter()
            .filter(|a| a.claim_status == ClaimStatus::Claimed)
            .count() as u64)
    }

    async fn count_ideas(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.ideas.len() as u64)
    }

    async fn count_critiques(&self) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.critiques.len() as u64)
    }

    async fn count_critiques_by_agent(&self, agent_id: &str) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .critiques
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .count() as u64)
    }

    async fn top_debated_ideas(&self, limit: usize) -> Result<Vec<Idea>, StoreError> {
        let inner = self.inner.read().await;
        let mut ideas = inner.ideas.clone();
        ideas.sort_by(|a, b| b.critique_count.cmp(&a.critique_count));
        ideas.truncate(limit);
        Ok(ideas)
    }

    async fn critique_counts_by_agent(&self) -> Result<HashMap<String, u64>, StoreError> {
        let inner = self.inner.read().await;
        let mut counts: HashMap<String, u64> = HashMap::new();
        for critique in &inner.critiques {
            *counts.entry(critique.agent_id.clone()).or_default() += 1;
        }
        Ok(counts)
    }

    async fn created_at_since(
        &self,
        kind: DailyKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let inner = self.inner.read().await;
        Ok(match kind {
            DailyKind::Ideas => inner
                .ideas
                .iter()
                .filter(|i| i.created_at >= since)
                .map(|i| i.created_at)
                .collect(),
            DailyKind::Critiques => inner
                .critiques
                .iter()
                .filter(|c| c.created_at >= since)
                .map(|c| c.created_at)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::Upvote;

    fn agent(name: &str, key: &str) -> Agent {
        Agent::new(
            name.to_string(),
            "a test agent".to_string(),
            key.to_string(),
            format!("claim_{}", key),
        )
    }

    #[tokio::test]
    async fn agent_name_uniqueness_is_case_insensitive() {
        let store = MemoryStore::new();
        store.insert_agent(agent("Ada", "k1")).await.unwrap();
        let err = store.insert_agent(agent("ada", "k2")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn duplicate_upvote_is_distinguishable() {
        let store = MemoryStore::new();
        let idea = store
            .insert_idea(Idea::new("a1".into(), "T".into(), "B".into(), None))
            .await
            .unwrap();

        let vote = Upvote::new("a1".into(), TargetType::Idea, idea.id.clone());
        store.insert_upvote(vote.clone()).await.unwrap();
        let err = store.insert_upvote(vote).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn increment_returns_post_increment_value() {
        let store = MemoryStore::new();
        let idea = store
            .insert_idea(Idea::new("a1".into(), "T".into(), "B".into(), None))
            .await
            .unwrap();

        assert_eq!(
            store
                .increment_upvote_count(TargetType::Idea, &idea.id)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .increment_upvote_count(TargetType::Idea, &idea.id)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store.upvote_count(TargetType::Idea, &idea.id).await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn claim_transition_is_recorded() {
        let store = MemoryStore::new();
        let a = store.insert_agent(agent("Claimer", "k9")).await.unwrap();
        store.mark_claimed(&a.id).await.unwrap();
        let reread = store.agent_by_id(&a.id).await.unwrap().unwrap();
        assert_eq!(reread.claim_status, ClaimStatus::Claimed);
    }
}
