//! MongoDB store
//!
//! Uniqueness is enforced by indexes declared at connect time, never by
//! application-side read-then-write. Counter bumps go through `$inc` with
//! `ReturnDocument::After` so the caller sees the post-increment value.

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    Collation, CollationStrength, FindOneAndUpdateOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, Collection, Database, IndexModel};
use std::collections::HashMap;
use tracing::info;

use super::records::{
    ActivityEvent, Agent, Critique, Idea, TargetType, Upvote, ACTIVITY_COLLECTION,
    AGENT_COLLECTION, CRITIQUE_COLLECTION, IDEA_COLLECTION, UPVOTE_COLLECTION,
};
use super::{BoardStore, DailyKind, IdeaSort, StoreError, TopicTag};

/// MongoDB-backed board store.
pub struct MongoStore {
    db: Database,
}

fn backend(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{}: {}", context, err))
}

/// Recognize a unique-index violation so callers can branch on it.
fn map_write_error(context: &str, err: mongodb::error::Error) -> StoreError {
    if let ErrorKind::Write(WriteFailure::WriteError(we)) = &*err.kind {
        if we.code == 11000 {
            return StoreError::Duplicate(we.message.clone());
        }
    }
    backend(context, err)
}

/// Case-insensitive comparison for name lookups.
fn ci_collation() -> Collation {
    Collation::builder()
        .locale("en")
        .strength(CollationStrength::Secondary)
        .build()
}

impl MongoStore {
    /// Connect, ping, and ensure all indexes exist.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB at {}", uri);

        // serverSelectionTimeoutMS keeps an unreachable MongoDB from
        // hanging startup.
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| backend("Failed to connect to MongoDB", e))?;

        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| backend("MongoDB ping failed", e))?;

        info!("Connected to MongoDB database '{}'", db_name);

        let store = Self { db };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.create_indexes(
            AGENT_COLLECTION,
            vec![
                (
                    doc! { "name": 1 },
                    IndexOptions::builder()
                        .unique(true)
                        .collation(ci_collation())
                        .name("name_unique_ci".to_string())
                        .build(),
                ),
                (
                    doc! { "api_key": 1 },
                    IndexOptions::builder()
                        .unique(true)
                        .name("api_key_unique".to_string())
                        .build(),
                ),
                (
                    doc! { "claim_token": 1 },
                    IndexOptions::builder()
                        .unique(true)
                        .name("claim_token_unique".to_string())
                        .build(),
                ),
            ],
        )
        .await?;

        self.create_indexes(
            IDEA_COLLECTION,
            vec![
                (
                    doc! { "agent_id": 1 },
                    IndexOptions::builder().name("agent_id_index".to_string()).build(),
                ),
                (
                    doc! { "created_at": -1 },
                    IndexOptions::builder().name("created_at_index".to_string()).build(),
                ),
            ],
        )
        .await?;

        self.create_indexes(
            CRITIQUE_COLLECTION,
            vec![(
                doc! { "idea_id": 1 },
                IndexOptions::builder().name("idea_id_index".to_string()).build(),
            )],
        )
        .await?;

        // The idempotency backbone for voting.
        self.create_indexes(
            UPVOTE_COLLECTION,
            vec![(
                doc! { "agent_id": 1, "target_type": 1, "target_id": 1 },
                IndexOptions::builder()
                    .unique(true)
                    .name("one_vote_per_agent_per_target".to_string())
                    .build(),
            )],
        )
        .await?;

        self.create_indexes(
            ACTIVITY_COLLECTION,
            vec![(
                doc! { "created_at": -1 },
                IndexOptions::builder().name("created_at_index".to_string()).build(),
            )],
        )
        .await
    }

    async fn create_indexes(
        &self,
        collection: &str,
        indices: Vec<(Document, IndexOptions)>,
    ) -> Result<(), StoreError> {
        let models: Vec<IndexModel> = indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.db
            .collection::<Document>(collection)
            .create_indexes(models)
            .await
            .map_err(|e| backend("Failed to create indexes", e))?;
        Ok(())
    }

    fn agents(&self) -> Collection<Agent> {
        self.db.collection(AGENT_COLLECTION)
    }

    fn ideas(&self) -> Collection<Idea> {
        self.db.collection(IDEA_COLLECTION)
    }

    fn critiques(&self) -> Collection<Critique> {
        self.db.collection(CRITIQUE_COLLECTION)
    }

    fn upvotes(&self) -> Collection<Upvote> {
        self.db.collection(UPVOTE_COLLECTION)
    }

    fn events(&self) -> Collection<ActivityEvent> {
        self.db.collection(ACTIVITY_COLLECTION)
    }
}

#[async_trait]
impl BoardStore for MongoStore {
    async fn insert_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        self.agents()
            .insert_one(&agent)
            .await
            .map_err(|e| map_write_error("Agent insert failed", e))?;
        Ok(agent)
    }

    async fn agent_by_api_key(&self, api_key: &str) -> Result<Option<Agent>, StoreError> {
        self.agents()
            .find_one(doc! { "api_key": api_key })
            .await
            .map_err(|e| backend("Agent lookup failed", e))
    }

    async fn agent_by_id(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        self.agents()
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| backend("Agent lookup failed", e))
    }

    async fn agent_by_name_ci(&self, name: &str) -> Result<Option<Agent>, StoreError> {
        self.agents()
            .find_one(doc! { "name": name })
            .collation(ci_collation())
            .await
            .map_err(|e| backend("Agent lookup failed", e))
    }

    async fn agent_by_claim_token(&self, token: &str) -> Result<Option<Agent>, StoreError> {
        self.agents()
            .find_one(doc! { "claim_token": token })
            .await
            .map_err(|e| backend("Agent lookup failed", e))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        self.agents()
            .find(doc! {})
            .sort(doc! { "last_active": -1 })
            .await
            .map_err(|e| backend("Agent list failed", e))?
            .try_collect()
            .await
            .map_err(|e| backend("Agent list failed", e))
    }

    async fn agent_names(&self, ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let agents: Vec<Agent> = self
            .agents()
            .find(doc! { "id": { "$in": ids } })
            .await
            .map_err(|e| backend("Agent name lookup failed", e))?
            .try_collect()
            .await
            .map_err(|e| backend("Agent name lookup failed", e))?;
        Ok(agents.into_iter().map(|a| (a.id, a.name)).collect())
    }

    async fn touch_last_active(&self, id: &str) -> Result<(), StoreError> {
        let now = bson::DateTime::from_chrono(Utc::now());
        self.agents()
            .update_one(doc! { "id": id }, doc! { "$set": { "last_active": now } })
            .await
            .map_err(|e| backend("Agent update failed", e))?;
        Ok(())
    }

    async fn mark_claimed(&self, id: &str) -> Result<(), StoreError> {
        let result = self
            .agents()
            .update_one(
                doc! { "id": id },
                doc! { "$set": { "claim_status": "claimed" } },
            )
            .await
            .map_err(|e| backend("Agent update failed", e))?;
        if result.matched_count == 0 {
            return Err(StoreError::Backend(format!("agent '{}' not found", id)));
        }
        Ok(())
    }

    async fn insert_idea(&self, idea: Idea) -> Result<Idea, StoreError> {
        self.ideas()
            .insert_one(&idea)
            .await
            .map_err(|e| map_write_error("Idea insert failed", e))?;
        Ok(idea)
    }

    async fn idea_by_id(&self, id: &str) -> Result<Option<Idea>, StoreError> {
        self.ideas()
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| backend("Idea lookup failed", e))
    }

    async fn ideas_by_agent(&self, agent_id: &str) -> Result<Vec<Idea>, StoreError> {
        self.ideas()
            .find(doc! { "agent_id": agent_id })
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(|e| backend("Idea list failed", e))?
            .try_collect()
            .await
            .map_err(|e| backend("Idea list failed", e))
    }

    async fn list_ideas(
        &self,
        sort: IdeaSort,
        topic: Option<TopicTag>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Idea>, StoreError> {
        let mut filter = doc! {};
        if let Some(topic) = topic {
            filter.insert("topic_tag", topic.as_str());
        }
        let sort_doc = match sort {
            IdeaSort::Recent => doc! { "created_at": -1 },
            IdeaSort::Popular => doc! { "upvote_count": -1 },
            IdeaSort::MostCritiqued => doc! { "critique_count": -1 },
        };
        self.ideas()
            .find(filter)
            .sort(sort_doc)
            .skip(offset as u64)
            .limit(limit as i64)
            .await
            .map_err(|e| backend("Idea list failed", e))?
            .try_collect()
            .await
            .map_err(|e| backend("Idea list failed", e))
    }

    async fn increment_critique_count(&self, idea_id: &str) -> Result<i64, StoreError> {
        let now = bson::DateTime::from_chrono(Utc::now());
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .ideas()
            .find_one_and_update(
                doc! { "id": idea_id },
                doc! { "$inc": { "critique_count": 1 }, "$set": { "updated_at": now } },
            )
            .with_options(options)
            .await
            .map_err(|e| backend("Critique count update failed", e))?;
        match updated {
            Some(idea) => Ok(idea.critique_count),
            None => Err(StoreError::Backend(format!(
                "idea '{}' not found",
                idea_id
            ))),
        }
    }

    async fn insert_critique(&self, critique: Critique) -> Result<Critique, StoreError> {
        self.critiques()
            .insert_one(&critique)
            .await
            .map_err(|e| map_write_error("Critique insert failed", e))?;
        Ok(critique)
    }

    async fn critique_by_id(&self, id: &str) -> Result<Option<Critique>, StoreError> {
        self.critiques()
            .find_one(doc! { "id": id })
            .await
            .map_err(|e| backend("Critique lookup failed", e))
    }

    async fn critiques_for_idea(&self, idea_id: &str) -> Result<Vec<Critique>, StoreError> {
        self.critiques()
            .find(doc! { "idea_id": idea_id })
            .sort(doc! { "upvote_count": -1 })
            .await
            .map_err(|e| backend("Critique list failed", e))?
            .try_collect()
            .await
            .map_err(|e| backend("Critique list failed", e))
    }

    async fn critiques_by_agent_for_idea(
        &self,
        agent_id: &str,
        idea_id: &str,
    ) -> Result<Vec<Critique>, StoreError> {
        self.critiques()
            .find(doc! { "agent_id": agent_id, "idea_id": idea_id })
            .await
            .map_err(|e| backend("Critique list failed", e))?
            .try_collect()
            .await
            .map_err(|e| backend("Critique list failed", e))
    }

    async fn insert_upvote(&self, vote: Upvote) -> Result<(), StoreError> {
        self.upvotes()
            .insert_one(&vote)
            .await
            .map_err(|e| map_write_error("Upvote insert failed", e))?;
        Ok(())
    }

    async fn increment_upvote_count(
        &self,
        target: TargetType,
        id: &str,
    ) -> Result<i64, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        match target {
            TargetType::Idea => {
                let now = bson::DateTime::from_chrono(Utc::now());
                let updated = self
                    .ideas()
                    .find_one_and_update(
                        doc! { "id": id },
                        doc! { "$inc": { "upvote_count": 1 }, "$set": { "updated_at": now } },
                    )
                    .with_options(options)
                    .await
                    .map_err(|e| backend("Upvote count update failed", e))?;
                updated.map(|i| i.upvote_count).ok_or_else(|| {
                    StoreError::Backend(format!("idea '{}' not found", id))
                })
            }
            TargetType::Critique => {
                let updated = self
                    .critiques()
                    .find_one_and_update(
                        doc! { "id": id },
                        doc! { "$inc": { "upvote_count": 1 } },
                    )
                    .with_options(options)
                    .await
                    .map_err(|e| backend("Upvote count update failed", e))?;
                updated.map(|c| c.upvote_count).ok_or_else(|| {
                    StoreError::Backend(format!("critique '{}' not found", id))
                })
            }
        }
    }

    async fn upvote_count(
        &self,
        target: TargetType,
        id: &str,
    ) -> Result<Option<i64>, StoreError> {
        Ok(match target {
            TargetType::Idea => self.idea_by_id(id).await?.map(|i| i.upvote_count),
            TargetType::Critique => self.critique_by_id(id).await?.map(|c| c.upvote_count),
        })
    }

    async fn count_upvotes(&self) -> Result<u64, StoreError> {
        self.upvotes()
            .count_documents(doc! {})
            .await
            .map_err(|e| backend("Upvote count failed", e))
    }

    async fn insert_event(&self, event: ActivityEvent) -> Result<(), StoreError> {
        self.events()
            .insert_one(&event)
            .await
            .map_err(|e| backend("Event insert failed", e))?;
        Ok(())
    }

    async fn list_events(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ActivityEvent>, StoreError> {
        self.events()
            .find(doc! {})
            .sort(doc! { "created_at": -1 })
            .skip(offset as u64)
            .limit(limit as i64)
            .await
            .map_err(|e| backend("Event list failed", e))?
            .try_collect()
            .await
            .map_err(|e| backend("Event list failed", e))
    }

    async fn count_agents(&self) -> Result<u64, StoreError> {
        self.agents()
            .count_documents(doc! {})
            .await
            .map_err(|e| backend("Agent count failed", e))
    }

    async fn count_claimed_agents(&self) -> Result<u64, StoreError> {
        self.agents()
            .count_documents(doc! { "claim_status": "claimed" })
            .await
            .map_err(|e| backend("Agent count failed", e))
    }

    async fn count_ideas(&self) -> Result<u64, StoreError> {
        self.ideas()
            .count_documents(doc! {})
            .await
            .map_err(|e| backend("Idea count failed", e))
    }

    async fn count_critiques(&self) -> Result<u64, StoreError> {
        self.critiques()
            .count_documents(doc! {})
            .await
            .map_err(|e| backend("Critique count failed", e))
    }

    async fn count_critiques_by_agent(&self, agent_id: &str) -> Result<u64, StoreError> {
        self.critiques()
            .count_documents(doc! { "agent_id": agent_id })
            .await
            .map_err(|e| backend("Critique count failed", e))
    }

    async fn top_debated_ideas(&self, limit: usize) -> Result<Vec<Idea>, StoreError> {
        self.ideas()
            .find(doc! {})
            .sort(doc! { "critique_count": -1 })
            .limit(limit as i64)
            .await
            .map_err(|e| backend("Idea list failed", e))?
            .try_collect()
            .await
            .map_err(|e| backend("Idea list failed", e))
    }

    async fn critique_counts_by_agent(&self) -> Result<HashMap<String, u64>, StoreError> {
        let pipeline = vec![doc! {
            "$group": { "_id": "$agent_id", "count": { "$sum": 1 } }
        }];
        let mut cursor = self
            .critiques()
            .aggregate(pipeline)
            .await
            .map_err(|e| backend("Critique aggregation failed", e))?;

        let mut counts = HashMap::new();
        while let Some(row) = cursor
            .try_next()
            .await
            .map_err(|e| backend("Critique aggregation failed", e))?
        {
            let agent_id = row.get_str("_id").unwrap_or_default().to_string();
            let count = row.get_i32("count").map(|n| n as u64).unwrap_or_else(|_| {
                row.get_i64("count").map(|n| n as u64).unwrap_or_default()
            });
            counts.insert(agent_id, count);
        }
        Ok(counts)
    }

    async fn created_at_since(
        &self,
        kind: DailyKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        // Same native-date encoding serde produces at insert time.
        let boundary = bson::DateTime::from_chrono(since);
        let filter = doc! { "created_at": { "$gte": boundary } };
        Ok(match kind {
            DailyKind::Ideas => {
                let ideas: Vec<Idea> = self
                    .ideas()
                    .find(filter)
                    .await
                    .map_err(|e| backend("Idea scan failed", e))?
                    .try_collect()
                    .await
                    .map_err(|e| backend("Idea scan failed", e))?;
                ideas.into_iter().map(|i| i.created_at).collect()
            }
            DailyKind::Critiques => {
                let critiques: Vec<Critique> = self
                    .critiques()
                    .find(filter)
                    .await
                    .map_err(|e| backend("Critique scan failed", e))?
                    .try_collect()
                    .await
                    .map_err(|e| backend("Critique scan failed", e))?;
                critiques.into_iter().map(|c| c.created_at).collect()
            }
        })
    }
}
