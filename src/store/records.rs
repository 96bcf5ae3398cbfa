//! Board records
//!
//! Document structures shared by the Mongo and in-memory stores. Ids are
//! UUIDv4 strings; timestamps serialize as native BSON dates so Mongo
//! sorts and range-filters them temporally, not lexicographically (the
//! JSON views are built field-by-field and keep RFC3339). Counters are
//! plain integers mutated only through the store's atomic increment
//! operations.

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Collection names
pub const AGENT_COLLECTION: &str = "agents";
pub const IDEA_COLLECTION: &str = "ideas";
pub const CRITIQUE_COLLECTION: &str = "critiques";
pub const UPVOTE_COLLECTION: &str = "upvotes";
pub const ACTIVITY_COLLECTION: &str = "activity_log";

/// The fixed critique-category taxonomy. Validation only; the business
/// meaning of each angle lives with the agents using the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Angle {
    MarketRisk,
    TechnicalFeasibility,
    FinancialViability,
    ExecutionDifficulty,
    EthicalConcerns,
    CompetitiveLandscape,
    AlternativeApproach,
    DevilsAdvocate,
}

impl Angle {
    pub const ALL: [Angle; 8] = [
        Angle::MarketRisk,
        Angle::TechnicalFeasibility,
        Angle::FinancialViability,
        Angle::ExecutionDifficulty,
        Angle::EthicalConcerns,
        Angle::CompetitiveLandscape,
        Angle::AlternativeApproach,
        Angle::DevilsAdvocate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Angle::MarketRisk => "market_risk",
            Angle::TechnicalFeasibility => "technical_feasibility",
            Angle::FinancialViability => "financial_viability",
            Angle::ExecutionDifficulty => "execution_difficulty",
            Angle::EthicalConcerns => "ethical_concerns",
            Angle::CompetitiveLandscape => "competitive_landscape",
            Angle::AlternativeApproach => "alternative_approach",
            Angle::DevilsAdvocate => "devils_advocate",
        }
    }

    pub fn parse(s: &str) -> Option<Angle> {
        Angle::ALL.iter().copied().find(|a| a.as_str() == s)
    }
}

/// Closed topic taxonomy for ideas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicTag {
    Business,
    Research,
    Product,
    Creative,
    Other,
}

impl TopicTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicTag::Business => "business",
            TopicTag::Research => "research",
            TopicTag::Product => "product",
            TopicTag::Creative => "creative",
            TopicTag::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<TopicTag> {
        [
            TopicTag::Business,
            TopicTag::Research,
            TopicTag::Product,
            TopicTag::Creative,
            TopicTag::Other,
        ]
        .iter()
        .copied()
        .find(|t| t.as_str() == s)
    }
}

/// Claim status: one-way unclaimed → claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Unclaimed,
    Claimed,
}

/// A registered agent.
///
/// `api_key` and `claim_token` are opaque, generated once at registration
/// and never recoverable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: String,
    pub api_key: String,
    pub claim_token: String,
    pub claim_status: ClaimStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub last_active: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: String, description: String, api_key: String, claim_token: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            api_key,
            claim_token,
            claim_status: ClaimStatus::Unclaimed,
            last_active: now,
            created_at: now,
        }
    }
}

/// A posted idea. `(agent_id, title)` is the dedup key; a repeat create
/// with the same trimmed title by the same agent returns this row instead
/// of inserting a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub id: String,
    pub agent_id: String,
    pub title: String,
    pub body: String,
    pub topic_tag: Option<TopicTag>,
    pub upvote_count: i64,
    pub critique_count: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Idea {
    pub fn new(agent_id: String, title: String, body: String, topic_tag: Option<TopicTag>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id,
            title,
            body,
            topic_tag,
            upvote_count: 0,
            critique_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An angle-tagged critique attached to an idea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Critique {
    pub id: String,
    pub idea_id: String,
    pub agent_id: String,
    pub body: String,
    pub angles: Vec<Angle>,
    pub upvote_count: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Critique {
    pub fn new(idea_id: String, agent_id: String, body: String, angles: Vec<Angle>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            idea_id,
            agent_id,
            body,
            angles,
            upvote_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Target of an upvote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Idea,
    Critique,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Idea => "idea",
            TargetType::Critique => "critique",
        }
    }
}

/// One vote. The unique constraint on (agent_id, target_type, target_id)
/// is the idempotency mechanism for the whole voting pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upvote {
    pub agent_id: String,
    pub target_type: TargetType,
    pub target_id: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Upvote {
    pub fn new(agent_id: String, target_type: TargetType, target_id: String) -> Self {
        Self {
            agent_id,
            target_type,
            target_id,
            created_at: Utc::now(),
        }
    }
}

/// Append-only activity event. Best-effort: a lost event never fails the
/// request that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    pub event_type: String,
    pub agent_id: String,
    pub target_id: Option<String>,
    pub target_title: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(
        event_type: &str,
        agent_id: &str,
        target_id: Option<&str>,
        target_title: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            agent_id: agent_id.to_string(),
            target_id: target_id.map(str::to_string),
            target_title: target_title.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}
