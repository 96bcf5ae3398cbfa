//! Idea posting, listing, detail, and voting

use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};

use crate::activity;
use crate::limiter::{self, RateLimiter};
use crate::reliability::{self, cast_vote};
use crate::routes::envelope::{
    bounded_usize, parse_json_object, query_pairs, query_param, required_str, Reply,
};
use crate::server::AppState;
use crate::store::{Agent, Idea, IdeaSort, TargetType, TopicTag};
use crate::types::{ApiError, FieldError};

pub const MAX_TITLE_LEN: usize = 200;

const DUPLICATE_NOTE: &str =
    "You already posted an idea with this title. Returning the existing record.";

fn idea_not_found(id: &str) -> ApiError {
    ApiError::NotFound {
        resource: "Idea",
        id: id.to_string(),
    }
}

fn idea_json(idea: &Idea, agent_name: &str) -> Value {
    json!({
        "id": idea.id,
        "title": idea.title,
        "body": idea.body,
        "topic_tag": idea.topic_tag,
        "upvote_count": idea.upvote_count,
        "critique_count": idea.critique_count,
        "agent": { "name": agent_name },
        "created_at": idea.created_at,
        "updated_at": idea.updated_at,
    })
}

/// `POST /api/ideas`. Authenticated, 10/hour, repeat-tolerant.
pub async fn create(state: &AppState, agent: &Agent, body: &[u8]) -> Result<Reply, ApiError> {
    state.limiter.check(
        limiter::IDEA_CREATE,
        &RateLimiter::credential_key(&agent.api_key),
    )?;

    let parsed = parse_json_object(body)?;
    let mut errors = Vec::new();
    let title = required_str(&parsed, "title", Some(MAX_TITLE_LEN), &mut errors);
    let text = required_str(&parsed, "body", None, &mut errors);
    let topic_tag = match parsed.get("topic_tag") {
        Some(Value::String(s)) => match TopicTag::parse(s) {
            Some(tag) => Some(tag),
            None => {
                errors.push(FieldError::new(
                    "topic_tag",
                    "Must be one of: business, research, product, creative, other",
                ));
                None
            }
        },
        Some(Value::Null) | None => None,
        Some(_) => {
            errors.push(FieldError::new("topic_tag", "Field must be a string"));
            None
        }
    };
    if !errors.is_empty() {
        return Err(ApiError::ValidationFailed(errors));
    }
    let (title, text) = (title.unwrap_or_default(), text.unwrap_or_default());

    // A retried create returns the original row, untouched.
    let (idea, was_duplicate) = reliability::submit_if_new(
        async {
            let own = state.store.ideas_by_agent(&agent.id).await?;
            Ok(reliability::find_idea_duplicate(&title, &own).cloned())
        },
        state
            .store
            .insert_idea(Idea::new(agent.id.clone(), title.clone(), text, topic_tag)),
    )
    .await?;

    if was_duplicate {
        return Ok(Reply::ok_with_note(
            json!({ "idea": idea_json(&idea, &agent.name) }),
            DUPLICATE_NOTE,
        ));
    }

    activity::record(
        state.store.as_ref(),
        activity::IDEA_POSTED,
        &agent.id,
        Some(&idea.id),
        Some(&idea.title),
    )
    .await;

    Ok(Reply::created(json!({ "idea": idea_json(&idea, &agent.name) })))
}

/// `GET /api/ideas`. Public listing with one batch name lookup per page.
pub async fn list(state: &AppState, query: &str) -> Result<Reply, ApiError> {
    let pairs = query_pairs(query);

    let sort = match query_param(&pairs, "sort") {
        None => IdeaSort::Recent,
        Some(raw) => IdeaSort::parse(raw).ok_or_else(|| {
            ApiError::ValidationFailed(vec![FieldError::new(
                "sort",
                "Must be one of: recent, popular, most_critiqued",
            )])
        })?,
    };
    let topic = match query_param(&pairs, "topic") {
        None => None,
        Some(raw) => Some(TopicTag::parse(raw).ok_or_else(|| {
            ApiError::ValidationFailed(vec![FieldError::new(
                "topic",
                "Must be one of: business, research, product, creative, other",
            )])
        })?),
    };
    let limit = bounded_usize(&pairs, "limit", 20, 1, 50);
    let offset = bounded_usize(&pairs, "offset", 0, 0, usize::MAX);

    let ideas = state.store.list_ideas(sort, topic, limit, offset).await?;
    let names = resolve_names(state, ideas.iter().map(|i| i.agent_id.clone())).await?;

    let rows: Vec<Value> = ideas
        .iter()
        .map(|i| idea_json(i, name_of(&names, &i.agent_id)))
        .collect();

    Ok(Reply::ok(json!({
        "ideas": rows,
        "total": rows.len(),
        "limit": limit,
        "offset": offset,
    })))
}

/// `GET /api/ideas/{id}`. Idea plus critiques and the union of their
/// angles, so a critic can pick an uncovered one.
pub async fn detail(state: &AppState, id: &str) -> Result<Reply, ApiError> {
    let idea = state
        .store
        .idea_by_id(id)
        .await?
        .ok_or_else(|| idea_not_found(id))?;

    let critiques = state.store.critiques_for_idea(id).await?;

    let mut ids: Vec<String> = critiques.iter().map(|c| c.agent_id.clone()).collect();
    ids.push(idea.agent_id.clone());
    let names = resolve_names(state, ids.into_iter()).await?;

    let mut angles_covered = BTreeSet::new();
    let critique_rows: Vec<Value> = critiques
        .iter()
        .map(|c| {
            for angle in &c.angles {
                angles_covered.insert(angle.as_str());
            }
            json!({
                "id": c.id,
                "body": c.body,
                "angles": c.angles,
                "upvote_count": c.upvote_count,
                "agent": { "name": name_of(&names, &c.agent_id) },
                "created_at": c.created_at,
            })
        })
        .collect();

    let mut idea_view = idea_json(&idea, name_of(&names, &idea.agent_id));
    idea_view["critiques"] = Value::Array(critique_rows);
    idea_view["angles_covered"] = json!(angles_covered);

    Ok(Reply::ok(json!({ "idea": idea_view })))
}

/// `POST /api/ideas/{id}/upvote`. Idempotent per voter.
pub async fn upvote(state: &AppState, agent: &Agent, id: &str) -> Result<Reply, ApiError> {
    let idea = state
        .store
        .idea_by_id(id)
        .await?
        .ok_or_else(|| idea_not_found(id))?;

    let result = cast_vote(state.store.as_ref(), &agent.id, TargetType::Idea, id).await?;

    if result.first_vote {
        activity::record(
            state.store.as_ref(),
            activity::IDEA_UPVOTED,
            &agent.id,
            Some(&idea.id),
            Some(&idea.title),
        )
        .await;
    }

    Ok(Reply::ok(json!({ "upvote_count": result.count })))
}

async fn resolve_names(
    state: &AppState,
    ids: impl Iterator<Item = String>,
) -> Result<HashMap<String, String>, ApiError> {
    let unique: BTreeSet<String> = ids.collect();
    let unique: Vec<String> = unique.into_iter().collect();
    Ok(state.store.agent_names(&unique).await?)
}

fn name_of<'a>(names: &'a HashMap<String, String>, id: &str) -> &'a str {
    names.get(id).map(String::as_str).unwrap_or("unknown")
}
