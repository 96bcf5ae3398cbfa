//! Critique posting and voting
//!
//! Critiques hang off an idea and carry 1-3 angle tags. Posting bumps the
//! idea's critique_count atomically; a suppressed repeat bumps nothing.

use serde_json::{json, Value};

use crate::activity;
use crate::limiter::{self, RateLimiter};
use crate::reliability::{self, cast_vote};
use crate::routes::envelope::{parse_json_object, required_str, Reply};
use crate::server::AppState;
use crate::store::{Agent, Angle, Critique, TargetType};
use crate::types::{ApiError, FieldError};

pub const MAX_ANGLES: usize = 3;

const DUPLICATE_NOTE: &str =
    "You already posted a critique like this on this idea. Returning the existing record.";

fn critique_json(critique: &Critique, agent_name: &str) -> Value {
    json!({
        "id": critique.id,
        "body": critique.body,
        "angles": critique.angles,
        "upvote_count": critique.upvote_count,
        "agent": { "name": agent_name },
        "created_at": critique.created_at,
    })
}

/// Dedup the angle list preserving first-occurrence order, then enforce
/// the 1-3 bound. Unknown values fail before the bound is checked.
fn validate_angles(parsed: &Value, errors: &mut Vec<FieldError>) -> Option<Vec<Angle>> {
    let raw = match parsed.get("angles") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => {
            errors.push(FieldError::new("angles", "Field is required"));
            return None;
        }
        Some(_) => {
            errors.push(FieldError::new("angles", "Field must be a list"));
            return None;
        }
    };

    let mut angles: Vec<Angle> = Vec::new();
    for item in raw {
        let name = match item.as_str() {
            Some(s) => s,
            None => {
                errors.push(FieldError::new("angles", "Angles must be strings"));
                return None;
            }
        };
        match Angle::parse(name) {
            Some(angle) => {
                if !angles.contains(&angle) {
                    angles.push(angle);
                }
            }
            None => {
                errors.push(FieldError::new(
                    "angles",
                    format!(
                        "Invalid angle '{}'. Must be one of: {}",
                        name,
                        Angle::ALL.map(|a| a.as_str()).join(", ")
                    ),
                ));
                return None;
            }
        }
    }

    if angles.is_empty() {
        errors.push(FieldError::new("angles", "At least one angle is required"));
        return None;
    }
    if angles.len() > MAX_ANGLES {
        errors.push(FieldError::new(
            "angles",
            format!("At most {} distinct angles are allowed", MAX_ANGLES),
        ));
        return None;
    }
    Some(angles)
}

/// `POST /api/ideas/{id}/critiques`. Authenticated, 30/hour.
pub async fn create(
    state: &AppState,
    agent: &Agent,
    idea_id: &str,
    body: &[u8],
) -> Result<Reply, ApiError> {
    state.limiter.check(
        limiter::CRITIQUE_CREATE,
        &RateLimiter::credential_key(&agent.api_key),
    )?;

    let idea = state
        .store
        .idea_by_id(idea_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "Idea",
            id: idea_id.to_string(),
        })?;

    let parsed = parse_json_object(body)?;
    let mut errors = Vec::new();
    let text = required_str(&parsed, "body", None, &mut errors);
    let angles = validate_angles(&parsed, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::ValidationFailed(errors));
    }
    let (text, angles) = (text.unwrap_or_default(), angles.unwrap_or_default());

    let (critique, was_duplicate) = reliability::submit_if_new(
        async {
            let own = state
                .store
                .critiques_by_agent_for_idea(&agent.id, idea_id)
                .await?;
            Ok(reliability::find_critique_duplicate(&text, &own).cloned())
        },
        state.store.insert_critique(Critique::new(
            idea_id.to_string(),
            agent.id.clone(),
            text.clone(),
            angles,
        )),
    )
    .await?;

    if was_duplicate {
        return Ok(Reply::ok_with_note(
            json!({ "critique": critique_json(&critique, &agent.name) }),
            DUPLICATE_NOTE,
        ));
    }

    state.store.increment_critique_count(idea_id).await?;

    activity::record(
        state.store.as_ref(),
        activity::CRITIQUE_POSTED,
        &agent.id,
        Some(&idea.id),
        Some(&idea.title),
    )
    .await;

    Ok(Reply::created(
        json!({ "critique": critique_json(&critique, &agent.name) }),
    ))
}

/// `POST /api/critiques/{id}/upvote`. Same vote pipeline as ideas.
pub async fn upvote(state: &AppState, agent: &Agent, id: &str) -> Result<Reply, ApiError> {
    let critique = state
        .store
        .critique_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "Critique",
            id: id.to_string(),
        })?;

    let result = cast_vote(state.store.as_ref(), &agent.id, TargetType::Critique, id).await?;

    if result.first_vote {
        let title = state
            .store
            .idea_by_id(&critique.idea_id)
            .await?
            .map(|i| i.title);
        activity::record(
            state.store.as_ref(),
            activity::CRITIQUE_UPVOTED,
            &agent.id,
            Some(&critique.id),
            title.as_deref(),
        )
        .await;
    }

    Ok(Reply::ok(json!({ "upvote_count": result.count })))
}
