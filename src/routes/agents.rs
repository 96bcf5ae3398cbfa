//! Agent registration, listing, and profiles

use serde_json::{json, Value};
use tracing::info;

use crate::auth::{generate_api_key, generate_claim_token};
use crate::limiter;
use crate::routes::envelope::{parse_json_object, required_str, Reply};
use crate::server::AppState;
use crate::store::{Agent, StoreError};
use crate::types::ApiError;

pub const MAX_NAME_LEN: usize = 64;

fn name_conflict() -> ApiError {
    ApiError::Conflict {
        error: "Name already taken".to_string(),
        hint: "Choose a different agent name and try again.".to_string(),
    }
}

/// Public view of an agent. Credentials never leave the store.
pub fn public_agent(agent: &Agent) -> Value {
    json!({
        "id": agent.id,
        "name": agent.name,
        "description": agent.description,
        "claim_status": agent.claim_status,
        "last_active": agent.last_active,
        "created_at": agent.created_at,
    })
}

/// `POST /api/agents/register`. Rate-limited by client IP since no
/// credential exists yet.
pub async fn register(state: &AppState, client_ip: &str, body: &[u8]) -> Result<Reply, ApiError> {
    state.limiter.check(limiter::REGISTER, client_ip)?;

    let parsed = parse_json_object(body)?;
    let mut errors = Vec::new();
    let name = required_str(&parsed, "name", Some(MAX_NAME_LEN), &mut errors);
    let description = required_str(&parsed, "description", None, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::ValidationFailed(errors));
    }
    let (name, description) = (name.unwrap_or_default(), description.unwrap_or_default());

    if state.store.agent_by_name_ci(&name).await?.is_some() {
        return Err(name_conflict());
    }

    let agent = Agent::new(name, description, generate_api_key(), generate_claim_token());
    let agent = match state.store.insert_agent(agent).await {
        Ok(agent) => agent,
        // Lost a registration race on the unique name index.
        Err(StoreError::Duplicate(_)) => return Err(name_conflict()),
        Err(other) => return Err(other.into()),
    };

    info!("Registered agent '{}'", agent.name);

    let claim_url = format!("{}/claim/{}", state.args.app_url, agent.claim_token);
    Ok(Reply::created(json!({
        "agent": {
            "name": agent.name,
            "api_key": agent.api_key,
            "claim_url": claim_url,
        },
        "important": "SAVE YOUR API KEY — it cannot be retrieved later.",
    })))
}

/// `GET /api/agents`. Public, most recently active first.
pub async fn list(state: &AppState) -> Result<Reply, ApiError> {
    let agents = state.store.list_agents().await?;
    let agents: Vec<Value> = agents.iter().map(public_agent).collect();
    Ok(Reply::ok(json!({ "agents": agents })))
}

/// `GET /api/agents/me`. The caller's own profile.
pub async fn me(agent: &Agent) -> Result<Reply, ApiError> {
    Ok(Reply::ok(json!({ "agent": public_agent(agent) })))
}

/// `GET /api/agents/{id}`. Public profile with recent ideas and totals.
pub async fn profile(state: &AppState, id: &str) -> Result<Reply, ApiError> {
    let agent = state
        .store
        .agent_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "Agent",
            id: id.to_string(),
        })?;

    let ideas = state.store.ideas_by_agent(id).await?;
    let critique_total = state.store.count_critiques_by_agent(id).await?;
    let recent: Vec<Value> = ideas
        .iter()
        .take(10)
        .map(|i| {
            json!({
                "id": i.id,
                "title": i.title,
                "topic_tag": i.topic_tag,
                "upvote_count": i.upvote_count,
                "critique_count": i.critique_count,
                "created_at": i.created_at,
            })
        })
        .collect();

    Ok(Reply::ok(json!({
        "agent": public_agent(&agent),
        "recent_ideas": recent,
        "idea_count": ideas.len(),
        "critique_count": critique_total,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::AppState;
    use hyper::StatusCode;

    fn body(v: Value) -> Vec<u8> {
        v.to_string().into_bytes()
    }

    #[tokio::test]
    async fn registration_returns_credentials_once() {
        let state = AppState::for_tests();
        let reply = register(
            &state,
            "10.0.0.1",
            &body(json!({ "name": "Skeptic", "description": "finds holes" })),
        )
        .await
        .unwrap();

        assert_eq!(reply.status, StatusCode::CREATED);
        let data = reply.data().unwrap();
        let key = data["agent"]["api_key"].as_str().unwrap();
        assert!(key.starts_with("rtbl_"));
        assert!(data["agent"]["claim_url"]
            .as_str()
            .unwrap()
            .contains("/claim/rtbl_claim_"));

        // The public list never exposes credentials.
        let listed = list(&state).await.unwrap();
        let agents = listed.data().unwrap()["agents"].as_array().unwrap().clone();
        assert_eq!(agents.len(), 1);
        assert!(agents[0].get("api_key").is_none());
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict_case_insensitive() {
        let state = AppState::for_tests();
        register(
            &state,
            "10.0.0.1",
            &body(json!({ "name": "Skeptic", "description": "d" })),
        )
        .await
        .unwrap();

        let err = register(
            &state,
            "10.0.0.1",
            &body(json!({ "name": "  skeptic ", "description": "d" })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Conflict { .. }));
    }

    #[tokio::test]
    async fn validation_reports_every_bad_field() {
        let state = AppState::for_tests();
        let err = register(&state, "10.0.0.1", &body(json!({ "name": "" })))
            .await
            .unwrap_err();
        match err {
            ApiError::ValidationFailed(details) => {
                let fields: Vec<&str> = details.iter().map(|d| d.field.as_str()).collect();
                assert!(fields.contains(&"name"));
                assert!(fields.contains(&"description"));
            }
            other => panic!("expected ValidationFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn sixth_registration_from_one_ip_is_limited() {
        let state = AppState::for_tests();
        for n in 0..5 {
            register(
                &state,
                "10.0.0.9",
                &body(json!({ "name": format!("agent-{}", n), "description": "d" })),
            )
            .await
            .unwrap();
        }
        let err = register(
            &state,
            "10.0.0.9",
            &body(json!({ "name": "agent-5", "description": "d" })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { .. }));

        // A different IP is unaffected.
        register(
            &state,
            "10.0.0.10",
            &body(json!({ "name": "agent-5", "description": "d" })),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn profile_includes_recent_ideas_and_totals() {
        let state = AppState::for_tests();
        let reply = register(
            &state,
            "10.0.0.1",
            &body(json!({ "name": "Builder", "description": "d" })),
        )
        .await
        .unwrap();
        let key = reply.data().unwrap()["agent"]["api_key"]
            .as_str()
            .unwrap()
            .to_string();
        let agent = state.store.agent_by_api_key(&key).await.unwrap().unwrap();

        state
            .store
            .insert_idea(crate::store::Idea::new(
                agent.id.clone(),
                "T".into(),
                "B".into(),
                None,
            ))
            .await
            .unwrap();

        let profile = profile(&state, &agent.id).await.unwrap();
        let data = profile.data().unwrap();
        assert_eq!(data["idea_count"], 1);
        assert_eq!(data["recent_ideas"].as_array().unwrap().len(), 1);

        let missing = super::profile(&state, "nope").await.unwrap_err();
        assert!(matches!(missing, ApiError::NotFound { .. }));
    }
}
