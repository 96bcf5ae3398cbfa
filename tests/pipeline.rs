//! End-to-end pipeline tests against the in-memory store.
//!
//! These drive the route cores the same way the HTTP layer does, covering
//! the retry-tolerance guarantees: converging creates, idempotent votes,
//! and per-route quotas.

use hyper::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

use roundtable::reliability::cast_vote;
use roundtable::routes::{agents, critiques, ideas};
use roundtable::server::AppState;
use roundtable::store::{Agent, Idea, TargetType};
use roundtable::types::ApiError;

fn body(v: Value) -> Vec<u8> {
    v.to_string().into_bytes()
}

async fn register(state: &AppState, ip: &str, name: &str) -> (Agent, String) {
    let reply = agents::register(
        state,
        ip,
        &body(json!({ "name": name, "description": "test agent" })),
    )
    .await
    .unwrap();
    let key = reply.data().unwrap()["agent"]["api_key"]
        .as_str()
        .unwrap()
        .to_string();
    let agent = state.store.agent_by_api_key(&key).await.unwrap().unwrap();
    (agent, key)
}

#[tokio::test]
async fn duplicate_registration_yields_one_agent_and_conflict() {
    let state = AppState::for_tests();
    register(&state, "1.1.1.1", "Ada").await;

    let err = agents::register(
        &state,
        "1.1.1.2",
        &body(json!({ "name": " ADA ", "description": "y" })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Conflict { .. }));
    assert_eq!(state.store.count_agents().await.unwrap(), 1);
}

#[tokio::test]
async fn idea_create_converges_on_the_first_record() {
    let state = AppState::for_tests();
    let (agent, _) = register(&state, "1.1.1.1", "Poster").await;

    let first = ideas::create(&state, &agent, &body(json!({ "title": "T", "body": "B" })))
        .await
        .unwrap();
    assert_eq!(first.status, StatusCode::CREATED);
    let first_id = first.data().unwrap()["idea"]["id"].as_str().unwrap().to_string();

    let second = ideas::create(&state, &agent, &body(json!({ "title": "T", "body": "B" })))
        .await
        .unwrap();
    assert_eq!(second.status, StatusCode::OK);
    assert!(second.note().is_some());
    assert_eq!(second.data().unwrap()["idea"]["id"], first_id.as_str());

    assert_eq!(state.store.count_ideas().await.unwrap(), 1);
    // Exactly one idea_posted event despite two calls.
    let events = state.store.list_events(10, 0).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn critique_create_converges_by_body_prefix() {
    let state = AppState::for_tests();
    let (agent, _) = register(&state, "1.1.1.1", "Critic").await;
    let idea = state
        .store
        .insert_idea(Idea::new(agent.id.clone(), "T".into(), "B".into(), None))
        .await
        .unwrap();

    let prefix = "a".repeat(100);
    let first = critiques::create(
        &state,
        &agent,
        &idea.id,
        &body(json!({ "body": format!("{}one", prefix), "angles": ["market_risk"] })),
    )
    .await
    .unwrap();
    let first_id = first.data().unwrap()["critique"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let repeat = critiques::create(
        &state,
        &agent,
        &idea.id,
        &body(json!({ "body": format!("{}two", prefix), "angles": ["ethical_concerns"] })),
    )
    .await
    .unwrap();
    assert_eq!(repeat.status, StatusCode::OK);
    assert_eq!(repeat.data().unwrap()["critique"]["id"], first_id.as_str());

    let idea = state.store.idea_by_id(&idea.id).await.unwrap().unwrap();
    assert_eq!(idea.critique_count, 1);
}

#[tokio::test]
async fn sequential_revotes_equal_one_vote() {
    let state = AppState::for_tests();
    let (agent, _) = register(&state, "1.1.1.1", "Voter").await;
    let idea = state
        .store
        .insert_idea(Idea::new(agent.id.clone(), "T".into(), "B".into(), None))
        .await
        .unwrap();

    for _ in 0..5 {
        let reply = ideas::upvote(&state, &agent, &idea.id).await.unwrap();
        assert_eq!(reply.data().unwrap()["upvote_count"], 1);
    }
}

#[tokio::test]
async fn concurrent_distinct_voters_all_land() {
    let state = Arc::new(AppState::for_tests());
    let idea = state
        .store
        .insert_idea(Idea::new("author".into(), "T".into(), "B".into(), None))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..8 {
        let state = Arc::clone(&state);
        let idea_id = idea.id.clone();
        handles.push(tokio::spawn(async move {
            cast_vote(
                state.store.as_ref(),
                &format!("voter-{}", n),
                TargetType::Idea,
                &idea_id,
            )
            .await
            .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let idea = state.store.idea_by_id(&idea.id).await.unwrap().unwrap();
    assert_eq!(idea.upvote_count, 8);
}

#[tokio::test]
async fn concurrent_same_voter_double_vote_adds_one() {
    let state = Arc::new(AppState::for_tests());
    let idea = state
        .store
        .insert_idea(Idea::new("author".into(), "T".into(), "B".into(), None))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let state = Arc::clone(&state);
        let idea_id = idea.id.clone();
        handles.push(tokio::spawn(async move {
            cast_vote(state.store.as_ref(), "same-voter", TargetType::Idea, &idea_id)
                .await
                .unwrap()
        }));
    }
    let mut first_votes = 0;
    for handle in handles {
        if handle.await.unwrap().first_vote {
            first_votes += 1;
        }
    }
    assert_eq!(first_votes, 1);

    let idea = state.store.idea_by_id(&idea.id).await.unwrap().unwrap();
    assert_eq!(idea.upvote_count, 1);
}

#[tokio::test]
async fn angle_rules_hold_through_the_create_route() {
    let state = AppState::for_tests();
    let (agent, _) = register(&state, "1.1.1.1", "Angler").await;
    let idea = state
        .store
        .insert_idea(Idea::new(agent.id.clone(), "T".into(), "B".into(), None))
        .await
        .unwrap();

    // First-occurrence order survives dedup.
    let reply = critiques::create(
        &state,
        &agent,
        &idea.id,
        &body(json!({
            "body": "ordered",
            "angles": ["execution_difficulty", "market_risk", "execution_difficulty", "market_risk"],
        })),
    )
    .await
    .unwrap();
    assert_eq!(
        reply.data().unwrap()["critique"]["angles"],
        json!(["execution_difficulty", "market_risk"])
    );

    let err = critiques::create(
        &state,
        &agent,
        &idea.id,
        &body(json!({ "body": "bad", "angles": [] })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::ValidationFailed(_)));
}

#[tokio::test]
async fn idea_quota_trips_on_the_eleventh_call() {
    let state = AppState::for_tests();
    let (agent, _) = register(&state, "1.1.1.1", "Prolific").await;

    for n in 0..10 {
        ideas::create(
            &state,
            &agent,
            &body(json!({ "title": format!("idea {}", n), "body": "B" })),
        )
        .await
        .unwrap();
    }
    let err = ideas::create(&state, &agent, &body(json!({ "title": "one more", "body": "B" })))
        .await
        .unwrap_err();
    match err {
        ApiError::RateLimited {
            retry_after_seconds,
            ..
        } => assert!(retry_after_seconds >= 1),
        other => panic!("expected RateLimited, got {:?}", other),
    }

    // A second agent is unaffected.
    let (other, _) = register(&state, "1.1.1.2", "Fresh").await;
    ideas::create(&state, &other, &body(json!({ "title": "fine", "body": "B" })))
        .await
        .unwrap();
}
