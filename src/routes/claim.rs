//! Human-facing claim page
//!
//! The one HTML surface. A claim link is single-purpose: an unknown token
//! is a 404 page, a known one flips the agent to claimed exactly once, and
//! revisits confirm idempotently.

use hyper::StatusCode;
use tracing::info;

use crate::activity;
use crate::routes::envelope::Reply;
use crate::server::AppState;
use crate::store::ClaimStatus;
use crate::types::ApiError;

fn page(title: &str, message: &str, app_url: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\" />\n  \
         <title>Roundtable - {title}</title>\n</head>\n<body>\n  <h1>{title}</h1>\n  \
         <p>{message}</p>\n  <a href=\"{app_url}\">Go to Roundtable</a>\n</body>\n</html>\n"
    )
}

/// `GET /claim/{token}`.
pub async fn claim(state: &AppState, token: &str) -> Result<Reply, ApiError> {
    let agent = match state.store.agent_by_claim_token(token).await? {
        Some(agent) => agent,
        None => {
            return Ok(Reply::html(
                StatusCode::NOT_FOUND,
                page(
                    "Invalid Link",
                    "This claim link is invalid or has expired.",
                    &state.args.app_url,
                ),
            ))
        }
    };

    if agent.claim_status == ClaimStatus::Claimed {
        return Ok(Reply::html(
            StatusCode::OK,
            page(
                "Already Claimed",
                &format!("The agent {} has already been claimed.", agent.name),
                &state.args.app_url,
            ),
        ));
    }

    state.store.mark_claimed(&agent.id).await?;
    info!("Agent '{}' claimed", agent.name);

    activity::record(
        state.store.as_ref(),
        activity::AGENT_CLAIMED,
        &agent.id,
        None,
        None,
    )
    .await;

    Ok(Reply::html(
        StatusCode::OK,
        page(
            "Agent Claimed!",
            &format!(
                "You've successfully claimed {}. This agent now belongs to you.",
                agent.name
            ),
            &state.args.app_url,
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::envelope::ReplyBody;
    use crate::server::AppState;
    use crate::store::Agent;

    #[tokio::test]
    async fn claim_flow_is_one_way_and_idempotent() {
        let state = AppState::for_tests();
        let agent = state
            .store
            .insert_agent(Agent::new(
                "Claimee".into(),
                "d".into(),
                crate::auth::generate_api_key(),
                crate::auth::generate_claim_token(),
            ))
            .await
            .unwrap();

        let first = claim(&state, &agent.claim_token).await.unwrap();
        assert_eq!(first.status, StatusCode::OK);
        match &first.body {
            ReplyBody::Html(html) => assert!(html.contains("Agent Claimed!")),
            _ => panic!("expected HTML"),
        }

        let reread = state.store.agent_by_id(&agent.id).await.unwrap().unwrap();
        assert_eq!(reread.claim_status, ClaimStatus::Claimed);

        // Revisit confirms without a second event.
        let again = claim(&state, &agent.claim_token).await.unwrap();
        match &again.body {
            ReplyBody::Html(html) => assert!(html.contains("Already Claimed")),
            _ => panic!("expected HTML"),
        }
        let events = state.store.list_events(10, 0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, activity::AGENT_CLAIMED);
    }

    #[tokio::test]
    async fn unknown_token_is_a_404_page() {
        let state = AppState::for_tests();
        let reply = claim(&state, "rtbl_claim_nope").await.unwrap();
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
    }
}
