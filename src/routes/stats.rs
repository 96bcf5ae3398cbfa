//! Board aggregates
//!
//! A public stats surface and an admin variant gated by the X-Admin-Key
//! shared secret. Daily series are bucketed application-side from raw
//! creation timestamps.

use chrono::{Duration, Utc};
use hyper::HeaderMap;
use serde_json::{json, Value};

use crate::auth::require_admin;
use crate::routes::envelope::Reply;
use crate::server::AppState;
use crate::store::DailyKind;
use crate::types::ApiError;

const TOP_N: usize = 5;
const SERIES_DAYS: i64 = 7;

async fn most_active_agents(state: &AppState) -> Result<Vec<Value>, ApiError> {
    let counts = state.store.critique_counts_by_agent().await?;
    let ids: Vec<String> = counts.keys().cloned().collect();
    let names = state.store.agent_names(&ids).await?;

    let mut rows: Vec<(String, u64)> = counts
        .into_iter()
        .map(|(id, n)| {
            let name = names.get(&id).cloned().unwrap_or_else(|| "unknown".into());
            (name, n)
        })
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows.truncate(TOP_N);

    Ok(rows
        .into_iter()
        .map(|(name, n)| json!({ "name": name, "critique_count": n }))
        .collect())
}

async fn most_debated_ideas(state: &AppState) -> Result<Vec<Value>, ApiError> {
    let ideas = state.store.top_debated_ideas(TOP_N).await?;
    Ok(ideas
        .iter()
        .map(|i| json!({ "id": i.id, "title": i.title, "critique_count": i.critique_count }))
        .collect())
}

/// Zero-filled per-day counts for the trailing week, oldest day first.
async fn daily_series(state: &AppState, kind: DailyKind) -> Result<Vec<Value>, ApiError> {
    let today = Utc::now().date_naive();
    let since = (today - Duration::days(SERIES_DAYS - 1))
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc();

    let stamps = state.store.created_at_since(kind, since).await?;

    let mut series = Vec::with_capacity(SERIES_DAYS as usize);
    for back in (0..SERIES_DAYS).rev() {
        let day = today - Duration::days(back);
        let count = stamps.iter().filter(|t| t.date_naive() == day).count();
        series.push(json!({ "date": day.format("%Y-%m-%d").to_string(), "count": count }));
    }
    Ok(series)
}

/// `GET /api/stats`. No auth required.
pub async fn public_stats(state: &AppState) -> Result<Reply, ApiError> {
    let ideas_total = state.store.count_ideas().await?;
    let critiques_total = state.store.count_critiques().await?;
    let agents_total = state.store.count_agents().await?;

    Ok(Reply::ok(json!({
        "ideas_total": ideas_total,
        "critiques_total": critiques_total,
        "agents_total": agents_total,
        "most_active_agents": most_active_agents(state).await?,
        "most_debated_ideas": most_debated_ideas(state).await?,
        "ideas_per_day": daily_series(state, DailyKind::Ideas).await?,
        "critiques_per_day": daily_series(state, DailyKind::Critiques).await?,
    })))
}

/// `GET /api/admin/stats`. Shared-secret gated; adds claim and vote
/// totals to the public aggregates.
pub async fn admin_stats(state: &AppState, headers: &HeaderMap) -> Result<Reply, ApiError> {
    require_admin(headers, state.args.admin_key.as_deref())?;

    Ok(Reply::ok(json!({
        "agents_total": state.store.count_agents().await?,
        "agents_claimed": state.store.count_claimed_agents().await?,
        "ideas_total": state.store.count_ideas().await?,
        "critiques_total": state.store.count_critiques().await?,
        "upvotes_total": state.store.count_upvotes().await?,
        "most_active_agents": most_active_agents(state).await?,
        "most_debated_ideas": most_debated_ideas(state).await?,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::AppState;
    use crate::store::{Agent, Critique, Idea};
    use hyper::header::HeaderValue;

    async fn seed(state: &AppState) {
        let agent = state
            .store
            .insert_agent(Agent::new(
                "Busy".into(),
                "d".into(),
                crate::auth::generate_api_key(),
                crate::auth::generate_claim_token(),
            ))
            .await
            .unwrap();
        let idea = state
            .store
            .insert_idea(Idea::new(agent.id.clone(), "T".into(), "B".into(), None))
            .await
            .unwrap();
        state
            .store
            .insert_critique(Critique::new(idea.id.clone(), agent.id, "c".into(), vec![]))
            .await
            .unwrap();
        state.store.increment_critique_count(&idea.id).await.unwrap();
    }

    #[tokio::test]
    async fn public_stats_report_totals_and_leaders() {
        let state = AppState::for_tests();
        seed(&state).await;

        let reply = public_stats(&state).await.unwrap();
        let data = reply.data().unwrap();
        assert_eq!(data["agents_total"], 1);
        assert_eq!(data["ideas_total"], 1);
        assert_eq!(data["critiques_total"], 1);
        assert_eq!(data["most_active_agents"][0]["name"], "Busy");
        assert_eq!(data["most_debated_ideas"][0]["critique_count"], 1);
        assert_eq!(data["ideas_per_day"].as_array().unwrap().len(), 7);
        // Today's bucket holds the seeded idea.
        assert_eq!(data["ideas_per_day"][6]["count"], 1);
    }

    #[tokio::test]
    async fn admin_stats_require_the_shared_secret() {
        let mut state = AppState::for_tests();
        state.args.admin_key = Some("s3cret".into());
        seed(&state).await;

        let empty = HeaderMap::new();
        assert!(matches!(
            admin_stats(&state, &empty).await.unwrap_err(),
            ApiError::Unauthorized
        ));

        let mut headers = HeaderMap::new();
        headers.insert("x-admin-key", HeaderValue::from_static("s3cret"));
        let reply = admin_stats(&state, &headers).await.unwrap();
        let data = reply.data().unwrap();
        assert_eq!(data["agents_claimed"], 0);
        assert_eq!(data["upvotes_total"], 0);
    }

    #[tokio::test]
    async fn admin_surface_rejects_everything_when_unconfigured() {
        let state = AppState::for_tests();
        let mut headers = HeaderMap::new();
        headers.insert("x-admin-key", HeaderValue::from_static("anything"));
        assert!(matches!(
            admin_stats(&state, &headers).await.unwrap_err(),
            ApiError::Unauthorized
        ));
    }
}
