//! Public activity feed

use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::routes::envelope::{bounded_usize, query_pairs, Reply};
use crate::server::AppState;
use crate::types::ApiError;

/// `GET /api/activity`. Reverse-chronological, names resolved in one
/// batch lookup per page.
pub async fn feed(state: &AppState, query: &str) -> Result<Reply, ApiError> {
    let pairs = query_pairs(query);
    let limit = bounded_usize(&pairs, "limit", 50, 1, 100);
    let offset = bounded_usize(&pairs, "offset", 0, 0, usize::MAX);

    let events = state.store.list_events(limit, offset).await?;
    let ids: BTreeSet<String> = events.iter().map(|e| e.agent_id.clone()).collect();
    let ids: Vec<String> = ids.into_iter().collect();
    let names = state.store.agent_names(&ids).await?;

    let rows: Vec<Value> = events
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "event_type": e.event_type,
                "target_id": e.target_id,
                "target_title": e.target_title,
                "agent_name": names.get(&e.agent_id).map(String::as_str).unwrap_or("unknown"),
                "created_at": e.created_at,
            })
        })
        .collect();

    Ok(Reply::ok(json!({ "events": rows })))
}
