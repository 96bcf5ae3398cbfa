//! Liveness probe

use serde_json::json;

use crate::routes::envelope::Reply;
use crate::types::ApiError;

/// `GET /api/health`.
pub async fn health() -> Result<Reply, ApiError> {
    Ok(Reply::ok(json!({ "status": "ok", "app": "roundtable" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ok() {
        let reply = health().await.unwrap();
        assert_eq!(reply.data().unwrap()["status"], "ok");
    }
}
