//! Response envelope
//!
//! Every JSON response is `{success, data?, error?, hint?, details?}`.
//! Duplicate-suppressed creates add a top-level `note`; 429 adds
//! `retry_after_seconds`. Route cores build a `Reply` and stay independent
//! of hyper; the server converts it to a response at the edge.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};

use crate::types::{ApiError, FieldError};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Json(Value),
    Html(String),
}

/// A fully-decided response, not yet serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: ReplyBody,
    pub retry_after: Option<u64>,
}

impl Reply {
    pub fn ok(data: Value) -> Reply {
        Reply {
            status: StatusCode::OK,
            body: ReplyBody::Json(json!({ "success": true, "data": data })),
            retry_after: None,
        }
    }

    pub fn created(data: Value) -> Reply {
        Reply {
            status: StatusCode::CREATED,
            body: ReplyBody::Json(json!({ "success": true, "data": data })),
            retry_after: None,
        }
    }

    /// 200 for a repeat submission: the original record plus a note.
    pub fn ok_with_note(data: Value, note: &str) -> Reply {
        Reply {
            status: StatusCode::OK,
            body: ReplyBody::Json(json!({ "success": true, "data": data, "note": note })),
            retry_after: None,
        }
    }

    pub fn html(status: StatusCode, page: String) -> Reply {
        Reply {
            status,
            body: ReplyBody::Html(page),
            retry_after: None,
        }
    }

    pub fn from_error(err: &ApiError) -> Reply {
        let mut body = json!({
            "success": false,
            "error": err.to_string(),
            "hint": err.hint(),
        });
        let mut retry_after = None;
        match err {
            ApiError::ValidationFailed(details) => {
                body["details"] = serde_json::to_value(details).unwrap_or(Value::Null);
            }
            ApiError::RateLimited {
                retry_after_seconds,
                ..
            } => {
                body["retry_after_seconds"] = json!(retry_after_seconds);
                retry_after = Some(*retry_after_seconds);
            }
            _ => {}
        }
        Reply {
            status: err.status(),
            body: ReplyBody::Json(body),
            retry_after,
        }
    }

    /// Peek at the `data` payload. Test helper for route-core assertions.
    pub fn data(&self) -> Option<&Value> {
        match &self.body {
            ReplyBody::Json(v) => v.get("data"),
            ReplyBody::Html(_) => None,
        }
    }

    pub fn note(&self) -> Option<&str> {
        match &self.body {
            ReplyBody::Json(v) => v.get("note").and_then(Value::as_str),
            ReplyBody::Html(_) => None,
        }
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let (content_type, payload) = match self.body {
            ReplyBody::Json(v) => ("application/json", v.to_string()),
            ReplyBody::Html(page) => ("text/html; charset=utf-8", page),
        };
        let mut builder = Response::builder()
            .status(self.status)
            .header("Content-Type", content_type)
            .header("Access-Control-Allow-Origin", "*");
        if let Some(seconds) = self.retry_after {
            builder = builder.header("Retry-After", seconds.to_string());
        }
        builder
            .body(Full::new(Bytes::from(payload)))
            .unwrap_or_else(|_| {
                Response::new(Full::new(Bytes::from_static(b"{\"success\":false}")))
            })
    }
}

/// Parse a request body as a JSON object. Anything else is a field-level
/// validation failure, never a bare 400.
pub fn parse_json_object(body: &[u8]) -> Result<Value, ApiError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| {
        ApiError::ValidationFailed(vec![FieldError::new("body", "Request body must be valid JSON")])
    })?;
    if !value.is_object() {
        return Err(ApiError::ValidationFailed(vec![FieldError::new(
            "body",
            "Request body must be a JSON object",
        )]));
    }
    Ok(value)
}

/// Required trimmed string field. Pushes onto `errors` instead of failing
/// fast so one response reports every bad field.
pub fn required_str(
    value: &Value,
    field: &str,
    max_len: Option<usize>,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let raw = match value.get(field) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => {
            errors.push(FieldError::new(field, "Field is required"));
            return None;
        }
        Some(_) => {
            errors.push(FieldError::new(field, "Field must be a string"));
            return None;
        }
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.push(FieldError::new(field, "Field must not be empty"));
        return None;
    }
    if let Some(max) = max_len {
        if trimmed.chars().count() > max {
            errors.push(FieldError::new(
                field,
                format!("Field must be at most {} characters", max),
            ));
            return None;
        }
    }
    Some(trimmed.to_string())
}

/// Parse a query string into key/value pairs. No percent-decoding beyond
/// what the closed parameter vocabularies need.
pub fn query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

pub fn query_param<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Clamp an integer query parameter into `[min, max]`, falling back to
/// `default` when absent or unparseable.
pub fn bounded_usize(
    pairs: &[(String, String)],
    name: &str,
    default: usize,
    min: usize,
    max: usize,
) -> usize {
    query_param(pairs, name)
        .and_then(|v| v.parse::<usize>().ok())
        .map(|v| v.clamp(min, max))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_reply_carries_hint_and_details() {
        let err = ApiError::ValidationFailed(vec![FieldError::new("title", "Field is required")]);
        let reply = Reply::from_error(&err);
        assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
        match reply.body {
            ReplyBody::Json(v) => {
                assert_eq!(v["success"], false);
                assert_eq!(v["details"][0]["field"], "title");
            }
            _ => panic!("expected JSON body"),
        }
    }

    #[test]
    fn rate_limit_reply_sets_retry_after() {
        let err = ApiError::RateLimited {
            limit: 10,
            retry_after_seconds: 120,
        };
        let reply = Reply::from_error(&err);
        assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(reply.retry_after, Some(120));
        match reply.body {
            ReplyBody::Json(v) => assert_eq!(v["retry_after_seconds"], 120),
            _ => panic!("expected JSON body"),
        }
    }

    #[test]
    fn required_str_collects_all_failures() {
        let body = serde_json::json!({ "title": "   ", "extra": 7 });
        let mut errors = Vec::new();
        assert!(required_str(&body, "title", Some(200), &mut errors).is_none());
        assert!(required_str(&body, "body", None, &mut errors).is_none());
        assert!(required_str(&body, "extra", None, &mut errors).is_none());
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn bounded_usize_clamps_and_defaults() {
        let pairs = query_pairs("limit=500&offset=abc");
        assert_eq!(bounded_usize(&pairs, "limit", 20, 1, 50), 50);
        assert_eq!(bounded_usize(&pairs, "offset", 0, 0, usize::MAX), 0);
        assert_eq!(bounded_usize(&pairs, "missing", 20, 1, 50), 20);
    }
}
