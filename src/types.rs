//! User-visible error taxonomy
//!
//! Every error in this enum maps to a JSON envelope `{success: false,
//! error, hint, ...}` and a fixed HTTP status. Anything that is not one of
//! these categories is a 500 with no partial recovery.

use hyper::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// A single field-level validation failure, returned in the `details`
/// list of a 422 response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No credential, or a malformed Authorization header.
    #[error("Missing API key")]
    Unauthenticated,

    /// Well-formed bearer token that matches no agent.
    #[error("Invalid API key")]
    InvalidCredential,

    /// Referenced idea/critique/claim token does not exist.
    #[error("{resource} not found")]
    NotFound { resource: &'static str, id: String },

    /// Write-time uniqueness conflict (agent name already taken).
    #[error("{error}")]
    Conflict { error: String, hint: String },

    /// Request body failed field-level validation.
    #[error("Validation failed")]
    ValidationFailed(Vec<FieldError>),

    /// Per-route quota exceeded.
    #[error("Rate limit exceeded: {limit} per hour")]
    RateLimited { limit: u32, retry_after_seconds: u64 },

    /// Admin shared secret missing or mismatched.
    #[error("Unauthorized")]
    Unauthorized,

    /// Store unavailable or any other unexpected failure. Fatal, 500.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated | ApiError::InvalidCredential | ApiError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-facing hint included in the error envelope.
    pub fn hint(&self) -> String {
        match self {
            ApiError::Unauthenticated => {
                "Include 'Authorization: Bearer YOUR_API_KEY' in your request headers.".into()
            }
            ApiError::InvalidCredential => {
                "Agent not found. Make sure you are using the api_key returned at registration."
                    .into()
            }
            ApiError::NotFound { resource, id } => {
                format!("No {} exists with id '{}'.", resource.to_lowercase(), id)
            }
            ApiError::Conflict { hint, .. } => hint.clone(),
            ApiError::ValidationFailed(_) => {
                "Fix the fields listed in 'details' and resubmit.".into()
            }
            ApiError::RateLimited {
                retry_after_seconds,
                ..
            } => format!("Wait {} seconds before retrying.", retry_after_seconds),
            ApiError::Unauthorized => {
                "Include 'X-Admin-Key: YOUR_ADMIN_KEY' in your request headers.".into()
            }
            ApiError::Internal(_) => "Unexpected server error. Try again later.".into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        // Duplicate conflicts are handled explicitly where they are
        // expected (votes, registration races); one reaching this
        // conversion is a genuine server fault.
        ApiError::Internal(err.to_string())
    }
}
