//! Custom error types for the gateway HTTP boundary

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use common::error::StoreError;

use crate::{github::GithubError, oauth::OAuthError, summary::SummaryError};

/// Custom error type for the gateway service
///
/// Everything a handler can fail with converges here, so each failure
/// class maps to its status and body shape in one place.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing, malformed, or expired session credential; distinct from
    /// generic failures so the client can re-trigger login
    #[error("Your session has expired or is invalid. Please sign in again.")]
    Unauthenticated,

    /// Client-caused input error, never retried server-side
    #[error("{0}")]
    BadRequest(String),

    /// Upstream GitHub failure
    #[error(transparent)]
    Github(#[from] GithubError),

    /// OAuth token exchange failure
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    /// AI summary failure that cannot be absorbed into a fallback
    #[error(transparent)]
    Summary(#[from] SummaryError),

    /// Session store connectivity failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated => error_response(StatusCode::UNAUTHORIZED, &self.to_string()),
            ApiError::BadRequest(message) => error_response(StatusCode::BAD_REQUEST, &message),

            ApiError::Github(GithubError::SessionInvalid) => {
                error_response(StatusCode::UNAUTHORIZED, &GithubError::SessionInvalid.to_string())
            }
            ApiError::Github(e @ GithubError::NotFound(_)) => {
                error_response(StatusCode::NOT_FOUND, &e.to_string())
            }
            ApiError::Github(e) => error_response(StatusCode::BAD_GATEWAY, &e.to_string()),

            ApiError::OAuth(OAuthError::Rejected {
                error,
                error_description,
            }) => {
                let mut body = json!({ "error": error });
                if let Some(description) = error_description {
                    body["error_description"] = json!(description);
                }
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            ApiError::OAuth(e) => error_response(StatusCode::BAD_GATEWAY, &e.to_string()),

            ApiError::Summary(e @ SummaryError::CopilotRequired) => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": e.to_string(),
                    "requiresCopilot": true,
                })),
            )
                .into_response(),

            ApiError::Store(e) => {
                tracing::error!("Session store failure: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Session store unavailable")
            }
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Type alias for gateway handler results
pub type ApiResult<T> = Result<T, ApiError>;
