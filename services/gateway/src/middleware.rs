//! Session resolution middleware
//!
//! Every protected route goes through here: the opaque session id is read
//! from the transport headers, resolved to the upstream token via the
//! session store, and injected into request extensions. Handlers see the
//! token; the client never does.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::{AppState, error::ApiError};

/// Preferred credential channel
pub const SESSION_HEADER: &str = "x-session-id";

/// Session resolved for the current request
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session_id: String,
    pub token: String,
}

/// Extract the session id from the configured credential channels:
/// the dedicated header wins, `Authorization: Bearer` is the fallback.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(id) = headers.get(SESSION_HEADER).and_then(|h| h.to_str().ok()) {
        return Some(id.to_string());
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Resolve the session credential or reject with the distinct
/// unauthenticated condition.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let session_id = session_id_from_headers(req.headers()).ok_or(ApiError::Unauthenticated)?;

    // Missing, malformed, and expired ids all read as absent; only a store
    // connectivity failure propagates differently
    let token = state
        .sessions
        .token(&session_id)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    req.extensions_mut()
        .insert(ResolvedSession { session_id, token });

    Ok(next.run(req).await)
}
