//! Gateway routes
//!
//! Thin dispatch over the session store, the GitHub proxy, and the AI
//! summary orchestrator. Protected routes resolve their session through
//! the middleware; `/logout` only needs a syntactically present credential
//! because destroying a session is idempotent either way.

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    github::{Issue, IssueState},
    middleware::{ResolvedSession, session_id_from_headers, session_middleware},
    summary::SummaryOutcome,
};

/// Request body for the token exchange
#[derive(Deserialize)]
pub struct GithubTokenRequest {
    pub code: Option<String>,
}

/// Response for a successful token exchange
#[derive(Serialize)]
pub struct GithubTokenResponse {
    pub session_id: String,
}

/// Query parameters for the issue listing
#[derive(Deserialize)]
pub struct IssuesQuery {
    pub repo: Option<String>,
    pub labels: Option<String>,
}

/// Request body for an issue state change
#[derive(Deserialize)]
pub struct UpdateIssueRequest {
    pub state: IssueState,
}

/// Request body for an AI summary
#[derive(Deserialize)]
pub struct AiSummaryRequest {
    pub issue: Option<Issue>,
}

/// Response for an AI summary
#[derive(Serialize)]
pub struct AiSummaryResponse {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
}

/// Create the router for the gateway service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/issues", get(list_issues))
        .route("/issues/:owner/:repo/:number", patch(update_issue))
        .route("/ai-summary", post(ai_summary))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/github-token", post(github_token))
        .route("/logout", post(logout))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "copilotAvailable": !state.config.copilot_model.is_empty(),
        "message": "issue-triage gateway",
    }))
}

/// Exchange an OAuth authorization code for a new session
pub async fn github_token(
    State(state): State<AppState>,
    Json(payload): Json<GithubTokenRequest>,
) -> ApiResult<impl IntoResponse> {
    let code = payload
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".to_string()))?;

    let token = state.oauth.exchange_code(&code).await?;

    // The token goes straight into the store; from here on the client
    // only ever sees the opaque session id
    let session_id = state.sessions.create(&token).await?;

    Ok(Json(GithubTokenResponse { session_id }))
}

/// Destroy the caller's session
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let session_id = session_id_from_headers(&headers).ok_or(ApiError::Unauthenticated)?;

    state.sessions.destroy(&session_id).await?;
    info!("Session destroyed on logout");

    Ok(Json(json!({ "ok": true })))
}

/// List the caller's open issues, optionally scoped to one repository
/// and filtered by labels
pub async fn list_issues(
    State(state): State<AppState>,
    Extension(session): Extension<ResolvedSession>,
    Query(query): Query<IssuesQuery>,
) -> ApiResult<impl IntoResponse> {
    let issues = state
        .github
        .list_issues(&session.token, query.repo.as_deref(), query.labels.as_deref())
        .await?;

    Ok(Json(issues))
}

/// Open or close a single issue
pub async fn update_issue(
    State(state): State<AppState>,
    Extension(session): Extension<ResolvedSession>,
    Path((owner, repo, number)): Path<(String, String, u64)>,
    Json(payload): Json<UpdateIssueRequest>,
) -> ApiResult<impl IntoResponse> {
    let issue = state
        .github
        .set_issue_state(&session.token, &owner, &repo, number, payload.state)
        .await?;

    Ok(Json(issue))
}

/// Produce an AI (or fallback) summary for one issue
pub async fn ai_summary(
    State(state): State<AppState>,
    Extension(session): Extension<ResolvedSession>,
    Json(payload): Json<AiSummaryRequest>,
) -> ApiResult<impl IntoResponse> {
    let issue = payload
        .issue
        .ok_or_else(|| ApiError::BadRequest("Missing issue payload".to_string()))?;

    let response = match state
        .summarizer
        .summarize_issue(&session.token, &issue)
        .await?
    {
        SummaryOutcome::Ai(summary) => AiSummaryResponse {
            summary,
            fallback: None,
        },
        SummaryOutcome::Fallback(summary) => AiSummaryResponse {
            summary,
            fallback: Some(true),
        },
    };

    Ok(Json(response))
}
