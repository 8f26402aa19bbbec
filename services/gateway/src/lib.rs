//! Issue-triage gateway
//!
//! Backend proxy for the issue-triage swipe client: exchanges OAuth codes
//! for server-held sessions, proxies GitHub issue reads and state changes
//! with the session's token, and orchestrates per-issue AI summaries with
//! a deterministic fallback. The client only ever holds an opaque session
//! id; the GitHub token never leaves this process.

use std::sync::Arc;

pub mod config;
pub mod copilot;
pub mod error;
pub mod github;
pub mod middleware;
pub mod oauth;
pub mod routes;
pub mod session;
pub mod summary;

use crate::{
    config::AppConfig,
    github::GithubClient,
    oauth::GithubOAuthClient,
    session::SessionStore,
    summary::{ChatBackend, SummaryOrchestrator},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub oauth: GithubOAuthClient,
    pub github: GithubClient,
    pub summarizer: SummaryOrchestrator,
}

impl AppState {
    /// Wire up the application state from configuration plus the two
    /// injectable seams: the session store and the chat backend.
    pub fn new(
        config: AppConfig,
        sessions: Arc<dyn SessionStore>,
        chat_backend: Arc<dyn ChatBackend>,
    ) -> Self {
        let oauth = GithubOAuthClient::new(
            &config.github_client_id,
            &config.github_client_secret,
            &config.oauth_token_url,
        );
        let github = GithubClient::new(&config.github_api_url);
        let summarizer = SummaryOrchestrator::new(chat_backend);

        Self {
            config,
            sessions,
            oauth,
            github,
            summarizer,
        }
    }
}
