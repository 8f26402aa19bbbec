//! OAuth code exchange against GitHub
//!
//! The browser-side redirect dance happens entirely in the client; the
//! gateway only performs the final code-for-token POST so the resulting
//! access token never reaches the client.

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Custom error type for the token exchange
#[derive(Error, Debug)]
pub enum OAuthError {
    /// GitHub rejected the exchange (bad or expired code, bad client
    /// credentials); carries the provider's own error fields
    #[error("{error}")]
    Rejected {
        error: String,
        error_description: Option<String>,
    },

    /// GitHub answered 2xx but without a usable access token
    #[error("OAuth response did not contain an access token")]
    Malformed,

    /// Network-level failure talking to the provider
    #[error("OAuth request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth client for GitHub's token endpoint
#[derive(Clone)]
pub struct GithubOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl GithubOAuthClient {
    /// Create a new OAuth client
    pub fn new(client_id: &str, client_secret: &str, token_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token_url: token_url.to_string(),
        }
    }

    /// Exchange an authorization code for an access token.
    ///
    /// GitHub reports exchange failures inside a 200 body as
    /// `{error, error_description}`, so both the status and the body
    /// have to be checked.
    pub async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        info!("Exchanging authorization code for access token");

        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "code": code,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OAuthError::Rejected {
                error: format!("Token exchange failed with status {}", response.status()),
                error_description: None,
            });
        }

        let body: TokenExchangeResponse = response.json().await?;

        if let Some(error) = body.error {
            return Err(OAuthError::Rejected {
                error,
                error_description: body.error_description,
            });
        }

        body.access_token.ok_or(OAuthError::Malformed)
    }
}
