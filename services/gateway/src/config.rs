//! Gateway configuration loaded from environment variables

use anyhow::{Context, Result};
use std::env;

/// Fixed session lifetime: 24 hours
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 86_400;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// GitHub OAuth application client id
    pub github_client_id: String,
    /// GitHub OAuth application client secret
    pub github_client_secret: String,
    /// Redis URL for the durable session store; absent means in-memory only
    pub redis_url: Option<String>,
    /// Session lifetime in seconds
    pub session_ttl_seconds: u64,
    /// Model identifier sent to the Copilot chat backend
    pub copilot_model: String,
    /// GitHub REST API base URL
    pub github_api_url: String,
    /// OAuth token exchange endpoint
    pub oauth_token_url: String,
    /// Copilot chat completions base URL
    pub copilot_api_url: String,
}

impl AppConfig {
    /// Create a new AppConfig from environment variables
    ///
    /// `GITHUB_CLIENT_ID` and `GITHUB_CLIENT_SECRET` are required; every
    /// other variable has a default. `REDIS_URL` is optional on purpose:
    /// without it the gateway runs on the in-memory session store.
    pub fn from_env() -> Result<Self> {
        let github_client_id =
            env::var("GITHUB_CLIENT_ID").context("GITHUB_CLIENT_ID environment variable not set")?;
        let github_client_secret = env::var("GITHUB_CLIENT_SECRET")
            .context("GITHUB_CLIENT_SECRET environment variable not set")?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let redis_url = env::var("REDIS_URL").ok();

        let session_ttl_seconds = env::var("SESSION_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECONDS);

        let copilot_model = env::var("COPILOT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let github_api_url =
            env::var("GITHUB_API_URL").unwrap_or_else(|_| "https://api.github.com".to_string());
        let oauth_token_url = env::var("OAUTH_TOKEN_URL")
            .unwrap_or_else(|_| "https://github.com/login/oauth/access_token".to_string());
        let copilot_api_url = env::var("COPILOT_API_URL")
            .unwrap_or_else(|_| "https://api.githubcopilot.com".to_string());

        Ok(Self {
            bind_addr,
            github_client_id,
            github_client_secret,
            redis_url,
            session_ttl_seconds,
            copilot_model,
            github_api_url,
            oauth_token_url,
            copilot_api_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "GITHUB_CLIENT_ID",
            "GITHUB_CLIENT_SECRET",
            "BIND_ADDR",
            "REDIS_URL",
            "SESSION_TTL_SECONDS",
            "COPILOT_MODEL",
            "GITHUB_API_URL",
            "OAUTH_TOKEN_URL",
            "COPILOT_API_URL",
        ] {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();
        unsafe {
            env::set_var("GITHUB_CLIENT_ID", "client-id");
            env::set_var("GITHUB_CLIENT_SECRET", "client-secret");
        }

        let config = AppConfig::from_env().expect("Failed to load config");
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.redis_url, None);
        assert_eq!(config.session_ttl_seconds, DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(config.github_api_url, "https://api.github.com");
    }

    #[test]
    #[serial]
    fn test_config_requires_oauth_credentials() {
        clear_env();
        assert!(AppConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_overrides() {
        clear_env();
        unsafe {
            env::set_var("GITHUB_CLIENT_ID", "client-id");
            env::set_var("GITHUB_CLIENT_SECRET", "client-secret");
            env::set_var("SESSION_TTL_SECONDS", "60");
            env::set_var("REDIS_URL", "redis://localhost:6379");
        }

        let config = AppConfig::from_env().expect("Failed to load config");
        assert_eq!(config.session_ttl_seconds, 60);
        assert_eq!(
            config.redis_url,
            Some("redis://localhost:6379".to_string())
        );
    }
}
