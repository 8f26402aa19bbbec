//! Session management
//!
//! Maps an opaque session id to a GitHub access token with a fixed TTL.
//! The client only ever holds the id; the token never leaves the server.
//! Two store implementations share one trait: a concurrent in-memory map
//! and a Redis-backed record with a TTL, selected at startup.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

use common::cache::RedisPool;
use common::error::StoreResult;

use crate::config::AppConfig;

/// Backoff before the single retry of a rate-limited session write
const RETRY_BACKOFF_MS: u64 = 250;

/// Stored session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    fn new(token: &str, ttl_seconds: u64) -> Self {
        let created_at = Utc::now();
        Self {
            id: generate_session_id(),
            token: token.to_string(),
            created_at,
            expires_at: created_at + Duration::seconds(ttl_seconds as i64),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Generate a 256-bit session id, hex-encoded (64 characters).
///
/// Always drawn from the OS RNG, never derived from user data.
fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Check that a client-supplied id has the shape we generate.
///
/// Malformed ids are treated exactly like missing sessions, but rejecting
/// them here keeps arbitrary client strings out of store lookups.
pub fn is_valid_session_id(session_id: &str) -> bool {
    static SESSION_ID_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = SESSION_ID_REGEX.get_or_init(|| {
        Regex::new(r"^[0-9a-f]{64}$").expect("Failed to compile session id regex")
    });
    regex.is_match(session_id)
}

/// Storage abstraction for sessions
///
/// A session is either present and unexpired, or absent; reading an
/// expired record deletes it and reports absence. Only store-connectivity
/// failures propagate as errors.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session holding `token` and return the new opaque id.
    /// The token is write-once; it is never handed back after this call.
    async fn create(&self, token: &str) -> StoreResult<String>;

    /// Resolve an id to its token. Missing, malformed, and expired ids
    /// all yield `None`; expiry deletes the record as a side effect.
    async fn token(&self, session_id: &str) -> StoreResult<Option<String>>;

    /// Delete a session. Deleting an absent session is not an error.
    async fn destroy(&self, session_id: &str) -> StoreResult<()>;
}

/// In-memory session store
///
/// Per-key atomicity comes from the single map lock; eviction is lazy,
/// on the first read after expiry. No cross-restart durability.
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, SessionRecord>>>,
    ttl_seconds: u64,
}

impl MemorySessionStore {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl_seconds,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, token: &str) -> StoreResult<String> {
        let record = SessionRecord::new(token, self.ttl_seconds);
        let id = record.id.clone();
        self.sessions.lock().await.insert(id.clone(), record);
        info!("Created session {}", &id[..8]);
        Ok(id)
    }

    async fn token(&self, session_id: &str) -> StoreResult<Option<String>> {
        if !is_valid_session_id(session_id) {
            return Ok(None);
        }

        let mut sessions = self.sessions.lock().await;
        match sessions.get(session_id) {
            Some(record) if record.is_expired() => {
                sessions.remove(session_id);
                Ok(None)
            }
            Some(record) => Ok(Some(record.token.clone())),
            None => Ok(None),
        }
    }

    async fn destroy(&self, session_id: &str) -> StoreResult<()> {
        self.sessions.lock().await.remove(session_id);
        Ok(())
    }
}

/// Redis-backed session store
///
/// Records are stored as JSON under `session:{id}` with a Redis TTL.
/// The TTL usually evicts for us, but reads still check `expires_at`
/// and delete stale records, so a skewed Redis clock cannot resurrect
/// an expired session.
pub struct RedisSessionStore {
    pool: RedisPool,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(pool: RedisPool, ttl_seconds: u64) -> Self {
        Self { pool, ttl_seconds }
    }

    fn key(session_id: &str) -> String {
        format!("session:{}", session_id)
    }

    async fn write_record(&self, record: &SessionRecord) -> StoreResult<()> {
        let payload = serde_json::to_string(record)?;
        self.pool
            .set(&Self::key(&record.id), &payload, self.ttl_seconds)
            .await
    }
}

/// Run a store write, retrying exactly once after a backoff if the store
/// signalled a transient condition; any second failure propagates.
async fn write_with_retry<F, Fut>(write: F) -> StoreResult<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = StoreResult<()>>,
{
    match write().await {
        Ok(()) => Ok(()),
        Err(e) if e.is_retryable() => {
            warn!("Session write hit a transient store error, retrying once: {}", e);
            tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS)).await;
            write().await
        }
        Err(e) => Err(e),
    }
}

/// Decode a stored record; corrupt data reads as absent rather than as a
/// store failure (only connectivity errors propagate to callers).
fn decode_record(payload: &str) -> Option<SessionRecord> {
    match serde_json::from_str(payload) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Dropping undecodable session record: {}", e);
            None
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, token: &str) -> StoreResult<String> {
        let record = SessionRecord::new(token, self.ttl_seconds);

        write_with_retry(|| self.write_record(&record)).await?;

        info!("Created session {}", &record.id[..8]);
        Ok(record.id)
    }

    async fn token(&self, session_id: &str) -> StoreResult<Option<String>> {
        if !is_valid_session_id(session_id) {
            return Ok(None);
        }

        let key = Self::key(session_id);
        let Some(payload) = self.pool.get(&key).await? else {
            return Ok(None);
        };

        let Some(record) = decode_record(&payload) else {
            self.pool.delete(&key).await?;
            return Ok(None);
        };
        if record.is_expired() {
            self.pool.delete(&key).await?;
            return Ok(None);
        }

        Ok(Some(record.token))
    }

    async fn destroy(&self, session_id: &str) -> StoreResult<()> {
        self.pool.delete(&Self::key(session_id)).await
    }
}

/// Select and initialize the session store from configuration.
///
/// A configured but unreachable Redis must not take the process down:
/// the gateway degrades to the in-memory store with the same external
/// contract and logs the weaker durability once.
pub async fn init_session_store(config: &AppConfig) -> Arc<dyn SessionStore> {
    let ttl = config.session_ttl_seconds;

    match &config.redis_url {
        Some(url) => match RedisPool::connect(url).await {
            Ok(pool) => Arc::new(RedisSessionStore::new(pool, ttl)),
            Err(e) => {
                warn!(
                    "Redis session store unavailable ({}); falling back to in-memory store, \
                     sessions will not survive a restart",
                    e
                );
                Arc::new(MemorySessionStore::new(ttl))
            }
        },
        None => {
            info!("No REDIS_URL configured, using in-memory session store");
            Arc::new(MemorySessionStore::new(ttl))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id();
        assert_eq!(id.len(), 64);
        assert!(is_valid_session_id(&id));

        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("not-a-session-id"));
        // Uppercase hex is not what we generate
        assert!(!is_valid_session_id(&id.to_uppercase()));
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[tokio::test]
    async fn test_create_then_token_roundtrip() {
        let store = MemorySessionStore::new(3600);
        let id = store.create("ghp_secret").await.unwrap();

        assert_eq!(store.token(&id).await.unwrap(), Some("ghp_secret".into()));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let store = MemorySessionStore::new(3600);
        let id = store.create("ghp_secret").await.unwrap();

        store.destroy(&id).await.unwrap();
        assert_eq!(store.token(&id).await.unwrap(), None);

        // Destroying an absent session is fine
        store.destroy(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_session_is_lazily_evicted() {
        let store = MemorySessionStore::new(0);
        let id = store.create("ghp_secret").await.unwrap();

        assert_eq!(store.token(&id).await.unwrap(), None);
        // The read deleted the record, not just hid it
        assert!(!store.sessions.lock().await.contains_key(&id));
    }

    #[tokio::test]
    async fn test_malformed_id_reads_as_absent() {
        let store = MemorySessionStore::new(3600);
        assert_eq!(store.token("definitely-not-hex").await.unwrap(), None);
    }

    fn transient_error() -> common::error::StoreError {
        common::error::StoreError::Command(redis::RedisError::from((
            redis::ErrorKind::TryAgain,
            "try again",
        )))
    }

    fn fatal_error() -> common::error::StoreError {
        common::error::StoreError::Command(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "connection reset",
        )))
    }

    #[tokio::test]
    async fn test_transient_write_is_retried_once_then_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = write_with_retry(|| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(transient_error())
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_transient_failure_propagates() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = write_with_retry(|| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transient_error())
            }
        })
        .await;

        assert!(result.is_err());
        // One retry, never more
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_write_is_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = write_with_retry(|| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(fatal_error())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_corrupt_record_reads_as_absent() {
        assert!(decode_record("{ not json").is_none());
        assert!(decode_record("").is_none());

        let record = SessionRecord::new("ghp_secret", 3600);
        let payload = serde_json::to_string(&record).unwrap();
        assert_eq!(decode_record(&payload).unwrap().token, "ghp_secret");
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            github_client_id: "test-client-id".to_string(),
            github_client_secret: "test-client-secret".to_string(),
            redis_url: Some("redis://127.0.0.1:1".to_string()),
            session_ttl_seconds: 3600,
            copilot_model: "gpt-4o".to_string(),
            github_api_url: "https://api.github.com".to_string(),
            oauth_token_url: "https://github.com/login/oauth/access_token".to_string(),
            copilot_api_url: "https://api.githubcopilot.com".to_string(),
        };

        // Nothing listens on port 1; the gateway must come up anyway with
        // the same external contract
        let store = init_session_store(&config).await;

        let id = store.create("ghp_secret").await.unwrap();
        assert_eq!(store.token(&id).await.unwrap(), Some("ghp_secret".into()));
        store.destroy(&id).await.unwrap();
        assert_eq!(store.token(&id).await.unwrap(), None);
    }
}
