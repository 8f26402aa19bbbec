//! Redis cache module for the issue-triage gateway
//!
//! Thin wrapper around a multiplexed async Redis connection. The gateway
//! stores session records here with a TTL; everything else in the system
//! is fetched on demand and never cached server-side.

use redis::{AsyncCommands, Client};
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Connect to Redis and verify the server is reachable.
    ///
    /// Unlike a lazy client, this pings the server up front so the caller
    /// can decide to degrade to the in-memory store at startup instead of
    /// failing on the first session write.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(StoreError::Connection)?;
        let pool = RedisPool { client };
        pool.health_check().await?;
        info!("Redis session backend initialized at {}", url);
        Ok(pool)
    }

    async fn get_connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::Connection)
    }

    /// Set a key-value pair with a TTL in seconds
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        let _: () = conn
            .set_ex(key, value, ttl_seconds)
            .await
            .map_err(StoreError::Command)?;
        Ok(())
    }

    /// Get a value by key
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await.map_err(StoreError::Command)?;
        Ok(value)
    }

    /// Delete a key; deleting a missing key is not an error
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await.map_err(StoreError::Command)?;
        Ok(())
    }

    /// Check whether a key exists
    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn.exists(key).await.map_err(StoreError::Command)?;
        Ok(exists)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> StoreResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(StoreError::Command)?;
        Ok(pong == "PONG")
    }
}
