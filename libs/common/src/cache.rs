//! Redis access for short-lived shared state
//!
//! Values are stored as JSON under a configurable key prefix, always with an
//! expiry. The API service keeps check-in credentials here when it runs as
//! more than one instance.

use std::time::Duration;

use anyhow::{Context, Result};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info};

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Namespace for every key written through the pool
    pub key_prefix: String,
}

impl RedisConfig {
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_KEY_PREFIX`: Key namespace (default: "genova")
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let key_prefix =
            std::env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "genova".to_string());

        Ok(RedisConfig { url, key_prefix })
    }
}

fn namespaced_key(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

/// Shared multiplexed connection plus the key namespace
#[derive(Clone)]
pub struct RedisPool {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisPool {
    /// Connect once; clones share the same multiplexed connection
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .with_context(|| format!("Invalid Redis URL {}", config.url))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        info!(url = %config.url, prefix = %config.key_prefix, "Redis connection established");

        Ok(RedisPool {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Store `value` as JSON, replacing any previous value. Sub-second TTLs round up.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let seconds = ttl.as_secs().max(1);
        let key = namespaced_key(&self.key_prefix, key);

        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(&key, payload, seconds).await?;
        debug!(%key, seconds, "Stored value in Redis");
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(namespaced_key(&self.key_prefix, key)).await?;

        payload
            .map(|payload| {
                serde_json::from_str(&payload)
                    .with_context(|| format!("Malformed JSON stored under {}", key))
            })
            .transpose()
    }

    /// Check if Redis answers a PING
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_the_prefix() {
        assert_eq!(
            namespaced_key("genova-test", "checkin:abc:pin"),
            "genova-test:checkin:abc:pin"
        );
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn json_values_expire() -> Result<()> {
        let pool = RedisPool::connect(&RedisConfig {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "genova-test".to_string(),
        })
        .await?;

        pool.put_json("expiry-probe", &vec![1, 2, 3], Duration::from_secs(1))
            .await?;
        assert_eq!(
            pool.get_json::<Vec<i32>>("expiry-probe").await?,
            Some(vec![1, 2, 3])
        );

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(pool.get_json::<Vec<i32>>("expiry-probe").await?, None);
        Ok(())
    }
}
