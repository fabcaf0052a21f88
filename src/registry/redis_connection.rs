use std::time::{Duration, Instant};

use anyhow::Context;
use redis::AsyncCommands;
use redis::Client;
use redis::aio::MultiplexedConnection;
use serde::de::DeserializeOwned;
use tracing::info;

/// don't hang startup on an unreachable redis
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// registry-facing view of redis: JSON documents under string keys plus
/// a latency probe, nothing else leaks out
#[derive(Debug, Clone)]
pub struct RedisDatabase {
    connection: MultiplexedConnection,
}

impl RedisDatabase {
    /// connect and prove the connection works with one ping before the
    /// server starts accepting players
    pub async fn connect(connection_string: &str) -> anyhow::Result<Self> {
        let client = Client::open(connection_string).context("Failed to create Redis client")?;

        let connection = tokio::time::timeout(
            CONNECT_TIMEOUT,
            client.get_multiplexed_tokio_connection(),
        )
        .await
        .context("Timed out connecting to Redis")?
        .context("Failed to connect to Redis")?;

        let db = Self { connection };

        let latency = db
            .ping()
            .await
            .context("Redis did not answer the first ping")?;
        info!("Redis connection established ({:.1}ms ping)", latency);

        Ok(db)
    }

    /// ping round trip in milliseconds, also feeds the health endpoint
    pub async fn ping(&self) -> anyhow::Result<f64> {
        let start = Instant::now();

        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING failed")?;

        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }

    /// read one JSON document stored under `key`, None when the key is
    /// absent
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(key).await.context("Redis GET failed")?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let value = serde_json::from_str(&raw)
            .with_context(|| format!("value under {} is not valid JSON", key))?;

        Ok(Some(value))
    }
}
