use crate::error::StoreError;
use async_trait::async_trait;
use redis::RedisResult;
use std::time::Duration;
use tokio::time::Instant;
use tourbook_core::lock::{LockToken, ReconcileLock};
use tourbook_core::{CoreError, CoreResult};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(connection_string: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// SET NX PX: true when the key was free and is now ours.
    pub async fn acquire_lock(&self, key: &str, owner: &str, ttl: Duration) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    /// Delete the key only if `owner` still holds it.
    pub async fn release_lock(&self, key: &str, owner: &str) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#,
        );

        let deleted: i64 = script.key(key).arg(owner).invoke_async(&mut conn).await?;
        Ok(deleted == 1)
    }

    /// Count a hit against a fixed window. The window's expiry is set by the
    /// first hit only; later hits never extend it.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count, ttl): (i64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .ttl(key)
            .query_async(&mut conn)
            .await?;

        if needs_expiry(ttl) {
            let _: i64 = redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_seconds)
                .query_async(&mut conn)
                .await?;
        }

        Ok(within_limit(count, limit))
    }
}

/// TTL reply for a counter that has no expiry yet (-1). A key left without
/// one by an interrupted hit gets it on the next.
fn needs_expiry(ttl: i64) -> bool {
    ttl < 0
}

fn within_limit(count: i64, limit: i64) -> bool {
    count <= limit
}

/// Reconcile lock shared by every instance through Redis. Keys expire after
/// `ttl` so a crashed holder cannot wedge a payment forever.
pub struct RedisReconcileLock {
    redis: RedisClient,
    ttl: Duration,
    wait: Duration,
    retry_every: Duration,
}

impl RedisReconcileLock {
    pub fn new(redis: RedisClient) -> Self {
        Self {
            redis,
            ttl: Duration::from_secs(30),
            wait: Duration::from_secs(10),
            retry_every: Duration::from_millis(50),
        }
    }
}

#[async_trait]
impl ReconcileLock for RedisReconcileLock {
    async fn acquire(&self, key: &str) -> CoreResult<LockToken> {
        let key = format!("reconcile:{}", key);
        let owner = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.wait;

        loop {
            let acquired = self
                .redis
                .acquire_lock(&key, &owner, self.ttl)
                .await
                .map_err(|e| CoreError::LockError(e.to_string()))?;
            if acquired {
                debug!("Acquired {}", key);
                return Ok(LockToken::remote(key, owner));
            }
            if Instant::now() >= deadline {
                return Err(CoreError::LockError(format!("timed out waiting for {}", key)));
            }
            tokio::time::sleep(self.retry_every).await;
        }
    }

    async fn release(&self, token: LockToken) -> CoreResult<()> {
        let released = self
            .redis
            .release_lock(token.key(), token.value())
            .await
            .map_err(|e| CoreError::LockError(e.to_string()))?;
        if !released {
            warn!("Lock {} expired before release", token.key());
        }
        Ok(())
    }
}
