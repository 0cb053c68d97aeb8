//! Redis-backed `KvStore`.
//!
//! Grounded on `riptide-cache/src/adapters/redis_idempotency.rs`'s pool
//! handling and Lua-script idiom: a `deadpool_redis::Pool` for
//! connection reuse, `redis_script::Script` for the one operation that
//! needs atomicity beyond a single Redis command (`set_nx` with TTL on
//! Redis servers predating `SET NX EX` as one call).

use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Pool};
use redis_script::Script;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crawlcore_types::error::{CoreError, Result};
use crawlcore_types::ports::kv::KvStore;

pub struct RedisKvStore {
    pool: Arc<Pool>,
}

impl RedisKvStore {
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool.get().await.map_err(|e| {
            error!("failed to get Redis connection: {e}");
            CoreError::Kv(format!("connection pool exhausted: {e}"))
        })
    }

    /// Atomic SET NX + EXPIRE, compatible with Redis servers that
    /// predate combined `SET key val NX EX secs`.
    const SET_NX_EX_SCRIPT: &'static str = r#"
        if redis.call("set", KEYS[1], ARGV[1], "NX") then
            if tonumber(ARGV[2]) > 0 then
                redis.call("expire", KEYS[1], ARGV[2])
            end
            return 1
        else
            return 0
        end
    "#;
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| CoreError::Kv(format!("GET {key}: {e}")))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(d) => {
                let _: () = conn
                    .set_ex(key, value, d.as_secs().max(1))
                    .await
                    .map_err(|e| CoreError::Kv(format!("SETEX {key}: {e}")))?;
            }
            None => {
                let _: () = conn
                    .set(key, value)
                    .await
                    .map_err(|e| CoreError::Kv(format!("SET {key}: {e}")))?;
            }
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.del(keys)
            .await
            .map_err(|e| CoreError::Kv(format!("DEL: {e}")))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        conn.expire(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| CoreError::Kv(format!("EXPIRE {key}: {e}")))
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool> {
        let mut conn = self.conn().await?;
        let ttl_secs = ttl.map(|d| d.as_secs()).unwrap_or(0);
        let acquired: i32 = Script::new(Self::SET_NX_EX_SCRIPT)
            .key(key)
            .arg(value)
            .arg(ttl_secs)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| CoreError::Kv(format!("SET NX {key}: {e}")))?;
        debug!(key, acquired, "set_nx attempted");
        Ok(acquired == 1)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.incr(key, delta)
            .await
            .map_err(|e| CoreError::Kv(format!("INCRBY {key}: {e}")))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let added: i64 = conn
            .sadd(key, member)
            .await
            .map_err(|e| CoreError::Kv(format!("SADD {key}: {e}")))?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .srem(key, member)
            .await
            .map_err(|e| CoreError::Kv(format!("SREM {key}: {e}")))?;
        Ok(removed > 0)
    }

    async fn set_card(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.scard(key)
            .await
            .map_err(|e| CoreError::Kv(format!("SCARD {key}: {e}")))
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        conn.sismember(key, member)
            .await
            .map_err(|e| CoreError::Kv(format!("SISMEMBER {key}: {e}")))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.smembers(key)
            .await
            .map_err(|e| CoreError::Kv(format!("SMEMBERS {key}: {e}")))
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.rpush(key, value)
            .await
            .map_err(|e| CoreError::Kv(format!("RPUSH {key}: {e}")))
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.lpop(key, None)
            .await
            .map_err(|e| CoreError::Kv(format!("LPOP {key}: {e}")))
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.lrange(key, start as isize, stop as isize)
            .await
            .map_err(|e| CoreError::Kv(format!("LRANGE {key}: {e}")))
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.llen(key)
            .await
            .map_err(|e| CoreError::Kv(format!("LLEN {key}: {e}")))
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .lrem(key, 1, value)
            .await
            .map_err(|e| CoreError::Kv(format!("LREM {key}: {e}")))?;
        Ok(removed > 0)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        let mut conn = self.conn().await?;
        let added: i64 = conn
            .zadd(key, member, score)
            .await
            .map_err(|e| CoreError::Kv(format!("ZADD {key}: {e}")))?;
        Ok(added > 0)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .zrem(key, member)
            .await
            .map_err(|e| CoreError::Kv(format!("ZREM {key}: {e}")))?;
        Ok(removed > 0)
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.zrangebyscore(key, min, max)
            .await
            .map_err(|e| CoreError::Kv(format!("ZRANGEBYSCORE {key}: {e}")))
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.zcard(key)
            .await
            .map_err(|e| CoreError::Kv(format!("ZCARD {key}: {e}")))
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .publish(channel, message)
            .await
            .map_err(|e| CoreError::Kv(format!("PUBLISH {channel}: {e}")))?;
        Ok(())
    }
}
