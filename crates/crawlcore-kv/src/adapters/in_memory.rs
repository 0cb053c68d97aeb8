//! In-memory `KvStore`, used in tests and single-process mode.
//!
//! Grounded on the teacher's concurrent-map idiom (`dashmap`/
//! `parking_lot` appear throughout `riptide-workers` for shared
//! registries); TTL is enforced lazily on read, matching Redis's own
//! lazy-expiry behavior closely enough for test parity.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use crawlcore_types::error::Result;
use crawlcore_types::ports::kv::KvStore;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Instant::now() >= t).unwrap_or(false)
    }
}

#[derive(Default)]
pub struct InMemoryKvStore {
    strings: DashMap<String, Entry>,
    sets: DashMap<String, Mutex<std::collections::HashSet<String>>>,
    lists: DashMap<String, Mutex<VecDeque<String>>>,
    zsets: DashMap<String, Mutex<BTreeSet<(ordered_float::OrderedFloat<f64>, String)>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.strings.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.strings.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut n = 0;
        for k in keys {
            if self.strings.remove(k).is_some() {
                n += 1;
            }
        }
        Ok(n)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        if let Some(mut entry) = self.strings.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        match self.strings.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Entry {
                    value: value.to_vec(),
                    expires_at: ttl.map(|d| Instant::now() + d),
                });
                Ok(true)
            }
        }
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let current = match self.get(key).await? {
            Some(bytes) => String::from_utf8_lossy(&bytes).parse::<i64>().unwrap_or(0),
            None => 0,
        };
        let next = current + delta;
        self.set(key, next.to_string().as_bytes(), None).await?;
        Ok(next)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let set = self.sets.entry(key.to_string()).or_default();
        Ok(set.lock().insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        if let Some(set) = self.sets.get(key) {
            Ok(set.lock().remove(member))
        } else {
            Ok(false)
        }
    }

    async fn set_card(&self, key: &str) -> Result<u64> {
        Ok(self.sets.get(key).map(|s| s.lock().len() as u64).unwrap_or(0))
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .sets
            .get(key)
            .map(|s| s.lock().contains(member))
            .unwrap_or(false))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .get(key)
            .map(|s| s.lock().iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<u64> {
        let list = self.lists.entry(key.to_string()).or_default();
        let mut guard = list.lock();
        guard.push_back(value.to_string());
        Ok(guard.len() as u64)
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lists.get(key).and_then(|l| l.lock().pop_front()))
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let guard = list.lock();
        let len = guard.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len - 1)
            }
        };
        let (s, e) = (norm(start), norm(stop));
        if s > e {
            return Ok(Vec::new());
        }
        Ok(guard
            .iter()
            .skip(s as usize)
            .take((e - s + 1) as usize)
            .cloned()
            .collect())
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        Ok(self.lists.get(key).map(|l| l.lock().len() as u64).unwrap_or(0))
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<bool> {
        let Some(list) = self.lists.get(key) else {
            return Ok(false);
        };
        let mut guard = list.lock();
        if let Some(pos) = guard.iter().position(|v| v == value) {
            guard.remove(pos);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        let zset = self.zsets.entry(key.to_string()).or_default();
        let mut guard = zset.lock();
        guard.retain(|(_, m)| m != member);
        Ok(guard.insert((ordered_float::OrderedFloat(score), member.to_string())))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let Some(zset) = self.zsets.get(key) else {
            return Ok(false);
        };
        let mut guard = zset.lock();
        let before = guard.len();
        guard.retain(|(_, m)| m != member);
        Ok(guard.len() != before)
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let Some(zset) = self.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let guard = zset.lock();
        Ok(guard
            .iter()
            .filter(|(score, _)| score.0 >= min && score.0 <= max)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        Ok(self.zsets.get(key).map(|z| z.lock().len() as u64).unwrap_or(0))
    }

    async fn publish(&self, _channel: &str, _message: &str) -> Result<()> {
        // No subscribers in single-process in-memory mode; no-op.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_refuses_second_writer() {
        let kv = InMemoryKvStore::new();
        assert!(kv.set_nx("k", b"a", None).await.unwrap());
        assert!(!kv.set_nx("k", b"b", None).await.unwrap());
    }

    #[tokio::test]
    async fn set_add_is_idempotent() {
        let kv = InMemoryKvStore::new();
        assert!(kv.set_add("s", "x").await.unwrap());
        assert!(!kv.set_add("s", "x").await.unwrap());
        assert_eq!(kv.set_card("s").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ttl_expires_values() {
        let kv = InMemoryKvStore::new();
        kv.set("k", b"v", Some(Duration::from_millis(10))).await.unwrap();
        assert!(kv.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zrange_by_score_orders_ascending() {
        let kv = InMemoryKvStore::new();
        kv.zadd("z", "low", 1.0).await.unwrap();
        kv.zadd("z", "high", 5.0).await.unwrap();
        let members = kv.zrange_by_score("z", 0.0, 10.0).await.unwrap();
        assert_eq!(members, vec!["low".to_string(), "high".to_string()]);
    }
}
