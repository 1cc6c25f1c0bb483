//! ABOUTME: In-process StateStore backed by dashmap/parking_lot
//! ABOUTME: Used for tests and single-process deployments with no durability needs

use async_trait::async_trait;
use conductor_core::{ConductorError, Result};
use conductor_state_traits::{StateStore, StreamEntry};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

struct Blob {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Blob {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |t| Instant::now() < t)
    }
}

/// A `StateStore` that lives entirely in process memory. TTLs are enforced
/// lazily: an expired key is treated as absent on next access rather than
/// swept by a background task.
#[derive(Default)]
pub struct InMemoryStateStore {
    blobs: DashMap<String, Blob>,
    sets: DashMap<String, HashSet<String>>,
    lists: DashMap<String, Mutex<VecDeque<Vec<u8>>>>,
    streams: DashMap<String, Mutex<Vec<StreamEntry>>>,
    groups: DashMap<(String, String), HashSet<String>>,
    next_stream_seq: DashMap<String, u64>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, stream: &str) -> String {
        let mut seq = self.next_stream_seq.entry(stream.to_string()).or_insert(0);
        *seq += 1;
        format!("{}-{}", chrono::Utc::now().timestamp_millis(), *seq)
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        candidate.starts_with(prefix)
    } else {
        pattern == candidate
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.blobs.get(key) {
            Some(b) if b.is_live() => Ok(Some(b.value.clone())),
            Some(_) => {
                drop(self.blobs.get(key));
                self.blobs.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn setex(&self, key: &str, ttl_s: u64, value: Vec<u8>) -> Result<()> {
        let expires_at = if ttl_s == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(ttl_s))
        };
        self.blobs.insert(key.to_string(), Blob { value, expires_at });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.blobs.remove(key);
        self.sets.remove(key);
        self.lists.remove(key);
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .blobs
            .iter()
            .filter(|e| e.value().is_live())
            .map(|e| e.key().clone())
            .filter(|k| glob_match(pattern, k))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(mut set) = self.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        Ok(self.sets.get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn lpush(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.lists
            .entry(key.to_string())
            .or_default()
            .lock()
            .push_front(value);
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let Some(list) = self.lists.get(key) else {
            return Ok(vec![]);
        };
        let list = list.lock();
        let len = list.len() as i64;
        if len == 0 {
            return Ok(vec![]);
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
            return Ok(vec![]);
        }
        Ok(list.iter().skip(s as usize).take((e - s + 1) as usize).cloned().collect())
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let trimmed = self.lrange(key, start, stop).await?;
        if let Some(list) = self.lists.get(key) {
            *list.lock() = trimmed.into();
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_s: u64) -> Result<()> {
        // Lists/sets don't carry TTL metadata in this backend; blobs do.
        if let Some(mut b) = self.blobs.get_mut(key) {
            b.expires_at = Some(Instant::now() + Duration::from_secs(ttl_s));
        }
        Ok(())
    }

    async fn xadd(&self, stream: &str, payload: Vec<u8>) -> Result<String> {
        let id = self.next_id(stream);
        self.streams
            .entry(stream.to_string())
            .or_default()
            .lock()
            .push(StreamEntry { id: id.clone(), payload });
        Ok(id)
    }

    async fn xread(
        &self,
        cursors: &HashMap<String, String>,
        count: usize,
    ) -> Result<HashMap<String, Vec<StreamEntry>>> {
        let mut out = HashMap::new();
        for (stream, cursor) in cursors {
            let Some(entries) = self.streams.get(stream) else {
                continue;
            };
            let entries = entries.lock();
            let after: Vec<StreamEntry> = entries
                .iter()
                .filter(|e| cursor == "0" || e.id.as_str() > cursor.as_str())
                .take(count)
                .cloned()
                .collect();
            if !after.is_empty() {
                out.insert(stream.clone(), after);
            }
        }
        Ok(out)
    }

    async fn xtrim(&self, stream: &str, maxlen: usize, _approximate: bool) -> Result<()> {
        if let Some(entries) = self.streams.get(stream) {
            let mut entries = entries.lock();
            if entries.len() > maxlen {
                let drop_n = entries.len() - maxlen;
                entries.drain(0..drop_n);
            }
        }
        Ok(())
    }

    async fn xgroup_create(&self, stream: &str, group: &str) -> Result<()> {
        self.groups
            .entry((stream.to_string(), group.to_string()))
            .or_default();
        Ok(())
    }

    async fn xack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let key = (stream.to_string(), group.to_string());
        match self.groups.get_mut(&key) {
            Some(mut acked) => {
                acked.insert(id.to_string());
                Ok(())
            }
            None => Err(ConductorError::Storage(format!(
                "no consumer group {group} on stream {stream}"
            ))),
        }
    }

    async fn publish(&self, _channel: &str, _payload: Vec<u8>) -> Result<()> {
        // No subscribers in this in-process backend; publish is a no-op
        // sink. Real pub/sub fan-out is the sled/network backend's job.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blob_ttl_expires() {
        let store = InMemoryStateStore::new();
        store.setex("k", 0, b"v".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        store.setex("k2", 1, b"v".to_vec()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(store.get("k2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stream_xadd_length_invariant() {
        let store = InMemoryStateStore::new();
        for _ in 0..5 {
            store.xadd("s", b"x".to_vec()).await.unwrap();
        }
        let mut cursors = HashMap::new();
        cursors.insert("s".to_string(), "0".to_string());
        let read = store.xread(&cursors, 100).await.unwrap();
        assert_eq!(read.get("s").unwrap().len(), 5);
    }

    #[tokio::test]
    async fn scan_glob_matches_prefix() {
        let store = InMemoryStateStore::new();
        store.setex("agent:a1:messages", 60, b"x".to_vec()).await.unwrap();
        store.setex("agent:a2:messages", 60, b"x".to_vec()).await.unwrap();
        store.setex("other", 60, b"x".to_vec()).await.unwrap();
        let keys = store.scan("agent:*").await.unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn xack_requires_group() {
        let store = InMemoryStateStore::new();
        store.xadd("s", b"x".to_vec()).await.unwrap();
        assert!(store.xack("s", "g", "1-1").await.is_err());
        store.xgroup_create("s", "g").await.unwrap();
        store.xgroup_create("s", "g").await.unwrap(); // idempotent
        assert!(store.xack("s", "g", "1-1").await.is_ok());
    }
}
