//! ABOUTME: Persistent StateStore backed by sled
//! ABOUTME: Same capability surface as the in-memory backend, durable across restarts

use async_trait::async_trait;
use conductor_core::{ConductorError, Result};
use conductor_state_traits::{StateStore, StreamEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Serialize, Deserialize)]
struct Envelope {
    value: Vec<u8>,
    expires_at_ms: Option<i64>,
}

impl Envelope {
    fn is_live(&self) -> bool {
        match self.expires_at_ms {
            Some(t) => chrono::Utc::now().timestamp_millis() < t,
            None => true,
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct SetValue(Vec<String>);

#[derive(Serialize, Deserialize, Default)]
struct ListValue(std::collections::VecDeque<Vec<u8>>);

#[derive(Serialize, Deserialize, Default)]
struct StreamValue {
    entries: Vec<StoredEntry>,
    next_seq: u64,
}

#[derive(Serialize, Deserialize, Clone)]
struct StoredEntry {
    id: String,
    payload: Vec<u8>,
}

/// A `sled`-backed `StateStore`. One tree holds keyed blobs (with TTL
/// envelopes); sets, lists, and streams each get their own tree, keyed by
/// name, storing a single serialized value per key.
pub struct SledStateStore {
    blobs: sled::Tree,
    sets: sled::Tree,
    lists: sled::Tree,
    streams: sled::Tree,
    groups: sled::Tree,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| ConductorError::Storage(e.to_string()))?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self> {
        let open_tree = |name: &str| {
            db.open_tree(name).map_err(|e| ConductorError::Storage(e.to_string()))
        };
        Ok(Self {
            blobs: open_tree("blobs")?,
            sets: open_tree("sets")?,
            lists: open_tree("lists")?,
            streams: open_tree("streams")?,
            groups: open_tree("groups")?,
        })
    }

    fn read_set(&self, key: &str) -> Result<SetValue> {
        Ok(self
            .sets
            .get(key)
            .map_err(|e| ConductorError::Storage(e.to_string()))?
            .map(|bytes| bincode::deserialize(&bytes).unwrap_or_default())
            .unwrap_or_default())
    }

    fn write_set(&self, key: &str, value: &SetValue) -> Result<()> {
        let bytes = bincode::serialize(value).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.sets
            .insert(key, bytes)
            .map_err(|e| ConductorError::Storage(e.to_string()))?;
        Ok(())
    }

    fn read_list(&self, key: &str) -> Result<ListValue> {
        Ok(self
            .lists
            .get(key)
            .map_err(|e| ConductorError::Storage(e.to_string()))?
            .map(|bytes| bincode::deserialize(&bytes).unwrap_or_default())
            .unwrap_or_default())
    }

    fn write_list(&self, key: &str, value: &ListValue) -> Result<()> {
        let bytes = bincode::serialize(value).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.lists
            .insert(key, bytes)
            .map_err(|e| ConductorError::Storage(e.to_string()))?;
        Ok(())
    }

    fn read_stream(&self, key: &str) -> Result<StreamValue> {
        Ok(self
            .streams
            .get(key)
            .map_err(|e| ConductorError::Storage(e.to_string()))?
            .map(|bytes| bincode::deserialize(&bytes).unwrap_or_default())
            .unwrap_or_default())
    }

    fn write_stream(&self, key: &str, value: &StreamValue) -> Result<()> {
        let bytes = bincode::serialize(value).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.streams
            .insert(key, bytes)
            .map_err(|e| ConductorError::Storage(e.to_string()))?;
        Ok(())
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
impl StateStore for SledStateStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(bytes) = self.blobs.get(key).map_err(|e| ConductorError::Storage(e.to_string()))? else {
            return Ok(None);
        };
        let envelope: Envelope =
            bincode::deserialize(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
        if envelope.is_live() {
            Ok(Some(envelope.value))
        } else {
            self.blobs.remove(key).map_err(|e| ConductorError::Storage(e.to_string()))?;
            Ok(None)
        }
    }

    async fn setex(&self, key: &str, ttl_s: u64, value: Vec<u8>) -> Result<()> {
        let expires_at_ms = if ttl_s == 0 {
            None
        } else {
            Some(chrono::Utc::now().timestamp_millis() + (ttl_s as i64) * 1000)
        };
        let envelope = Envelope { value, expires_at_ms };
        let bytes = bincode::serialize(&envelope).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.blobs
            .insert(key, bytes)
            .map_err(|e| ConductorError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.blobs.remove(key).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.sets.remove(key).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.lists.remove(key).map_err(|e| ConductorError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = vec![];
        for item in self.blobs.iter() {
            let (k, v) = item.map_err(|e| ConductorError::Storage(e.to_string()))?;
            let key = String::from_utf8_lossy(&k).to_string();
            if !glob_match(pattern, &key) {
                continue;
            }
            let envelope: Envelope =
                bincode::deserialize(&v).map_err(|e| ConductorError::Storage(e.to_string()))?;
            if envelope.is_live() {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut set = self.read_set(key)?;
        if !set.0.contains(&member.to_string()) {
            set.0.push(member.to_string());
        }
        self.write_set(key, &set)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut set = self.read_set(key)?;
        set.0.retain(|m| m != member);
        self.write_set(key, &set)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.read_set(key)?.0)
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        Ok(self.read_set(key)?.0.len() as u64)
    }

    async fn lpush(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut list = self.read_list(key)?;
        list.0.push_front(value);
        self.write_list(key, &list)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let list = self.read_list(key)?;
        let len = list.0.len() as i64;
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
        Ok(list.0.iter().skip(s as usize).take((e - s + 1) as usize).cloned().collect())
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let trimmed = self.lrange(key, start, stop).await?;
        self.write_list(key, &ListValue(trimmed.into()))
    }

    async fn expire(&self, key: &str, ttl_s: u64) -> Result<()> {
        if let Some(bytes) = self.blobs.get(key).map_err(|e| ConductorError::Storage(e.to_string()))? {
            let mut envelope: Envelope =
                bincode::deserialize(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
            envelope.expires_at_ms = Some(chrono::Utc::now().timestamp_millis() + (ttl_s as i64) * 1000);
            let bytes = bincode::serialize(&envelope).map_err(|e| ConductorError::Storage(e.to_string()))?;
            self.blobs.insert(key, bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    async fn xadd(&self, stream: &str, payload: Vec<u8>) -> Result<String> {
        let mut value = self.read_stream(stream)?;
        value.next_seq += 1;
        let id = format!("{}-{}", chrono::Utc::now().timestamp_millis(), value.next_seq);
        value.entries.push(StoredEntry { id: id.clone(), payload });
        self.write_stream(stream, &value)?;
        Ok(id)
    }

    async fn xread(
        &self,
        cursors: &HashMap<String, String>,
        count: usize,
    ) -> Result<HashMap<String, Vec<StreamEntry>>> {
        let mut out = HashMap::new();
        for (stream, cursor) in cursors {
            let value = self.read_stream(stream)?;
            let after: Vec<StreamEntry> = value
                .entries
                .iter()
                .filter(|e| cursor == "0" || e.id.as_str() > cursor.as_str())
                .take(count)
                .map(|e| StreamEntry {
                    id: e.id.clone(),
                    payload: e.payload.clone(),
                })
                .collect();
            if !after.is_empty() {
                out.insert(stream.clone(), after);
            }
        }
        Ok(out)
    }

    async fn xtrim(&self, stream: &str, maxlen: usize, _approximate: bool) -> Result<()> {
        let mut value = self.read_stream(stream)?;
        if value.entries.len() > maxlen {
            let drop_n = value.entries.len() - maxlen;
            value.entries.drain(0..drop_n);
        }
        self.write_stream(stream, &value)
    }

    async fn xgroup_create(&self, stream: &str, group: &str) -> Result<()> {
        let key = format!("{stream}\u{0}{group}");
        if self.groups.get(&key).map_err(|e| ConductorError::Storage(e.to_string()))?.is_none() {
            let empty: Vec<String> = vec![];
            let bytes = bincode::serialize(&empty).map_err(|e| ConductorError::Storage(e.to_string()))?;
            self.groups.insert(key, bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    async fn xack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let key = format!("{stream}\u{0}{group}");
        let Some(bytes) = self.groups.get(&key).map_err(|e| ConductorError::Storage(e.to_string()))? else {
            return Err(ConductorError::Storage(format!(
                "no consumer group {group} on stream {stream}"
            )));
        };
        let mut acked: Vec<String> =
            bincode::deserialize(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
        acked.push(id.to_string());
        let bytes = bincode::serialize(&acked).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.groups.insert(key, bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn publish(&self, _channel: &str, _payload: Vec<u8>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (SledStateStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn persists_blobs_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStateStore::open(dir.path()).unwrap();
            store.setex("k", 60, b"v".to_vec()).await.unwrap();
        }
        let store = SledStateStore::open(dir.path()).unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn stream_order_is_fifo() {
        let (store, _dir) = temp_store();
        for i in 0..3 {
            store.xadd("s", vec![i]).await.unwrap();
        }
        let mut cursors = HashMap::new();
        cursors.insert("s".to_string(), "0".to_string());
        let read = store.xread(&cursors, 10).await.unwrap();
        let entries = read.get("s").unwrap();
        assert_eq!(entries.iter().map(|e| e.payload.clone()).collect::<Vec<_>>(), vec![vec![0], vec![1], vec![2]]);
    }
}
