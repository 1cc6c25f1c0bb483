//! ABOUTME: State management traits and interfaces for Conductor
//! ABOUTME: Defines the StateStore capability contract; no backend lives here

use async_trait::async_trait;
use conductor_core::Result;
use std::collections::HashMap;

/// One entry in an append-only stream: a monotonically increasing id and an
/// opaque payload blob. Callers are responsible for encoding the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub payload: Vec<u8>,
}

/// The persistent KV/stream capability every other Conductor component is
/// built on. All values are opaque byte strings; callers encode/decode.
///
/// Grouped by the §6 operation families: keyed blobs with TTL, set ops,
/// list ops, append-only streams with consumer groups, and pub/sub.
#[async_trait]
pub trait StateStore: Send + Sync {
    // -- keyed blobs --
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn setex(&self, key: &str, ttl_s: u64, value: Vec<u8>) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    /// Glob-style key scan (`*` wildcard), returning all matching keys.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;
    /// Alias for `scan` matching the §6 interface name.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.scan(pattern).await
    }

    // -- sets --
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
    async fn scard(&self, key: &str) -> Result<u64>;

    // -- lists --
    async fn lpush(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()>;
    async fn expire(&self, key: &str, ttl_s: u64) -> Result<()>;

    // -- streams --
    /// Append one entry, returning the id assigned to it.
    async fn xadd(&self, stream: &str, payload: Vec<u8>) -> Result<String>;
    /// Read up to `count` entries per stream, starting strictly after each
    /// given cursor id (`"0"` reads from the start).
    async fn xread(
        &self,
        cursors: &HashMap<String, String>,
        count: usize,
    ) -> Result<HashMap<String, Vec<StreamEntry>>>;
    /// Trim a stream to approximately `maxlen` entries.
    async fn xtrim(&self, stream: &str, maxlen: usize, approximate: bool) -> Result<()>;
    /// Create a consumer group at the start of the stream; idempotent
    /// (ignores "already exists").
    async fn xgroup_create(&self, stream: &str, group: &str) -> Result<()>;
    /// Acknowledge an entry for a consumer group.
    async fn xack(&self, stream: &str, group: &str, id: &str) -> Result<()>;

    // -- pub/sub --
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<()>;
}
