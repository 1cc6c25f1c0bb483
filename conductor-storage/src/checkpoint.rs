//! ABOUTME: CheckpointStore - per-(session, step) orchestrator state snapshots
//! ABOUTME: Backed by any StateStore; keys and TTLs per the checkpoint key schema

use chrono::{DateTime, Utc};
use conductor_core::{ConductorError, Result};
use conductor_state_traits::StateStore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

/// The `{step, timestamp, state}` envelope persisted as one blob per
/// checkpoint write. Snapshot-on-write, parse-on-read: no structural
/// sharing with the in-memory state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEnvelope<T> {
    pub step: String,
    pub timestamp: DateTime<Utc>,
    pub state: T,
}

#[derive(Serialize)]
struct CheckpointEnvelopeRef<'a, T> {
    step: &'a str,
    timestamp: DateTime<Utc>,
    state: &'a T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LatestPointer {
    step: String,
    timestamp: DateTime<Utc>,
}

/// Implemented by the checkpointed state type (defined in whichever crate
/// owns the orchestrator) so `list_sessions` can join the "latest" pointer
/// with its pointed-to blob for a status/request preview, without this
/// crate taking a compile-time dependency on that state type.
pub trait CheckpointPreview {
    fn preview_status(&self) -> String;
    fn preview_request(&self) -> String;
}

/// One row of `list_sessions()`: the session id joined with its latest
/// checkpoint's timestamp and a status/request preview decoded from the
/// pointed-to state blob.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub request: String,
}

fn checkpoint_key(session: &str, step: &str) -> String {
    format!("checkpoint:{session}:{step}")
}

fn latest_key(session: &str) -> String {
    format!("checkpoint:{session}:latest")
}

/// Thin persistence layer over `StateStore`, implementing the §4.5 key
/// schema: `checkpoint:{session}:{step}`, `checkpoint:{session}:latest`,
/// and the "latest" pointer convention that session recovery relies on.
pub struct CheckpointStore {
    store: Arc<dyn StateStore>,
    ttl_s: u64,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn StateStore>, ttl_s: u64) -> Self {
        Self { store, ttl_s }
    }

    /// Persist a step's state and advance the session's "latest" pointer.
    pub async fn save<T: Serialize + Send + Sync>(
        &self,
        session: &str,
        step: &str,
        state: &T,
    ) -> Result<()> {
        let now = Utc::now();
        let envelope = CheckpointEnvelopeRef {
            step,
            timestamp: now,
            state,
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.store.setex(&checkpoint_key(session, step), self.ttl_s, bytes).await?;

        let pointer = LatestPointer {
            step: step.to_string(),
            timestamp: now,
        };
        let pointer_bytes =
            serde_json::to_vec(&pointer).map_err(|e| ConductorError::Storage(e.to_string()))?;
        self.store
            .setex(&latest_key(session), self.ttl_s, pointer_bytes)
            .await?;
        Ok(())
    }

    /// Load a specific step, or the step the "latest" pointer names if
    /// `step` is `None`.
    pub async fn load<T: DeserializeOwned>(
        &self,
        session: &str,
        step: Option<&str>,
    ) -> Result<Option<CheckpointEnvelope<T>>> {
        let step = match step {
            Some(s) => s.to_string(),
            None => match self.latest_step(session).await? {
                Some(s) => s,
                None => return Ok(None),
            },
        };
        let Some(bytes) = self.store.get(&checkpoint_key(session, &step)).await? else {
            return Ok(None);
        };
        let envelope = serde_json::from_slice(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
        Ok(Some(envelope))
    }

    async fn latest_step(&self, session: &str) -> Result<Option<String>> {
        let Some(bytes) = self.store.get(&latest_key(session)).await? else {
            return Ok(None);
        };
        let pointer: LatestPointer =
            serde_json::from_slice(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
        Ok(Some(pointer.step))
    }

    /// List all sessions with a live "latest" pointer, newest-first, each
    /// joined with its pointed-to checkpoint blob for a status/request
    /// preview. `T` is the checkpointed state type.
    pub async fn list_sessions<T: DeserializeOwned + CheckpointPreview>(&self) -> Result<Vec<SessionSummary>> {
        let keys = self.store.scan("checkpoint:*:latest").await?;
        let mut summaries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(session) = key
                .strip_prefix("checkpoint:")
                .and_then(|s| s.strip_suffix(":latest"))
            else {
                continue;
            };
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            let pointer: LatestPointer =
                serde_json::from_slice(&bytes).map_err(|e| ConductorError::Storage(e.to_string()))?;
            let Some(envelope) = self.load::<T>(session, Some(&pointer.step)).await? else {
                continue;
            };
            summaries.push(SessionSummary {
                session: session.to_string(),
                timestamp: pointer.timestamp,
                status: envelope.state.preview_status(),
                request: envelope.state.preview_request(),
            });
        }
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryStateStore;
    use serde::Deserialize as De;

    #[derive(Serialize, De, Debug, PartialEq, Clone)]
    struct Dummy {
        n: u32,
    }

    impl CheckpointPreview for Dummy {
        fn preview_status(&self) -> String {
            self.n.to_string()
        }
        fn preview_request(&self) -> String {
            format!("dummy-{}", self.n)
        }
    }

    #[tokio::test]
    async fn latest_pointer_matches_most_recent_write() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let cp = CheckpointStore::new(store, 86_400);
        cp.save("s1", "parse_request_start", &Dummy { n: 1 }).await.unwrap();
        cp.save("s1", "parse_request_complete", &Dummy { n: 2 }).await.unwrap();

        let loaded: CheckpointEnvelope<Dummy> = cp.load("s1", None).await.unwrap().unwrap();
        assert_eq!(loaded.step, "parse_request_complete");
        assert_eq!(loaded.state, Dummy { n: 2 });
    }

    #[tokio::test]
    async fn list_sessions_sorts_newest_first() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let cp = CheckpointStore::new(store, 86_400);
        cp.save("s1", "a", &Dummy { n: 1 }).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cp.save("s2", "a", &Dummy { n: 7 }).await.unwrap();

        let sessions = cp.list_sessions::<Dummy>().await.unwrap();
        assert_eq!(sessions[0].session, "s2");
        assert_eq!(sessions[1].session, "s1");
    }

    #[tokio::test]
    async fn list_sessions_joins_the_pointed_blob_for_status_and_request() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let cp = CheckpointStore::new(store, 86_400);
        cp.save("s1", "a", &Dummy { n: 1 }).await.unwrap();
        cp.save("s1", "b", &Dummy { n: 2 }).await.unwrap();

        let sessions = cp.list_sessions::<Dummy>().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, "2");
        assert_eq!(sessions[0].request, "dummy-2");
    }
}
