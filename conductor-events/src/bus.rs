//! ABOUTME: Message bus for agent communication over StateStore append-only streams
//! ABOUTME: Ported from orchestration/agent_communication.py's `AgentMessageBus`

use crate::message::{DeadLetter, Message, MessagePriority, MessageStats, MessageStatus, MessageType, OutboxEntry, PendingMessage};
use conductor_core::{ConductorError, Result};
use conductor_state_traits::StateStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEAD_LETTER_KEY: &str = "failed:messages";
const DEFAULT_TRIM_MAXLEN: usize = 1000;
/// Upper bound on entries fetched when approximating a stream's length for
/// `stats`/`cleanup_expired`; this backend's `StateStore` has no native
/// stream-length op.
const STATS_SCAN_LIMIT: usize = 100_000;
/// Recipients that have ever received a direct or broadcast message. `scan`
/// only indexes keyed blobs, not streams, so `cleanup_expired` tracks its
/// own worklist here instead of globbing `agent:*:messages`.
const KNOWN_RECIPIENTS_KEY: &str = "message_bus:known_recipients";

fn agent_messages_key(agent_id: &str) -> String {
    format!("agent:{agent_id}:messages")
}

fn agent_outbox_key(agent_id: &str) -> String {
    format!("agent:{agent_id}:outbox")
}

fn agent_subscriptions_key(agent_id: &str) -> String {
    format!("agent:{agent_id}:subscriptions")
}

fn agent_read_messages_key(agent_id: &str) -> String {
    format!("agent:{agent_id}:read_messages")
}

fn dept_broadcast_key(dept_id: &str) -> String {
    format!("dept:{dept_id}:broadcast")
}

fn dept_agents_key(dept_id: &str) -> String {
    format!("dept:{dept_id}:agents")
}

fn rate_limit_key(agent_id: &str) -> String {
    format!("rate_limit:{agent_id}")
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ConductorError::Storage(e.to_string()))
}

/// Message bus for agent-to-agent and department broadcast communication.
/// Every op is grounded on a single `StateStore` key family; see the
/// `agent:*`/`dept:*`/`rate_limit:*`/`failed:messages` keys documented on
/// the helper functions above.
pub struct MessageBus {
    store: Arc<dyn StateStore>,
    rate_limit_window_s: u64,
    rate_limit_max: u64,
    message_ttl_s: u64,
    dead_letter_ttl_s: u64,
}

impl MessageBus {
    pub fn new(
        store: Arc<dyn StateStore>,
        rate_limit_window_s: u64,
        rate_limit_max: u64,
        message_ttl_s: u64,
        dead_letter_ttl_s: u64,
    ) -> Self {
        Self {
            store,
            rate_limit_window_s,
            rate_limit_max,
            message_ttl_s,
            dead_letter_ttl_s,
        }
    }

    /// Publish a message from one agent to another. Rate-limit rejection is
    /// never dead-lettered; any other failure along the way is.
    pub async fn publish(
        &self,
        from_agent_id: &str,
        to_agent_id: &str,
        message_type: MessageType,
        payload: Value,
        priority: MessagePriority,
    ) -> Result<String> {
        if !self.check_rate_limit(from_agent_id).await? {
            return Err(ConductorError::RateLimited(format!(
                "agent {from_agent_id} exceeded {} messages/{}s",
                self.rate_limit_max, self.rate_limit_window_s
            )));
        }

        match self.try_publish(from_agent_id, to_agent_id, message_type, &payload, priority).await {
            Ok(message_id) => Ok(message_id),
            Err(e) => {
                self.dead_letter(from_agent_id, to_agent_id, message_type, payload, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn try_publish(
        &self,
        from_agent_id: &str,
        to_agent_id: &str,
        message_type: MessageType,
        payload: &Value,
        priority: MessagePriority,
    ) -> Result<String> {
        let message_id = format!("{from_agent_id}:{to_agent_id}:{}", chrono::Utc::now().timestamp_millis());

        let message = Message {
            message_id: message_id.clone(),
            from_agent_id: from_agent_id.to_string(),
            to_agent_id: to_agent_id.to_string(),
            message_type: message_type.wire_name().to_string(),
            timestamp: chrono::Utc::now(),
            priority,
            department_id: None,
            broadcast_id: None,
            payload: payload.clone(),
            status: MessageStatus::Pending,
        };

        let stream_key = agent_messages_key(to_agent_id);
        self.store.xadd(&stream_key, encode(&message)?).await?;
        self.store.expire(&stream_key, self.message_ttl_s).await?;
        self.remember_recipient(to_agent_id).await?;

        let outbox = OutboxEntry {
            message_id: message_id.clone(),
            to_agent_id: to_agent_id.to_string(),
            message_type: message_type.wire_name().to_string(),
            timestamp: chrono::Utc::now(),
            status: MessageStatus::Delivered,
        };
        let outbox_key = agent_outbox_key(from_agent_id);
        self.store.xadd(&outbox_key, encode(&outbox)?).await?;
        self.store.expire(&outbox_key, self.message_ttl_s).await?;

        self.update_rate_limit(from_agent_id).await?;

        info!(message_id, from_agent_id, to_agent_id, "message published");
        Ok(message_id)
    }

    /// Broadcast a payload to every agent in a department, sharing one
    /// `broadcast_id` across the per-agent copies.
    pub async fn broadcast(&self, dept_id: &str, payload: Value, from_agent_id: Option<&str>) -> Result<Vec<String>> {
        let from = from_agent_id.unwrap_or("system");
        let broadcast_id = format!("dept:{dept_id}:broadcast:{}", chrono::Utc::now().timestamp_millis());

        let broadcast_record = serde_json::json!({
            "broadcast_id": broadcast_id,
            "department_id": dept_id,
            "from_agent_id": from,
            "timestamp": chrono::Utc::now(),
            "payload": payload,
        });
        let dept_stream_key = dept_broadcast_key(dept_id);
        self.store.xadd(&dept_stream_key, encode(&broadcast_record)?).await?;
        self.store.expire(&dept_stream_key, self.message_ttl_s).await?;

        let agents = self.store.smembers(&dept_agents_key(dept_id)).await?;
        let mut message_ids = Vec::with_capacity(agents.len());

        for agent_id in agents {
            let individual_id = format!("{broadcast_id}:{agent_id}");
            let message = Message {
                message_id: individual_id.clone(),
                from_agent_id: from.to_string(),
                to_agent_id: agent_id.clone(),
                message_type: "broadcast".to_string(),
                timestamp: chrono::Utc::now(),
                priority: MessagePriority::Medium,
                department_id: Some(dept_id.to_string()),
                broadcast_id: Some(broadcast_id.clone()),
                payload: payload.clone(),
                status: MessageStatus::Pending,
            };

            let stream_key = agent_messages_key(&agent_id);
            let bytes = match encode(&message) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(agent_id, error = %e, "failed to encode broadcast message");
                    continue;
                }
            };
            if let Err(e) = self.store.xadd(&stream_key, bytes).await {
                error!(agent_id, error = %e, "broadcast delivery failed");
                continue;
            }
            self.store.expire(&stream_key, self.message_ttl_s).await.ok();
            self.remember_recipient(&agent_id).await.ok();
            message_ids.push(individual_id);
        }

        info!(broadcast_id, department_id = dept_id, delivered = message_ids.len(), "broadcast sent");
        Ok(message_ids)
    }

    /// Add an agent to a department's broadcast roster.
    pub async fn add_department_agent(&self, dept_id: &str, agent_id: &str) -> Result<()> {
        self.store.sadd(&dept_agents_key(dept_id), agent_id).await
    }

    /// Remove an agent from a department's broadcast roster.
    pub async fn remove_department_agent(&self, dept_id: &str, agent_id: &str) -> Result<()> {
        self.store.srem(&dept_agents_key(dept_id), agent_id).await
    }

    pub async fn subscribe(&self, agent_id: &str, topics: &[String]) -> Result<()> {
        let key = agent_subscriptions_key(agent_id);
        for topic in topics {
            self.store.sadd(&key, topic).await?;
        }
        self.store.expire(&key, self.message_ttl_s).await?;
        info!(agent_id, topics = topics.len(), "agent subscribed");
        Ok(())
    }

    pub async fn subscriptions(&self, agent_id: &str) -> Result<Vec<String>> {
        self.store.smembers(&agent_subscriptions_key(agent_id)).await
    }

    /// Read up to `limit` pending entries for an agent without acking them.
    pub async fn pending(&self, agent_id: &str, limit: usize) -> Result<Vec<PendingMessage>> {
        let stream_key = agent_messages_key(agent_id);
        let mut cursors = HashMap::new();
        cursors.insert(stream_key.clone(), "0".to_string());

        let mut streams = self.store.xread(&cursors, limit).await?;
        let entries = streams.remove(&stream_key).unwrap_or_default();

        let mut messages = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_slice::<Message>(&entry.payload) {
                Ok(message) => messages.push(PendingMessage { message, stream_cursor: entry.id }),
                Err(e) => warn!(id = %entry.id, error = %e, "failed to decode pending message"),
            }
        }
        info!(agent_id, count = messages.len(), "pending messages retrieved");
        Ok(messages)
    }

    /// Mark a message read: logs it to the read-audit stream, creates the
    /// agent's consumer group on first use (idempotent), and acks the
    /// original stream entry.
    pub async fn mark_read(&self, agent_id: &str, message_id: &str, stream_cursor: &str) -> Result<()> {
        let read_record = serde_json::json!({
            "message_id": message_id,
            "read_at": chrono::Utc::now(),
            "agent_id": agent_id,
        });
        let read_key = agent_read_messages_key(agent_id);
        self.store.xadd(&read_key, encode(&read_record)?).await?;
        self.store.expire(&read_key, self.message_ttl_s).await?;

        let stream_key = agent_messages_key(agent_id);
        self.store.xgroup_create(&stream_key, agent_id).await?;
        self.store.xack(&stream_key, agent_id, stream_cursor).await?;

        info!(agent_id, message_id, "message marked read");
        Ok(())
    }

    pub async fn stats(&self, agent_id: &str) -> Result<MessageStats> {
        Ok(MessageStats {
            pending_messages: self.stream_len(&agent_messages_key(agent_id)).await?,
            read_messages: self.stream_len(&agent_read_messages_key(agent_id)).await?,
            sent_messages: self.stream_len(&agent_outbox_key(agent_id)).await?,
            subscriptions: self.store.scard(&agent_subscriptions_key(agent_id)).await?,
        })
    }

    async fn stream_len(&self, stream_key: &str) -> Result<u64> {
        let mut cursors = HashMap::new();
        cursors.insert(stream_key.to_string(), "0".to_string());
        let streams = self.store.xread(&cursors, STATS_SCAN_LIMIT).await?;
        Ok(streams.get(stream_key).map(|entries| entries.len() as u64).unwrap_or(0))
    }

    /// Trim every recipient's message stream to an approximate max length.
    /// Returns the number of streams trimmed.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let recipients = self.store.smembers(KNOWN_RECIPIENTS_KEY).await?;
        let mut cleaned = 0usize;
        for agent_id in recipients {
            let stream_key = agent_messages_key(&agent_id);
            self.store.xtrim(&stream_key, DEFAULT_TRIM_MAXLEN, true).await?;
            cleaned += 1;
        }
        info!(streams_trimmed = cleaned, "expired messages cleaned up");
        Ok(cleaned)
    }

    async fn remember_recipient(&self, agent_id: &str) -> Result<()> {
        self.store.sadd(KNOWN_RECIPIENTS_KEY, agent_id).await
    }

    async fn check_rate_limit(&self, agent_id: &str) -> Result<bool> {
        match self.store.get(&rate_limit_key(agent_id)).await? {
            Some(bytes) => {
                let count: u64 = String::from_utf8_lossy(&bytes).parse().unwrap_or(0);
                Ok(count < self.rate_limit_max)
            }
            None => Ok(true),
        }
    }

    async fn update_rate_limit(&self, agent_id: &str) -> Result<()> {
        let key = rate_limit_key(agent_id);
        let count = match self.store.get(&key).await? {
            Some(bytes) => String::from_utf8_lossy(&bytes).parse::<u64>().unwrap_or(0) + 1,
            None => 1,
        };
        self.store.setex(&key, self.rate_limit_window_s, count.to_string().into_bytes()).await
    }

    async fn dead_letter(&self, from_agent_id: &str, to_agent_id: &str, message_type: MessageType, payload: Value, error_message: &str) {
        let record = DeadLetter {
            from_agent_id: from_agent_id.to_string(),
            to_agent_id: to_agent_id.to_string(),
            message_type: message_type.wire_name().to_string(),
            payload,
            error_message: error_message.to_string(),
            failed_at: chrono::Utc::now(),
            retry_count: 0,
        };
        let Ok(bytes) = encode(&record) else { return };
        if let Err(e) = self.store.xadd(DEAD_LETTER_KEY, bytes).await {
            error!(error = %e, "failed to write dead letter");
            return;
        }
        self.store.expire(DEAD_LETTER_KEY, self.dead_letter_ttl_s).await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_storage::InMemoryStateStore;

    fn bus() -> MessageBus {
        MessageBus::new(Arc::new(InMemoryStateStore::new()), 60, 100, 604_800, 2_592_000)
    }

    #[tokio::test]
    async fn publish_then_pending_round_trips() {
        let bus = bus();
        let id = bus
            .publish("agent-a", "agent-b", MessageType::DataShare, serde_json::json!({"k": "v"}), MessagePriority::High)
            .await
            .unwrap();
        assert!(id.starts_with("agent-a:agent-b:"));

        let pending = bus.pending("agent-b", 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message.from_agent_id, "agent-a");
        assert_eq!(pending[0].message.payload["k"], "v");
    }

    #[tokio::test]
    async fn rate_limit_rejects_without_dead_lettering() {
        let bus = MessageBus::new(Arc::new(InMemoryStateStore::new()), 60, 1, 604_800, 2_592_000);
        bus.publish("a", "b", MessageType::Alert, serde_json::json!({}), MessagePriority::Low).await.unwrap();

        let result = bus.publish("a", "b", MessageType::Alert, serde_json::json!({}), MessagePriority::Low).await;
        assert!(matches!(result, Err(ConductorError::RateLimited(_))));

        let dead_letters = bus.store.xread(&{
            let mut c = HashMap::new();
            c.insert(DEAD_LETTER_KEY.to_string(), "0".to_string());
            c
        }, 10).await.unwrap();
        assert!(dead_letters.get(DEAD_LETTER_KEY).is_none());
    }

    #[tokio::test]
    async fn broadcast_fans_out_to_department_roster() {
        let bus = bus();
        bus.add_department_agent("sales", "agent-a").await.unwrap();
        bus.add_department_agent("sales", "agent-b").await.unwrap();

        let ids = bus.broadcast("sales", serde_json::json!({"news": "launch"}), None).await.unwrap();
        assert_eq!(ids.len(), 2);

        let a_pending = bus.pending("agent-a", 10).await.unwrap();
        assert_eq!(a_pending.len(), 1);
        assert_eq!(a_pending[0].message.department_id.as_deref(), Some("sales"));
    }

    #[tokio::test]
    async fn mark_read_acks_without_error() {
        let bus = bus();
        bus.publish("a", "b", MessageType::StatusUpdate, serde_json::json!({}), MessagePriority::Medium).await.unwrap();
        let pending = bus.pending("b", 10).await.unwrap();
        bus.mark_read("b", &pending[0].message.message_id, &pending[0].stream_cursor).await.unwrap();

        let stats = bus.stats("b").await.unwrap();
        assert_eq!(stats.read_messages, 1);
    }

    #[tokio::test]
    async fn cleanup_expired_trims_known_recipient_streams() {
        let bus = bus();
        for _ in 0..5 {
            bus.publish("a", "b", MessageType::Coordination, serde_json::json!({}), MessagePriority::Low).await.unwrap();
        }
        let trimmed = bus.cleanup_expired().await.unwrap();
        assert_eq!(trimmed, 1);
    }
}
