//! ABOUTME: Typed inter-agent messaging over StateStore append-only streams
//! ABOUTME: Ported from orchestration/agent_communication.py's `AgentMessageBus`

pub mod bus;
pub mod message;

pub use bus::MessageBus;
pub use message::{
    DeadLetter, Message, MessagePriority, MessageStats, MessageStatus, MessageType, OutboxEntry, PendingMessage,
};
