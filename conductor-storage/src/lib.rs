//! ABOUTME: StateStore implementations for Conductor
//! ABOUTME: In-memory and sled-backed backends, plus the CheckpointStore built atop them

pub mod checkpoint;
pub mod in_memory;
pub mod sled_store;

pub use checkpoint::{CheckpointEnvelope, CheckpointPreview, CheckpointStore, SessionSummary};
pub use in_memory::InMemoryStateStore;
pub use sled_store::SledStateStore;
