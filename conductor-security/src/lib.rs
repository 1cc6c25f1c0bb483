//! ABOUTME: SandboxRuntime trait and implementations for Conductor
//! ABOUTME: Isolated, resource-capped worker execution for synthesized agent code

mod docker;
mod result;
mod types;

pub use docker::DockerSandboxRuntime;
pub use result::extract_result;
pub use types::{
    CreateOpts, SandboxCeilings, SandboxStats, TmpfsSpec, VolumeMount, WaitOutcome,
};

use async_trait::async_trait;
use conductor_core::Result;

/// Lifecycle contract for an isolated worker execution environment.
/// Concrete backends (containers, sub-process jails, WASM) satisfy this
/// same interface; the orchestrator never sees implementation detail.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn ensure_image(&self, image: &str) -> Result<()>;
    async fn ensure_network(&self, name: &str) -> Result<()>;
    async fn create(&self, opts: CreateOpts) -> Result<String>;
    async fn start(&self, id: &str) -> Result<()>;
    async fn wait(&self, id: &str, timeout: std::time::Duration) -> Result<WaitOutcome>;
    async fn stop(&self, id: &str, grace: std::time::Duration) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn logs(&self, id: &str, stdout: bool, stderr: bool) -> Result<String>;
    async fn stats(&self, id: &str) -> Result<SandboxStats>;
    async fn list(&self) -> Result<Vec<String>>;
}
