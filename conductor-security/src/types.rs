//! ABOUTME: Value types for the SandboxRuntime interface
//! ABOUTME: Mirrors the opts/result shapes named in the external interface contract

use std::collections::HashMap;

/// Mount mode for a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub host_path: String,
    pub bind: String,
    pub mode: MountMode,
}

/// A tmpfs mount spec, e.g. `/tmp` with `size=100m,noexec`.
#[derive(Debug, Clone)]
pub struct TmpfsSpec {
    pub mountpoint: String,
    pub options: String,
}

/// Options for creating one sandboxed worker.
#[derive(Debug, Clone)]
pub struct CreateOpts {
    pub image: String,
    pub name: String,
    pub env: HashMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    pub network: String,
    pub read_only_root: bool,
    pub tmpfs: Vec<TmpfsSpec>,
    pub mem_limit_mb: u64,
    pub cpu_period: u64,
    pub cpu_quota: i64,
    pub security_options: Vec<String>,
    pub user: String,
    pub working_dir: String,
    pub command: Vec<String>,
}

impl CreateOpts {
    /// Clamp resource requests by the process-wide ceiling.
    pub fn clamp_to(&mut self, ceilings: &SandboxCeilings) {
        self.mem_limit_mb = self.mem_limit_mb.min(ceilings.max_memory_mb);
        let max_quota = (ceilings.max_cpu_cores * self.cpu_period as f64) as i64;
        self.cpu_quota = self.cpu_quota.min(max_quota);
    }
}

/// Process-wide resource ceilings clamping any individual sandbox request.
#[derive(Debug, Clone, Copy)]
pub struct SandboxCeilings {
    pub max_cpu_cores: f64,
    pub max_memory_mb: u64,
    pub default_timeout_s: u64,
}

impl Default for SandboxCeilings {
    fn default() -> Self {
        Self {
            max_cpu_cores: 2.0,
            max_memory_mb: 1024,
            default_timeout_s: 300,
        }
    }
}

/// Outcome of `wait`.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    Completed { exit_code: i64 },
    Timeout,
}

/// Point-in-time resource usage for a running sandbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxStats {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub memory_limit_mb: f64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
}
