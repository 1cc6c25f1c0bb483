//! ABOUTME: Docker-backed SandboxRuntime implementation
//! ABOUTME: Ports the isolation model of HeyJarvis's SandboxManager onto bollard

use crate::types::{CreateOpts, MountMode, SandboxCeilings, SandboxStats, WaitOutcome};
use crate::SandboxRuntime;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StatsOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::network::CreateNetworkOptions;
use bollard::service::HostConfig;
use bollard::Docker;
use conductor_core::{ConductorError, Result, SandboxErrorKind};
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{info, warn};

/// `SandboxRuntime` backed by the local Docker Engine API via `bollard`.
pub struct DockerSandboxRuntime {
    docker: Docker,
    ceilings: SandboxCeilings,
}

impl DockerSandboxRuntime {
    pub fn connect(ceilings: SandboxCeilings) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ConductorError::sandbox(SandboxErrorKind::Build, e.to_string()))?;
        Ok(Self { docker, ceilings })
    }

    pub fn ceilings(&self) -> SandboxCeilings {
        self.ceilings
    }
}

#[async_trait]
impl SandboxRuntime for DockerSandboxRuntime {
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            info!(image, "base image already present");
            return Ok(());
        }

        info!(image, "pulling base image");
        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = stream.next().await {
            if let Err(e) = progress {
                return Err(ConductorError::sandbox(SandboxErrorKind::Build, e.to_string()));
            }
        }
        Ok(())
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        let networks = self
            .docker
            .list_networks::<String>(None)
            .await
            .map_err(|e| ConductorError::sandbox(SandboxErrorKind::Create, e.to_string()))?;
        if networks.iter().any(|n| n.name.as_deref() == Some(name)) {
            return Ok(());
        }

        let mut options = HashMap::new();
        options.insert("com.docker.network.bridge.enable_icc".to_string(), "false".to_string());
        options.insert(
            "com.docker.network.bridge.enable_ip_masquerade".to_string(),
            "true".to_string(),
        );

        self.docker
            .create_network(CreateNetworkOptions {
                name,
                driver: "bridge",
                options,
                ..Default::default()
            })
            .await
            .map_err(|e| ConductorError::sandbox(SandboxErrorKind::Create, e.to_string()))?;
        Ok(())
    }

    async fn create(&self, mut opts: CreateOpts) -> Result<String> {
        opts.clamp_to(&self.ceilings);

        let binds: Vec<String> = opts
            .volumes
            .iter()
            .map(|v| {
                let mode = match v.mode {
                    MountMode::ReadOnly => "ro",
                    MountMode::ReadWrite => "rw",
                };
                format!("{}:{}:{}", v.host_path, v.bind, mode)
            })
            .collect();

        let tmpfs: HashMap<String, String> = opts
            .tmpfs
            .iter()
            .map(|t| (t.mountpoint.clone(), t.options.clone()))
            .collect();

        let env: Vec<String> = opts
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let host_config = HostConfig {
            binds: Some(binds),
            network_mode: Some(opts.network.clone()),
            security_opt: Some(opts.security_options.clone()),
            readonly_rootfs: Some(opts.read_only_root),
            tmpfs: Some(tmpfs),
            memory: Some((opts.mem_limit_mb * 1024 * 1024) as i64),
            cpu_period: Some(opts.cpu_period as i64),
            cpu_quota: Some(opts.cpu_quota),
            ..Default::default()
        };

        let config = Config {
            image: Some(opts.image.clone()),
            env: Some(env),
            user: Some(opts.user.clone()),
            working_dir: Some(opts.working_dir.clone()),
            cmd: Some(opts.command.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: opts.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| ConductorError::sandbox(SandboxErrorKind::Create, e.to_string()))?;
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| ConductorError::sandbox(SandboxErrorKind::Runtime, e.to_string()))
    }

    async fn wait(&self, id: &str, timeout: std::time::Duration) -> Result<WaitOutcome> {
        let mut stream = self.docker.wait_container::<String>(id, None);
        match tokio::time::timeout(timeout, stream.next()).await {
            Ok(Some(Ok(response))) => Ok(WaitOutcome::Completed {
                exit_code: response.status_code,
            }),
            Ok(Some(Err(e))) => Err(ConductorError::sandbox(SandboxErrorKind::Runtime, e.to_string())),
            Ok(None) => Ok(WaitOutcome::Completed { exit_code: -1 }),
            Err(_) => {
                warn!(id, "sandbox wait exceeded timeout");
                self.stop(id, std::time::Duration::from_secs(10)).await?;
                Ok(WaitOutcome::Timeout)
            }
        }
    }

    async fn stop(&self, id: &str, grace: std::time::Duration) -> Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: grace.as_secs() as i64 }))
            .await
            .map_err(|e| ConductorError::sandbox(SandboxErrorKind::Runtime, e.to_string()))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| ConductorError::sandbox(SandboxErrorKind::Runtime, e.to_string()))
    }

    async fn logs(&self, id: &str, stdout: bool, stderr: bool) -> Result<String> {
        let mut stream = self.docker.logs::<String>(
            id,
            Some(LogsOptions {
                stdout,
                stderr,
                ..Default::default()
            }),
        );
        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ConductorError::sandbox(SandboxErrorKind::Runtime, e.to_string()))?;
            out.push_str(&chunk.to_string());
        }
        Ok(out)
    }

    async fn stats(&self, id: &str) -> Result<SandboxStats> {
        let mut stream = self.docker.stats(
            id,
            Some(StatsOptions {
                stream: false,
                ..Default::default()
            }),
        );
        let Some(stats) = stream.next().await else {
            return Err(ConductorError::sandbox(SandboxErrorKind::Runtime, "no stats available"));
        };
        let stats = stats.map_err(|e| ConductorError::sandbox(SandboxErrorKind::Runtime, e.to_string()))?;

        let cpu_percent = cpu_percent(&stats);
        let memory_mb = stats
            .memory_stats
            .usage
            .map(|b| b as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);
        let memory_limit_mb = stats
            .memory_stats
            .limit
            .map(|b| b as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);

        let (mut rx, mut tx) = (0u64, 0u64);
        if let Some(networks) = &stats.networks {
            for n in networks.values() {
                rx += n.rx_bytes;
                tx += n.tx_bytes;
            }
        }

        Ok(SandboxStats {
            cpu_percent,
            memory_mb,
            memory_limit_mb,
            net_rx_bytes: rx,
            net_tx_bytes: tx,
        })
    }

    async fn list(&self) -> Result<Vec<String>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| ConductorError::sandbox(SandboxErrorKind::Runtime, e.to_string()))?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}

fn cpu_percent(stats: &bollard::container::Stats) -> f64 {
    let cpu_delta =
        stats.cpu_stats.cpu_usage.total_usage as i64 - stats.precpu_stats.cpu_usage.total_usage as i64;
    let system_delta =
        stats.cpu_stats.system_cpu_usage.unwrap_or(0) as i64 - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as i64;
    let percpu = stats
        .cpu_stats
        .cpu_usage
        .percpu_usage
        .as_ref()
        .map(|v| v.len())
        .unwrap_or(1);
    if system_delta > 0 && cpu_delta > 0 {
        (cpu_delta as f64 / system_delta as f64) * percpu as f64 * 100.0
    } else {
        0.0
    }
}
