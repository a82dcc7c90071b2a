//! Terminal-stage action: start the built container and report its ports.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::process::run_shell;

/// A started service container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub container_id: String,
    /// `(container_port, host_port)` pairs, e.g. `("8001/tcp", "49153")`.
    pub ports: Vec<(String, String)>,
}

impl LaunchReport {
    pub fn host_port(&self, container_port: &str) -> Option<&str> {
        self.ports
            .iter()
            .find(|(c, _)| c == container_port)
            .map(|(_, h)| h.as_str())
    }
}

#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, slug: &str, dir: &Path) -> Result<LaunchReport>;
}

/// Runs the image built by the container stage with the docker CLI.
pub struct DockerLauncher {
    timeout: Duration,
}

impl DockerLauncher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Launcher for DockerLauncher {
    async fn launch(&self, slug: &str, dir: &Path) -> Result<LaunchReport> {
        let run = format!(
            "docker run --init --name {slug} -d -p 8001 -p 8000 {slug}",
            slug = slug
        );
        let out = run_shell(&run, dir, self.timeout).await?;
        if !out.success() {
            bail!("docker run failed: {}", out.output.trim());
        }
        let container_id = out
            .output
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string();

        let inspect = format!(
            "docker inspect -f '{{{{ json .NetworkSettings.Ports }}}}' {}",
            container_id
        );
        let out = run_shell(&inspect, dir, self.timeout).await?;
        if !out.success() {
            bail!("docker inspect failed: {}", out.output.trim());
        }
        let ports = parse_port_bindings(&out.output)?;

        info!(slug, container_id = %container_id, ports = ?ports, "service container launched");
        Ok(LaunchReport {
            container_id,
            ports,
        })
    }
}

/// Parse `docker inspect` port JSON:
/// `{"8000/tcp":[{"HostIp":"0.0.0.0","HostPort":"49154"}],"8001/tcp":null}`.
pub fn parse_port_bindings(json: &str) -> Result<Vec<(String, String)>> {
    let value: Value = serde_json::from_str(json.trim())?;
    let Some(map) = value.as_object() else {
        bail!("unexpected port bindings: {}", json.trim());
    };
    let mut ports = Vec::new();
    for (container_port, bindings) in map {
        let host = bindings
            .as_array()
            .and_then(|b| b.first())
            .and_then(|b| b.get("HostPort"))
            .and_then(Value::as_str);
        if let Some(host) = host {
            ports.push((container_port.clone(), host.to_string()));
        }
    }
    ports.sort();
    Ok(ports)
}
