use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Port mapping between host and container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl PortMapping {
    pub fn tcp(host: u16, container: u16) -> Self {
        Self {
            host,
            container,
            protocol: Protocol::Tcp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// Bind mount between a host path (or named volume) and a container path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMapping {
    pub host: String,
    pub container: String,
    #[serde(default)]
    pub readonly: bool,
}

/// Polling contract used to decide when a started workload is actually
/// serving, as opposed to merely having a live process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessCheck {
    pub kind: ReadinessKind,
    /// http: full URL. tcp: "host:port". exec: command split on whitespace.
    pub target: String,
    pub timeout_ms: u64,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessKind {
    Http,
    Tcp,
    Exec,
}

/// Declarative description of a container to start. Immutable once handed
/// to the lifecycle manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub tag: String,
    pub name: Option<String>,
    pub ports: Vec<PortMapping>,
    pub env: HashMap<String, String>,
    pub volumes: Vec<VolumeMapping>,
    pub command: Vec<String>,
    pub network: Option<String>,
    pub workdir: Option<String>,
    pub readiness_check: Option<ReadinessCheck>,
    pub auto_remove: bool,
    pub detach: bool,
}

impl ContainerSpec {
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Stopped,
    Exited,
    Created,
    #[default]
    Unknown,
}

impl ContainerStatus {
    /// Parse the output of `inspect --format {{.State.Status}}`. Anything
    /// the runtime reports outside the known set maps to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "running" => ContainerStatus::Running,
            "stopped" => ContainerStatus::Stopped,
            "exited" => ContainerStatus::Exited,
            "created" => ContainerStatus::Created,
            _ => ContainerStatus::Unknown,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

/// Live view of a container, produced by inspecting the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub ports: Vec<PortMapping>,
    pub status: ContainerStatus,
    pub image: String,
    pub tag: String,
}

/// Result of executing a command inside a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
