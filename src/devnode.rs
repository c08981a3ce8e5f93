//! Arbitrum nitro-devnode presets: the container description for a local
//! dev chain and the start/stop/status flows built from it.

use uuid::Uuid;

use crate::ephemeral::EphemeralRegistry;
use crate::error::Result;
use crate::manager::ContainerManager;
use crate::runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ContainerStatus, PortMapping,
    ReadinessCheck, ReadinessKind,
};

pub const NODE_IMAGE: &str = "offchainlabs/nitro-node";
pub const NODE_TAG: &str = "v3.7.1-926f1ab";

/// Well-known name for the long-lived dev node.
pub const NODE_CONTAINER_NAME: &str = "nitro-devnode";

/// Prefix for ephemeral nodes started on behalf of a single task run.
pub const EPHEMERAL_NODE_PREFIX: &str = "nitro-devnode-tmp-";

pub const DEFAULT_HTTP_PORT: u16 = 8547;
pub const DEFAULT_WS_PORT: u16 = 8548;

/// In-container ports the node always serves on.
const CONTAINER_HTTP_PORT: u16 = 8547;
const CONTAINER_WS_PORT: u16 = 8548;

const READY_TIMEOUT_MS: u64 = 30_000;
const READY_INTERVAL_MS: u64 = 1_000;

/// Host-port range for ephemeral nodes, clear of well-known ports.
const MIN_EPHEMERAL_PORT: u16 = 10_000;
const MAX_EPHEMERAL_PORT: u16 = 60_000;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub image: String,
    pub tag: String,
    pub http_port: u16,
    pub ws_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            image: NODE_IMAGE.to_string(),
            tag: NODE_TAG.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            ws_port: DEFAULT_WS_PORT,
        }
    }
}

impl NodeConfig {
    /// A config for a throwaway node: random host ports in the ephemeral
    /// range, websocket adjacent to HTTP.
    pub fn ephemeral() -> Self {
        let http_port = random_node_port();
        Self {
            http_port,
            ws_port: http_port + 1,
            ..Default::default()
        }
    }

    /// Defaults overridable through `NITRODOCK_NODE_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            image: std::env::var("NITRODOCK_NODE_IMAGE").unwrap_or(defaults.image),
            tag: std::env::var("NITRODOCK_NODE_TAG").unwrap_or(defaults.tag),
            http_port: std::env::var("NITRODOCK_NODE_HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.http_port),
            ws_port: std::env::var("NITRODOCK_NODE_WS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.ws_port),
        }
    }

    pub fn rpc_url(&self) -> String {
        format!("http://localhost:{}", self.http_port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://localhost:{}", self.ws_port)
    }
}

/// Pick a random host port in the ephemeral range. Collisions with a busy
/// port surface as the node's bind failure, same as a user-picked port.
pub fn random_node_port() -> u16 {
    let bytes = Uuid::new_v4().into_bytes();
    let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
    MIN_EPHEMERAL_PORT + raw % (MAX_EPHEMERAL_PORT - MIN_EPHEMERAL_PORT)
}

/// The declarative description of a dev node container.
pub fn node_spec(config: &NodeConfig, name: &str, network: Option<&str>) -> ContainerSpec {
    ContainerSpec {
        image: config.image.clone(),
        tag: config.tag.clone(),
        name: Some(name.to_string()),
        ports: vec![
            PortMapping::tcp(config.http_port, CONTAINER_HTTP_PORT),
            PortMapping::tcp(config.ws_port, CONTAINER_WS_PORT),
        ],
        command: vec![
            "--dev".to_string(),
            "--http.api=eth,net,web3,debug".to_string(),
            "--http.corsdomain=*".to_string(),
            "--http.addr=0.0.0.0".to_string(),
            "--http.vhosts=*".to_string(),
            "--ws.api=eth,net,web3,debug".to_string(),
            "--ws.addr=0.0.0.0".to_string(),
            "--ws.origins=*".to_string(),
        ],
        network: network.map(str::to_string),
        readiness_check: Some(ReadinessCheck {
            kind: ReadinessKind::Http,
            target: config.rpc_url(),
            timeout_ms: READY_TIMEOUT_MS,
            interval_ms: READY_INTERVAL_MS,
        }),
        auto_remove: true,
        detach: true,
        ..Default::default()
    }
}

/// Start (or reuse) the well-known dev node and wait for it to serve RPC.
pub async fn start_node(manager: &ContainerManager, config: &NodeConfig) -> Result<ContainerHandle> {
    manager
        .start(&node_spec(config, NODE_CONTAINER_NAME, None))
        .await
}

/// A throwaway node bound to random host ports, tracked for cleanup.
#[derive(Debug, Clone)]
pub struct EphemeralNode {
    pub name: String,
    pub handle: ContainerHandle,
    pub http_port: u16,
    pub ws_port: u16,
}

impl EphemeralNode {
    pub fn rpc_url(&self) -> String {
        format!("http://localhost:{}", self.http_port)
    }
}

/// Start an ephemeral node under a generated name and register it with the
/// registry so it cannot outlive the process. Callers usually pass
/// [`NodeConfig::ephemeral`] for random host ports. On failure the
/// generated name is cleaned back up before the error propagates.
pub async fn start_ephemeral_node(
    manager: &ContainerManager,
    registry: &EphemeralRegistry,
    config: &NodeConfig,
    network: Option<&str>,
) -> Result<EphemeralNode> {
    let name = EphemeralRegistry::generate_name(EPHEMERAL_NODE_PREFIX);

    registry.register(&name);
    match manager.start(&node_spec(config, &name, network)).await {
        Ok(handle) => {
            registry.set_active(Some(name.as_str()));
            Ok(EphemeralNode {
                name,
                handle,
                http_port: config.http_port,
                ws_port: config.ws_port,
            })
        }
        Err(e) => {
            registry.cleanup_one(&name).await;
            Err(e)
        }
    }
}

/// Stop and remove a node by name. Returns whether a container was found;
/// stop/remove failures are ignored since an auto-remove container may
/// disappear between the two calls.
pub async fn stop_node(runtime: &dyn ContainerRuntime, name: &str) -> bool {
    let Some(id) = runtime.find_by_name(name).await else {
        return false;
    };

    let _ = runtime.stop(&id, 10).await;
    let _ = runtime.remove(&id, true).await;
    true
}

/// Status of a named node, `Unknown` if no such container exists.
pub async fn node_status(runtime: &dyn ContainerRuntime, name: &str) -> ContainerStatus {
    match runtime.find_by_name(name).await {
        Some(id) => runtime.status(&id).await,
        None => ContainerStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use std::sync::Arc;

    #[test]
    fn default_config_matches_the_devnode_setup() {
        let config = NodeConfig::default();
        assert_eq!(config.image, "offchainlabs/nitro-node");
        assert_eq!(config.tag, "v3.7.1-926f1ab");
        assert_eq!(config.rpc_url(), "http://localhost:8547");
        assert_eq!(config.ws_url(), "ws://localhost:8548");
    }

    #[test]
    fn spec_exposes_rpc_ports_and_readiness_check() {
        let config = NodeConfig {
            http_port: 18547,
            ws_port: 18548,
            ..Default::default()
        };
        let spec = node_spec(&config, NODE_CONTAINER_NAME, None);

        assert_eq!(spec.name.as_deref(), Some("nitro-devnode"));
        assert_eq!(
            spec.ports,
            vec![PortMapping::tcp(18547, 8547), PortMapping::tcp(18548, 8548)]
        );
        assert!(spec.command.contains(&"--dev".to_string()));
        assert!(spec.command.contains(&"--http.addr=0.0.0.0".to_string()));
        assert!(spec.auto_remove);
        assert!(spec.detach);

        let check = spec.readiness_check.unwrap();
        assert_eq!(check.kind, ReadinessKind::Http);
        assert_eq!(check.target, "http://localhost:18547");
        assert_eq!(check.timeout_ms, 30_000);
        assert_eq!(check.interval_ms, 1_000);
    }

    #[test]
    fn random_ports_stay_in_the_ephemeral_range() {
        for _ in 0..1000 {
            let port = random_node_port();
            assert!((MIN_EPHEMERAL_PORT..MAX_EPHEMERAL_PORT).contains(&port));
        }
    }

    #[test]
    fn ephemeral_config_uses_adjacent_random_ports() {
        let config = NodeConfig::ephemeral();
        assert_eq!(config.ws_port, config.http_port + 1);
        assert_eq!(config.image, NODE_IMAGE);
    }

    /// Minimal HTTP responder standing in for a node that answers RPC.
    async fn spawn_ok_responder() -> u16 {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
            }
        });
        port
    }

    #[tokio::test]
    async fn ephemeral_node_is_registered_started_and_cleaned_up() {
        let runtime = Arc::new(FakeRuntime::new().with_image(NODE_IMAGE, NODE_TAG));
        let manager = ContainerManager::new(runtime.clone());
        let registry = EphemeralRegistry::new(runtime.clone());

        let http_port = spawn_ok_responder().await;
        let config = NodeConfig {
            http_port,
            ws_port: http_port + 1,
            ..Default::default()
        };

        let node = start_ephemeral_node(&manager, &registry, &config, None)
            .await
            .unwrap();

        assert!(node.name.starts_with(EPHEMERAL_NODE_PREFIX));
        assert!(registry.is_registered(&node.name));
        assert_eq!(registry.reuse_active().await.as_deref(), Some(node.name.as_str()));
        assert_eq!(node.ws_port, node.http_port + 1);
        assert_eq!(node.rpc_url(), format!("http://localhost:{http_port}"));

        registry.cleanup_one(&node.name).await;
        assert!(runtime.find_by_name(&node.name).await.is_none());
        assert!(!registry.is_registered(&node.name));
    }

    #[tokio::test]
    async fn failed_ephemeral_start_leaves_no_dangling_record() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_pulls();
        let manager = ContainerManager::new(runtime.clone());
        let registry = EphemeralRegistry::new(runtime.clone());

        let err = start_ephemeral_node(&manager, &registry, &NodeConfig::ephemeral(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::ManagerError::PullFailed { .. }));
        assert!(registry.registered().is_empty());
    }

    #[tokio::test]
    async fn stop_node_reports_presence() {
        let runtime = FakeRuntime::new();
        assert!(!stop_node(&runtime, NODE_CONTAINER_NAME).await);

        runtime.seed_container(NODE_CONTAINER_NAME, ContainerStatus::Running);
        assert!(stop_node(&runtime, NODE_CONTAINER_NAME).await);
        assert!(runtime.find_by_name(NODE_CONTAINER_NAME).await.is_none());
    }

    #[tokio::test]
    async fn status_is_unknown_for_absent_node() {
        let runtime = FakeRuntime::new();
        assert_eq!(
            node_status(&runtime, NODE_CONTAINER_NAME).await,
            ContainerStatus::Unknown
        );

        runtime.seed_container(NODE_CONTAINER_NAME, ContainerStatus::Running);
        assert_eq!(
            node_status(&runtime, NODE_CONTAINER_NAME).await,
            ContainerStatus::Running
        );
    }
}
