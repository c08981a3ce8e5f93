//! Docker orchestration for ephemeral Arbitrum development chains and
//! on-demand Stylus compiler containers.
//!
//! The crate is built around four pieces:
//!
//! - [`runtime::ContainerRuntime`] — a capability trait over the container
//!   runtime, with a CLI-backed implementation ([`DockerCli`]) that shells
//!   out to `docker`.
//! - [`ContainerManager`] — idempotent start/stop/remove on top of the
//!   runtime: a running container of the same name is reused, a stopped one
//!   replaced, images are pulled on demand, and a readiness check gates the
//!   returned handle.
//! - [`EphemeralRegistry`] — process-wide tracking of throwaway containers,
//!   with signal handlers that clean them up on SIGINT/SIGTERM.
//! - [`devnode`] / [`compile`] / [`volumes`] / [`image`] — the Arbitrum
//!   specifics: nitro-devnode presets, Stylus compile containers and their
//!   cache volumes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nitrodock::devnode::{self, NodeConfig};
//! use nitrodock::{ContainerManager, DockerCli, EphemeralRegistry};
//!
//! # async fn demo() -> nitrodock::Result<()> {
//! let runtime = Arc::new(DockerCli::new());
//! let manager = ContainerManager::new(runtime.clone());
//! let registry = Arc::new(EphemeralRegistry::new(runtime));
//! registry.install_signal_handlers();
//!
//! let node =
//!     devnode::start_ephemeral_node(&manager, &registry, &NodeConfig::ephemeral(), None).await?;
//! println!("RPC at {}", node.rpc_url());
//!
//! // ... deploy, test ...
//!
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod compile;
pub mod devnode;
pub mod ephemeral;
pub mod error;
pub mod hosturl;
pub mod image;
pub mod logging;
pub mod manager;
pub mod probe;
pub mod runtime;
pub mod volumes;

pub use ephemeral::{EphemeralRecord, EphemeralRegistry};
pub use error::{ManagerError, Result, RuntimeError};
pub use manager::ContainerManager;
pub use probe::wait_for_ready;
pub use runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ContainerStatus, DockerCli, ExecResult,
    PortMapping, Protocol, ReadinessCheck, ReadinessKind, VolumeMapping,
};
