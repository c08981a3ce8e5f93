//! Throwaway compiler containers for Stylus contracts.
//!
//! Each compile step runs in a foreground `--rm` container with the
//! contract directory mounted at `/workspace` and the cache volumes
//! attached, so repeated runs skip toolchain reinstallation. Output is
//! streamed line-by-line to the caller's progress callback (cargo writes
//! its progress to stderr).

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::ephemeral::EphemeralRegistry;
use crate::error::{ManagerError, Result};
use crate::image::COMPILE_IMAGE_NAME;
use crate::runtime::{ContainerRuntime, ContainerSpec, ExecResult, Progress, VolumeMapping};
use crate::volumes::{CARGO_CACHE_VOLUME, RUSTUP_CACHE_VOLUME};

const COMPILE_NAME_PREFIX: &str = "stylus-compile-";
const WORKSPACE_DIR: &str = "/workspace";

/// Prefix for throwaway networks joining a node and its compile containers.
pub const DEPLOY_NETWORK_PREFIX: &str = "stylus-deploy-net-";

/// The in-container port the node serves RPC on.
const NODE_RPC_PORT: u16 = 8547;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Docker network shared with the node container, if any.
    pub network: Option<String>,
    /// Node container name, used as the RPC hostname on that network.
    pub node_container: Option<String>,
    /// Mount the rustup/cargo cache volumes.
    pub use_cache_volumes: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            network: None,
            node_container: None,
            use_cache_volumes: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Path of the produced WASM on the host.
    pub wasm_path: PathBuf,
}

/// Run one command inside a fresh compile container and wait for it.
pub async fn run_compile_command(
    runtime: &dyn ContainerRuntime,
    contract_dir: &Path,
    toolchain: &str,
    command: &[&str],
    options: &CompileOptions,
    on_progress: Progress<'_>,
) -> std::result::Result<ExecResult, crate::error::RuntimeError> {
    let spec = compile_spec(contract_dir, toolchain, command, options);
    runtime.run_attached(&spec, on_progress).await
}

/// Compile a Stylus contract: `cargo stylus check` followed by
/// `cargo stylus build`. Returns the host path of the produced WASM.
pub async fn compile_contract(
    runtime: &dyn ContainerRuntime,
    contract_dir: &Path,
    toolchain: &str,
    package_name: &str,
    options: &CompileOptions,
    on_progress: Progress<'_>,
) -> Result<CompileOutput> {
    let endpoint;
    let mut check: Vec<&str> = vec!["cargo", "stylus", "check"];
    if let Some(node) = &options.node_container {
        endpoint = format!("http://{node}:{NODE_RPC_PORT}");
        check.push("--endpoint");
        check.push(&endpoint);
    }

    if let Some(on_progress) = on_progress {
        on_progress("Running cargo stylus check...");
    }
    run_compile_command(runtime, contract_dir, toolchain, &check, options, on_progress)
        .await
        .map_err(|source| ManagerError::CompileFailed {
            phase: "check",
            package: package_name.to_string(),
            source,
        })?;

    if let Some(on_progress) = on_progress {
        on_progress("Running cargo stylus build...");
    }
    run_compile_command(
        runtime,
        contract_dir,
        toolchain,
        &["cargo", "stylus", "build"],
        options,
        on_progress,
    )
    .await
    .map_err(|source| ManagerError::CompileFailed {
        phase: "build",
        package: package_name.to_string(),
        source,
    })?;

    Ok(CompileOutput {
        wasm_path: wasm_output_path(contract_dir, package_name),
    })
}

/// Create a randomly named network over which compile containers reach the
/// node container by name.
pub async fn create_deploy_network(
    runtime: &dyn ContainerRuntime,
) -> std::result::Result<String, crate::error::RuntimeError> {
    let name = EphemeralRegistry::generate_name(DEPLOY_NETWORK_PREFIX);
    runtime.create_network(&name).await?;
    Ok(name)
}

/// Best-effort removal of a deploy network; failure only affects tidiness.
pub async fn remove_deploy_network(runtime: &dyn ContainerRuntime, name: &str) {
    if let Err(e) = runtime.remove_network(name).await {
        warn!("failed to remove network {name}: {e}");
    }
}

/// Cargo converts hyphens to underscores in the artifact file name.
pub fn wasm_output_path(contract_dir: &Path, package_name: &str) -> PathBuf {
    contract_dir
        .join("target")
        .join("wasm32-unknown-unknown")
        .join("release")
        .join(format!("{}.wasm", package_name.replace('-', "_")))
}

fn compile_spec(
    contract_dir: &Path,
    toolchain: &str,
    command: &[&str],
    options: &CompileOptions,
) -> ContainerSpec {
    let mut volumes = vec![VolumeMapping {
        host: contract_dir.display().to_string(),
        container: WORKSPACE_DIR.to_string(),
        readonly: false,
    }];
    if options.use_cache_volumes {
        volumes.push(VolumeMapping {
            host: RUSTUP_CACHE_VOLUME.to_string(),
            container: "/root/.rustup".to_string(),
            readonly: false,
        });
        volumes.push(VolumeMapping {
            host: CARGO_CACHE_VOLUME.to_string(),
            container: "/root/.cargo/registry".to_string(),
            readonly: false,
        });
    }

    ContainerSpec {
        image: COMPILE_IMAGE_NAME.to_string(),
        tag: toolchain.to_string(),
        name: Some(EphemeralRegistry::generate_name(COMPILE_NAME_PREFIX)),
        volumes,
        command: command.iter().map(|s| s.to_string()).collect(),
        network: options.network.clone(),
        workdir: Some(WORKSPACE_DIR.to_string()),
        auto_remove: true,
        detach: false,
        ..Default::default()
    }
}
