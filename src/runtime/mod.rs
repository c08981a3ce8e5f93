mod cli;
mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

pub use cli::DockerCli;
pub use types::{
    ContainerHandle, ContainerSpec, ContainerStatus, ExecResult, PortMapping, Protocol,
    ReadinessCheck, ReadinessKind, VolumeMapping,
};

use crate::error::RuntimeError;

/// Callback receiving one line of streamed runtime output at a time.
pub type Progress<'a> = Option<&'a (dyn Fn(&str) + Send + Sync)>;

/// Capability interface over a container runtime.
///
/// One concrete implementation shells out to the docker CLI ([`DockerCli`]);
/// tests use an in-memory fake so no daemon is required. Every operation is
/// a single invocation with no retries. Status-flavored operations
/// (`status`, `is_running`, `inspect`, `find_by_name`, `network_exists`,
/// `volume_exists`) degrade to `Unknown`/`false`/`None` instead of failing,
/// since they back non-critical polling paths.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether the runtime daemon is reachable at all.
    async fn is_available(&self) -> bool;

    async fn image_exists(&self, image: &str, tag: &str) -> Result<bool, RuntimeError>;

    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), RuntimeError>;

    /// Build `image:tag` from in-memory Dockerfile content. The build context
    /// is a scratch directory removed on both success and failure.
    async fn build_image(
        &self,
        image: &str,
        tag: &str,
        dockerfile: &str,
        on_progress: Progress<'_>,
    ) -> Result<(), RuntimeError>;

    /// Create and start a container, returning its id. The spec's `detach`
    /// flag is honored as given; callers wanting to wait for completion and
    /// capture output use [`ContainerRuntime::run_attached`] instead.
    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// Run a container in the foreground, streaming output line-by-line and
    /// returning the collected result once it exits.
    async fn run_attached(
        &self,
        spec: &ContainerSpec,
        on_output: Progress<'_>,
    ) -> Result<ExecResult, RuntimeError>;

    /// Start an existing (stopped) container.
    async fn start(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop(&self, id: &str, timeout_secs: u32) -> Result<(), RuntimeError>;

    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError>;

    async fn inspect(&self, id: &str) -> Option<ContainerHandle>;

    async fn status(&self, id: &str) -> ContainerStatus;

    async fn is_running(&self, id: &str) -> bool {
        self.status(id).await.is_running()
    }

    /// Find a container id by exact name. The lookup is anchored, so
    /// ephemeral names sharing a prefix never cross-match.
    async fn find_by_name(&self, name: &str) -> Option<String>;

    async fn logs(&self, id: &str, tail: Option<u32>) -> Result<String, RuntimeError>;

    /// Spawn a `logs -f` process for interactive attachment. The caller owns
    /// the child's lifetime and kills it to detach.
    async fn stream_logs(
        &self,
        id: &str,
        tail: Option<u32>,
    ) -> Result<tokio::process::Child, RuntimeError>;

    async fn exec(&self, id: &str, command: &[String]) -> Result<ExecResult, RuntimeError>;

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    async fn network_exists(&self, name: &str) -> bool;

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError>;

    async fn volume_exists(&self, name: &str) -> bool;
}
