//! Container lifecycle management on top of a [`ContainerRuntime`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tracing::info;

use crate::error::{ManagerError, Result, RuntimeError};
use crate::probe;
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec};

const STOP_TIMEOUT_SECS: u32 = 10;

/// Starts, tracks and tears down containers. Starting is idempotent for
/// named specs: a running container of the same name is reused, a stopped
/// one is replaced.
pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    // Managed-container index. Locked only for map access, never across an
    // await.
    containers: Mutex<HashMap<String, ContainerHandle>>,
}

impl ContainerManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            containers: Mutex::new(HashMap::new()),
        }
    }

    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        Arc::clone(&self.runtime)
    }

    pub async fn ensure_available(&self) -> Result<()> {
        if self.runtime.is_available().await {
            Ok(())
        } else {
            Err(ManagerError::RuntimeUnavailable)
        }
    }

    /// Start a container described by `spec` and block until it is ready.
    ///
    /// In order: resolve a name collision (reuse if running, replace if
    /// stopped), pull the image if absent, run, inspect for a handle, track
    /// it, then run the readiness check if one is configured.
    pub async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        self.ensure_available().await?;

        if let Some(name) = spec.name.as_deref() {
            if let Some(existing) = self.runtime.find_by_name(name).await {
                if self.runtime.is_running(&existing).await {
                    if let Some(handle) = self.runtime.inspect(&existing).await {
                        info!("reusing running container {name} ({})", handle.id);
                        self.track(handle.clone());
                        return Ok(handle);
                    }
                }
                // Stale (stopped, or no longer inspectable): replace it.
                info!("removing stale container {name} ({existing})");
                self.runtime
                    .remove(&existing, true)
                    .await
                    .map_err(|source| ManagerError::RemoveFailed {
                        id: existing,
                        source,
                    })?;
            }
        }

        let image_present = self
            .runtime
            .image_exists(&spec.image, &spec.tag)
            .await
            .unwrap_or(false);
        if !image_present {
            info!("pulling image {}", spec.image_ref());
            self.runtime
                .pull_image(&spec.image, &spec.tag)
                .await
                .map_err(|source| ManagerError::PullFailed {
                    image: spec.image_ref(),
                    source,
                })?;
        }

        let id = self
            .runtime
            .run(spec)
            .await
            .map_err(|source| ManagerError::StartFailed { source })?;

        // Creation reported success; a failed inspect here is an
        // internal-consistency error, not a partial result.
        let handle = self
            .runtime
            .inspect(&id)
            .await
            .ok_or(ManagerError::MissingHandle { id })?;

        self.track(handle.clone());

        if let Some(check) = &spec.readiness_check {
            probe::wait_for_ready(self.runtime.as_ref(), &handle, check).await?;
        }

        Ok(handle)
    }

    /// Stop a container. Stopping one that is already stopped (or gone) is
    /// a no-op; the id leaves the managed index either way.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let result = if self.runtime.is_running(id).await {
            self.runtime
                .stop(id, STOP_TIMEOUT_SECS)
                .await
                .map_err(|source| ManagerError::StopFailed {
                    id: id.to_string(),
                    source,
                })
        } else {
            Ok(())
        };

        self.untrack(id);
        result
    }

    /// Force-remove a container. Removing one that no longer exists is a
    /// no-op; the id leaves the managed index either way.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let result = if self.runtime.inspect(id).await.is_some() {
            self.runtime
                .remove(id, true)
                .await
                .map_err(|source| ManagerError::RemoveFailed {
                    id: id.to_string(),
                    source,
                })
        } else {
            Ok(())
        };

        self.untrack(id);
        result
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.runtime.is_running(id).await
    }

    pub async fn logs(&self, id: &str, tail: Option<u32>) -> std::result::Result<String, RuntimeError> {
        self.runtime.logs(id, tail).await
    }

    pub async fn stream_logs(
        &self,
        id: &str,
        tail: Option<u32>,
    ) -> std::result::Result<tokio::process::Child, RuntimeError> {
        self.runtime.stream_logs(id, tail).await
    }

    /// Stop every tracked container concurrently. Each one gets a stop
    /// attempt; failures are aggregated rather than short-circuiting.
    pub async fn stop_all(&self) -> Result<()> {
        let ids: Vec<String> = self.containers.lock().unwrap().keys().cloned().collect();

        let results = join_all(ids.iter().map(|id| self.stop(id))).await;
        let failures: Vec<ManagerError> = results.into_iter().filter_map(|r| r.err()).collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ManagerError::StopAll { failures })
        }
    }

    /// Snapshot of the containers this manager currently tracks.
    pub fn managed(&self) -> Vec<ContainerHandle> {
        self.containers.lock().unwrap().values().cloned().collect()
    }

    fn track(&self, handle: ContainerHandle) {
        self.containers
            .lock()
            .unwrap()
            .insert(handle.id.clone(), handle);
    }

    fn untrack(&self, id: &str) {
        self.containers.lock().unwrap().remove(id);
    }
}
