//! Named Docker volumes that persist toolchain and registry state across
//! compiler-container runs.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RuntimeError;
use crate::runtime::ContainerRuntime;

/// Volume persisting rustup toolchains between container runs.
pub const RUSTUP_CACHE_VOLUME: &str = "stylus-compile-rustup";

/// Volume persisting the cargo registry between container runs.
pub const CARGO_CACHE_VOLUME: &str = "stylus-compile-cargo";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureVolumesReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanVolumesReport {
    pub removed: Vec<String>,
    pub not_found: Vec<String>,
}

/// Make sure every named volume exists, creating the absent ones. The
/// daemon is asked every time; nothing is memoized. Classifies each name
/// into `created` or `existing`.
pub async fn ensure_volumes(
    runtime: &dyn ContainerRuntime,
    names: &[&str],
) -> Result<EnsureVolumesReport, RuntimeError> {
    let mut report = EnsureVolumesReport::default();

    for name in names {
        if runtime.volume_exists(name).await {
            report.existing.push(name.to_string());
        } else {
            runtime.create_volume(name).await?;
            info!("created cache volume {name}");
            report.created.push(name.to_string());
        }
    }

    Ok(report)
}

/// Attempt removal of every named volume, classifying each name by whether
/// the removal succeeded. Removal failures (typically: the volume does not
/// exist) are part of the report, not errors.
pub async fn clean_volumes(runtime: &dyn ContainerRuntime, names: &[&str]) -> CleanVolumesReport {
    let mut report = CleanVolumesReport::default();

    for name in names {
        match runtime.remove_volume(name).await {
            Ok(()) => {
                info!("removed cache volume {name}");
                report.removed.push(name.to_string());
            }
            Err(_) => report.not_found.push(name.to_string()),
        }
    }

    report
}

/// Ensure the two well-known Stylus compile cache volumes.
pub async fn ensure_cache_volumes(
    runtime: &dyn ContainerRuntime,
) -> Result<EnsureVolumesReport, RuntimeError> {
    ensure_volumes(runtime, &[RUSTUP_CACHE_VOLUME, CARGO_CACHE_VOLUME]).await
}

/// Remove the two well-known Stylus compile cache volumes.
pub async fn clean_cache_volumes(runtime: &dyn ContainerRuntime) -> CleanVolumesReport {
    clean_volumes(runtime, &[RUSTUP_CACHE_VOLUME, CARGO_CACHE_VOLUME]).await
}
