use thiserror::Error;

/// Failure of a single container-runtime CLI invocation.
///
/// These are leaf errors: the adapter performs no retries, callers decide
/// whether to retry, abort, or treat the failure as advisory.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to invoke container runtime: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub(crate) fn command_failed(args: &[String], exit_code: i32, stderr: &str) -> Self {
        RuntimeError::CommandFailed {
            command: format!("docker {}", args.join(" ")),
            exit_code,
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Orchestration-level failures from the lifecycle manager and the modules
/// built on top of it.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Docker is not available, ensure Docker is installed and running")]
    RuntimeUnavailable,

    #[error("failed to pull image {image}, check your internet connection and image name")]
    PullFailed {
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to start container: {source}")]
    StartFailed {
        #[source]
        source: RuntimeError,
    },

    #[error("failed to stop container {id}: {source}")]
    StopFailed {
        id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to remove container {id}: {source}")]
    RemoveFailed {
        id: String,
        #[source]
        source: RuntimeError,
    },

    /// Creation reported success but the container cannot be inspected.
    /// Internal-consistency failure, never returned as a partial handle.
    #[error("container started but could not get info for {id}")]
    MissingHandle { id: String },

    /// Readiness-probe exhaustion. Distinct from the other variants so
    /// callers can surface container logs before giving up.
    #[error("container {id} did not become ready within {timeout_ms}ms")]
    ReadyTimeout { id: String, timeout_ms: u64 },

    #[error("stylus {phase} failed for {package}: {source}")]
    CompileFailed {
        phase: &'static str,
        package: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to stop {} tracked container(s): {}", .failures.len(), join_failures(.failures))]
    StopAll { failures: Vec<ManagerError> },
}

fn join_failures(failures: &[ManagerError]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ManagerError>;
