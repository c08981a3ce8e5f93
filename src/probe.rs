//! Readiness probing: poll a started container until its workload actually
//! serves, or the configured budget runs out.

use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{ManagerError, Result};
use crate::runtime::{ContainerHandle, ContainerRuntime, ReadinessCheck, ReadinessKind};

/// Per-attempt connection budget, separate from the overall check timeout.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// A single probe attempt distinguishes "target not ready yet" (`Ok(false)`)
/// from "the probe mechanism itself is broken" (`Err`). Both mean another
/// attempt, but the latter is recorded for diagnostics instead of silently
/// looking like a slow workload.
#[derive(Error, Debug)]
enum ProbeError {
    #[error("http probe failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exec probe failed: {0}")]
    Exec(#[from] crate::error::RuntimeError),

    #[error("invalid probe target {0:?}")]
    BadTarget(String),
}

/// Poll until `check` passes or `check.timeout_ms` elapses.
///
/// Success is never reported without at least one passing probe. On timeout
/// the container is left running so its logs stay available; the error
/// identifies the container and the exhausted budget.
pub async fn wait_for_ready(
    runtime: &dyn ContainerRuntime,
    handle: &ContainerHandle,
    check: &ReadinessCheck,
) -> Result<()> {
    let timeout = Duration::from_millis(check.timeout_ms);
    let interval = Duration::from_millis(check.interval_ms);
    let started = Instant::now();

    while started.elapsed() < timeout {
        match probe_once(runtime, handle, check).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => debug!("readiness probe for {}: {e}", handle.id),
        }
        sleep(interval).await;
    }

    Err(ManagerError::ReadyTimeout {
        id: handle.id.clone(),
        timeout_ms: check.timeout_ms,
    })
}

async fn probe_once(
    runtime: &dyn ContainerRuntime,
    handle: &ContainerHandle,
    check: &ReadinessCheck,
) -> std::result::Result<bool, ProbeError> {
    match check.kind {
        ReadinessKind::Http => probe_http(&check.target).await,
        ReadinessKind::Tcp => probe_tcp(&check.target).await,
        ReadinessKind::Exec => probe_exec(runtime, &handle.id, &check.target).await,
    }
}

/// POST a JSON-RPC `eth_chainId` request; any 2xx response counts. The
/// workload under test is a JSON-RPC node, so reachable-and-responding is
/// the whole contract; the body is not parsed.
async fn probe_http(url: &str) -> std::result::Result<bool, ProbeError> {
    let client = reqwest::Client::builder().timeout(ATTEMPT_TIMEOUT).build()?;

    let response = client
        .post(url)
        .json(&json!({
            "jsonrpc": "2.0",
            "method": "eth_chainId",
            "params": [],
            "id": 1,
        }))
        .send()
        .await;

    match response {
        Ok(response) => Ok(response.status().is_success()),
        // Refused/unreachable/slow is the normal not-ready signal.
        Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn probe_tcp(target: &str) -> std::result::Result<bool, ProbeError> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| ProbeError::BadTarget(target.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ProbeError::BadTarget(target.to_string()))?;

    match tokio::time::timeout(ATTEMPT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Ok(true)
        }
        Ok(Err(_)) | Err(_) => Ok(false),
    }
}

async fn probe_exec(
    runtime: &dyn ContainerRuntime,
    id: &str,
    target: &str,
) -> std::result::Result<bool, ProbeError> {
    let command: Vec<String> = target.split_whitespace().map(str::to_string).collect();
    let result = runtime.exec(id, &command).await?;
    Ok(result.success())
}
