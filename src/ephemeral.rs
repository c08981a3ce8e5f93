//! Process-wide tracking of throwaway containers.
//!
//! Ephemeral containers serve one task invocation and must not outlive the
//! process, including when a build or test run is interrupted. The registry
//! owns the set of names owed cleanup; the composition root creates one
//! instance, installs the signal handlers once, and calls [`shutdown`] on
//! the normal exit path.
//!
//! [`shutdown`]: EphemeralRegistry::shutdown

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::runtime::ContainerRuntime;

/// Conventional exit codes for signal-terminated processes.
const SIGINT_EXIT_CODE: i32 = 130;
const SIGTERM_EXIT_CODE: i32 = 143;

const STOP_TIMEOUT_SECS: u32 = 10;
const NAME_SUFFIX_LEN: usize = 8;

/// A name owed cleanup. Exists only in memory; the daemon holds the truth
/// about whether a container by this name still exists.
#[derive(Debug, Clone)]
pub struct EphemeralRecord {
    pub name: String,
    pub registered_at: DateTime<Utc>,
}

struct RegistryState {
    records: HashMap<String, EphemeralRecord>,
    active: Option<String>,
}

pub struct EphemeralRegistry {
    runtime: Arc<dyn ContainerRuntime>,
    state: Mutex<RegistryState>,
    handlers_installed: AtomicBool,
}

impl EphemeralRegistry {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            state: Mutex::new(RegistryState {
                records: HashMap::new(),
                active: None,
            }),
            handlers_installed: AtomicBool::new(false),
        }
    }

    /// Generate a collision-resistant name: `prefix` plus a fixed-length
    /// random alphanumeric suffix. Uniqueness is probabilistic; the daemon's
    /// name-uniqueness check is the final arbiter.
    pub fn generate_name(prefix: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{prefix}{}", &suffix[..NAME_SUFFIX_LEN])
    }

    /// Track `name` for cleanup.
    pub fn register(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.records.insert(
            name.to_string(),
            EphemeralRecord {
                name: name.to_string(),
                registered_at: Utc::now(),
            },
        );
    }

    pub fn unregister(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.records.remove(name);
        if state.active.as_deref() == Some(name) {
            state.active = None;
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.state.lock().unwrap().records.contains_key(name)
    }

    pub fn registered(&self) -> Vec<EphemeralRecord> {
        self.state.lock().unwrap().records.values().cloned().collect()
    }

    /// Mark `name` as the current ephemeral container for opt-in reuse.
    pub fn set_active(&self, name: Option<&str>) {
        self.state.lock().unwrap().active = name.map(str::to_string);
    }

    /// Return the active ephemeral name only if its container is confirmed
    /// running right now. A stale pointer is cleared, never returned.
    pub async fn reuse_active(&self) -> Option<String> {
        let candidate = self.state.lock().unwrap().active.clone()?;

        if self.is_ephemeral_running(&candidate).await {
            return Some(candidate);
        }

        debug!("active ephemeral container {candidate} is gone, clearing");
        let mut state = self.state.lock().unwrap();
        if state.active.as_deref() == Some(candidate.as_str()) {
            state.active = None;
        }
        None
    }

    pub async fn is_ephemeral_running(&self, name: &str) -> bool {
        match self.runtime.find_by_name(name).await {
            Some(id) => self.runtime.is_running(&id).await,
            None => false,
        }
    }

    /// Stop and force-remove the container behind `name`, then drop the
    /// record. Already-removed is the expected common case, so errors from
    /// either step are ignored.
    pub async fn cleanup_one(&self, name: &str) {
        if let Some(id) = self.runtime.find_by_name(name).await {
            if let Err(e) = self.runtime.stop(&id, STOP_TIMEOUT_SECS).await {
                debug!("ignoring stop failure for ephemeral {name}: {e}");
            }
            if let Err(e) = self.runtime.remove(&id, true).await {
                debug!("ignoring remove failure for ephemeral {name}: {e}");
            }
        }
        self.unregister(name);
    }

    /// Clean up every registered name, concurrently.
    pub async fn cleanup_all(&self) {
        let names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .records
            .keys()
            .cloned()
            .collect();
        if names.is_empty() {
            return;
        }

        info!("cleaning up {} ephemeral container(s)", names.len());
        join_all(names.iter().map(|name| self.cleanup_one(name))).await;
    }

    /// Normal-exit cleanup, called by the composition root before the
    /// process returns.
    pub async fn shutdown(&self) {
        self.cleanup_all().await;
    }

    /// Install SIGINT/SIGTERM handlers that run [`cleanup_all`] and then
    /// terminate with the conventional exit code (130/143). Idempotent:
    /// only the first call installs anything. Cannot intercept SIGKILL.
    ///
    /// [`cleanup_all`]: EphemeralRegistry::cleanup_all
    pub fn install_signal_handlers(self: &Arc<Self>) -> bool {
        if self.handlers_installed.swap(true, Ordering::SeqCst) {
            return false;
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let code = wait_for_termination_signal().await;
            info!("termination signal received, cleaning up ephemeral containers");
            registry.cleanup_all().await;
            std::process::exit(code);
        });
        true
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() -> i32 {
    use tokio::signal::unix::{signal, SignalKind};

    let sigint = signal(SignalKind::interrupt());
    let sigterm = signal(SignalKind::terminate());
    let (mut sigint, mut sigterm) = match (sigint, sigterm) {
        (Ok(i), Ok(t)) => (i, t),
        _ => {
            warn!("failed to install signal handlers, ephemeral cleanup on signal disabled");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    tokio::select! {
        _ = sigint.recv() => SIGINT_EXIT_CODE,
        _ = sigterm.recv() => SIGTERM_EXIT_CODE,
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() -> i32 {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install ctrl-c handler, ephemeral cleanup on signal disabled");
        std::future::pending::<()>().await;
    }
    SIGINT_EXIT_CODE
}
