//! In-memory [`ContainerRuntime`] used by unit tests. Models just enough
//! daemon behavior (name uniqueness, image presence, container state) to
//! exercise the lifecycle paths without Docker.

use std::collections::{HashMap, HashSet, VecDeque};
use std::process::Stdio;
use std::sync::Mutex;

use super::types::{ContainerHandle, ContainerSpec, ContainerStatus, ExecResult};
use super::{ContainerRuntime, Progress};
use crate::error::RuntimeError;

#[derive(Default)]
struct FakeState {
    images: HashSet<String>,
    containers: HashMap<String, FakeContainer>,
    networks: HashSet<String>,
    volumes: HashSet<String>,
    next_id: u32,
    run_calls: u32,
    pull_calls: u32,
    pull_fails: bool,
    run_fails: bool,
    vanish_after_run: bool,
    fail_stop_ids: HashSet<String>,
    exec_codes: VecDeque<i32>,
    exec_default: i32,
}

#[derive(Clone)]
struct FakeContainer {
    id: String,
    name: Option<String>,
    status: ContainerStatus,
    image: String,
    tag: String,
    auto_remove: bool,
}

pub(crate) struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    pub(crate) fn with_image(self, image: &str, tag: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(format!("{image}:{tag}"));
        self
    }

    /// Seed a pre-existing container, as if left over from an earlier run.
    pub(crate) fn seed_container(&self, name: &str, status: ContainerStatus) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("ctr-{}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                name: Some(name.to_string()),
                status,
                image: "seeded".to_string(),
                tag: "latest".to_string(),
                auto_remove: false,
            },
        );
        id
    }

    pub(crate) fn fail_pulls(&self) {
        self.state.lock().unwrap().pull_fails = true;
    }

    pub(crate) fn fail_runs(&self) {
        self.state.lock().unwrap().run_fails = true;
    }

    /// Simulate a container that disappears between `run` and `inspect`.
    pub(crate) fn vanish_after_run(&self) {
        self.state.lock().unwrap().vanish_after_run = true;
    }

    pub(crate) fn fail_stop(&self, id: &str) {
        self.state.lock().unwrap().fail_stop_ids.insert(id.to_string());
    }

    /// Queue exec exit codes; once drained, `default` applies.
    pub(crate) fn script_exec(&self, codes: &[i32], default: i32) {
        let mut state = self.state.lock().unwrap();
        state.exec_codes = codes.iter().copied().collect();
        state.exec_default = default;
    }

    pub(crate) fn run_calls(&self) -> u32 {
        self.state.lock().unwrap().run_calls
    }

    pub(crate) fn pull_calls(&self) -> u32 {
        self.state.lock().unwrap().pull_calls
    }

    pub(crate) fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    fn handle_of(container: &FakeContainer) -> ContainerHandle {
        ContainerHandle {
            id: container.id.clone(),
            name: container.name.clone().unwrap_or_default(),
            ports: Vec::new(),
            status: container.status,
            image: container.image.clone(),
            tag: container.tag.clone(),
        }
    }

    fn not_found(id: &str) -> RuntimeError {
        RuntimeError::CommandFailed {
            command: format!("docker inspect {id}"),
            exit_code: 1,
            stderr: format!("Error: No such container: {id}"),
        }
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn is_available(&self) -> bool {
        true
    }

    async fn image_exists(&self, image: &str, tag: &str) -> Result<bool, RuntimeError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .images
            .contains(&format!("{image}:{tag}")))
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.pull_calls += 1;
        if state.pull_fails {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker pull {image}:{tag}"),
                exit_code: 1,
                stderr: "pull access denied".to_string(),
            });
        }
        state.images.insert(format!("{image}:{tag}"));
        Ok(())
    }

    async fn build_image(
        &self,
        image: &str,
        tag: &str,
        _dockerfile: &str,
        on_progress: Progress<'_>,
    ) -> Result<(), RuntimeError> {
        if let Some(on_progress) = on_progress {
            on_progress("Step 1/4 : FROM rust:slim");
        }
        self.state
            .lock()
            .unwrap()
            .images
            .insert(format!("{image}:{tag}"));
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.run_calls += 1;

        if state.run_fails {
            return Err(RuntimeError::CommandFailed {
                command: "docker run".to_string(),
                exit_code: 125,
                stderr: "docker: Error response from daemon".to_string(),
            });
        }

        if let Some(name) = &spec.name {
            let taken = state
                .containers
                .values()
                .any(|c| c.name.as_deref() == Some(name.as_str()));
            if taken {
                return Err(RuntimeError::CommandFailed {
                    command: "docker run".to_string(),
                    exit_code: 125,
                    stderr: format!("Conflict. The container name \"/{name}\" is already in use"),
                });
            }
        }

        if !state.images.contains(&spec.image_ref()) {
            return Err(RuntimeError::CommandFailed {
                command: "docker run".to_string(),
                exit_code: 125,
                stderr: format!("Unable to find image '{}' locally", spec.image_ref()),
            });
        }

        state.next_id += 1;
        let id = format!("ctr-{}", state.next_id);
        if !state.vanish_after_run {
            state.containers.insert(
                id.clone(),
                FakeContainer {
                    id: id.clone(),
                    name: spec.name.clone(),
                    status: ContainerStatus::Running,
                    image: spec.image.clone(),
                    tag: spec.tag.clone(),
                    auto_remove: spec.auto_remove,
                },
            );
        }
        Ok(id)
    }

    async fn run_attached(
        &self,
        spec: &ContainerSpec,
        on_output: Progress<'_>,
    ) -> Result<ExecResult, RuntimeError> {
        {
            let state = self.state.lock().unwrap();
            if !state.images.contains(&spec.image_ref()) {
                return Err(RuntimeError::CommandFailed {
                    command: "docker run".to_string(),
                    exit_code: 125,
                    stderr: format!("Unable to find image '{}' locally", spec.image_ref()),
                });
            }
        }
        if let Some(on_output) = on_output {
            on_output("Compiling contract v0.1.0");
            on_output("Finished `release` profile");
        }
        Ok(ExecResult {
            exit_code: 0,
            stdout: "Finished `release` profile\n".to_string(),
            stderr: String::new(),
        })
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(id) {
            Some(container) => {
                container.status = ContainerStatus::Running;
                Ok(())
            }
            None => Err(Self::not_found(id)),
        }
    }

    async fn stop(&self, id: &str, _timeout_secs: u32) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_stop_ids.contains(id) {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker stop {id}"),
                exit_code: 1,
                stderr: "cannot stop container".to_string(),
            });
        }
        let auto_remove = match state.containers.get(id) {
            Some(container) => container.auto_remove,
            None => return Err(Self::not_found(id)),
        };
        if auto_remove {
            state.containers.remove(id);
        } else if let Some(container) = state.containers.get_mut(id) {
            container.status = ContainerStatus::Exited;
        }
        Ok(())
    }

    async fn remove(&self, id: &str, _force: bool) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        match state.containers.remove(id) {
            Some(_) => Ok(()),
            None => Err(Self::not_found(id)),
        }
    }

    async fn inspect(&self, id: &str) -> Option<ContainerHandle> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(id)
            .map(Self::handle_of)
    }

    async fn status(&self, id: &str) -> ContainerStatus {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(id)
            .map(|c| c.status)
            .unwrap_or(ContainerStatus::Unknown)
    }

    async fn find_by_name(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .values()
            .find(|c| c.name.as_deref() == Some(name))
            .map(|c| c.id.clone())
    }

    async fn logs(&self, _id: &str, _tail: Option<u32>) -> Result<String, RuntimeError> {
        Ok(String::new())
    }

    async fn stream_logs(
        &self,
        _id: &str,
        _tail: Option<u32>,
    ) -> Result<tokio::process::Child, RuntimeError> {
        let child = tokio::process::Command::new("sh")
            .args(["-c", ":"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(child)
    }

    async fn exec(&self, id: &str, _command: &[String]) -> Result<ExecResult, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if !state.containers.contains_key(id) {
            return Err(Self::not_found(id));
        }
        let code = state.exec_codes.pop_front().unwrap_or(state.exec_default);
        Ok(ExecResult {
            exit_code: code,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.state.lock().unwrap().networks.insert(name.to_string());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.networks.remove(name) {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("docker network rm {name}"),
                exit_code: 1,
                stderr: format!("network {name} not found"),
            })
        }
    }

    async fn network_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().networks.contains(name)
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.state.lock().unwrap().volumes.insert(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.volumes.remove(name) {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                command: format!("docker volume rm {name}"),
                exit_code: 1,
                stderr: format!("no such volume: {name}"),
            })
        }
    }

    async fn volume_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().volumes.contains(name)
    }
}
