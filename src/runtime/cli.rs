use std::process::Stdio;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::types::{
    ContainerHandle, ContainerSpec, ContainerStatus, ExecResult, PortMapping, Protocol,
};
use super::{ContainerRuntime, Progress};
use crate::error::RuntimeError;

/// CLI-backed [`ContainerRuntime`]. Shells out to the `docker` binary so the
/// same adapter works against Docker Desktop, Colima and plain dockerd
/// without linking a daemon API client.
pub struct DockerCli {
    command: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different CLI binary (e.g. `podman`).
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    async fn invoke(&self, args: &[String]) -> Result<CommandOutput, RuntimeError> {
        debug!("invoking {} {}", self.command, args.join(" "));

        let output = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Invoke and map any non-zero exit to a [`RuntimeError`].
    async fn invoke_checked(&self, args: &[String]) -> Result<CommandOutput, RuntimeError> {
        let output = self.invoke(args).await?;
        if output.exit_code != 0 {
            return Err(RuntimeError::command_failed(
                args,
                output.exit_code,
                &output.stderr,
            ));
        }
        Ok(output)
    }

    /// Spawn with piped output, stream every line to `on_line`, and collect
    /// the full stdout/stderr. Cargo and docker both write progress to
    /// stderr, so both streams feed the callback.
    async fn invoke_streaming(
        &self,
        args: &[String],
        on_line: Progress<'_>,
    ) -> Result<CommandOutput, RuntimeError> {
        debug!("invoking {} {} (streaming)", self.command, args.join(" "));

        let mut child = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout, stderr) = tokio::join!(
            drain_lines(stdout, on_line),
            drain_lines(stderr, on_line),
        );

        let status = child.wait().await?;
        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        })
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            command: std::env::var("NITRODOCK_DOCKER").unwrap_or_else(|_| "docker".to_string()),
        }
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerCli {
    async fn is_available(&self) -> bool {
        match self.invoke(&svec(["info", "--format", "{{.ServerVersion}}"])).await {
            Ok(output) => output.exit_code == 0 && !output.stdout.trim().is_empty(),
            Err(_) => false,
        }
    }

    async fn image_exists(&self, image: &str, tag: &str) -> Result<bool, RuntimeError> {
        let output = self
            .invoke(&vec![
                "image".to_string(),
                "inspect".to_string(),
                format!("{image}:{tag}"),
            ])
            .await?;
        Ok(output.exit_code == 0)
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), RuntimeError> {
        self.invoke_checked(&vec!["pull".to_string(), format!("{image}:{tag}")])
            .await?;
        Ok(())
    }

    async fn build_image(
        &self,
        image: &str,
        tag: &str,
        dockerfile: &str,
        on_progress: Progress<'_>,
    ) -> Result<(), RuntimeError> {
        // Scratch build context, removed when `context` drops on every path.
        let context = tempfile::tempdir()?;
        tokio::fs::write(context.path().join("Dockerfile"), dockerfile).await?;

        let args = vec![
            "build".to_string(),
            "-t".to_string(),
            format!("{image}:{tag}"),
            context.path().display().to_string(),
        ];

        let output = self.invoke_streaming(&args, on_progress).await?;
        if output.exit_code != 0 {
            return Err(RuntimeError::command_failed(
                &args,
                output.exit_code,
                &output.stderr,
            ));
        }
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let args = build_run_args(spec);
        let output = self.invoke_checked(&args).await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn run_attached(
        &self,
        spec: &ContainerSpec,
        on_output: Progress<'_>,
    ) -> Result<ExecResult, RuntimeError> {
        let mut foreground = spec.clone();
        foreground.detach = false;

        let args = build_run_args(&foreground);
        let output = self.invoke_streaming(&args, on_output).await?;
        if output.exit_code != 0 {
            return Err(RuntimeError::command_failed(
                &args,
                output.exit_code,
                &output.stderr,
            ));
        }

        Ok(ExecResult {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.invoke_checked(&svec(["start", id])).await?;
        Ok(())
    }

    async fn stop(&self, id: &str, timeout_secs: u32) -> Result<(), RuntimeError> {
        self.invoke_checked(&vec![
            "stop".to_string(),
            "-t".to_string(),
            timeout_secs.to_string(),
            id.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("-f".to_string());
        }
        args.push(id.to_string());
        self.invoke_checked(&args).await?;
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Option<ContainerHandle> {
        let output = self
            .invoke(&svec(["inspect", "--format", "{{json .}}", id]))
            .await
            .ok()?;
        if output.exit_code != 0 {
            return None;
        }

        match serde_json::from_str::<InspectJson>(&output.stdout) {
            Ok(json) => Some(json.into_handle()),
            Err(e) => {
                warn!("unparseable inspect output for {id}: {e}");
                None
            }
        }
    }

    async fn status(&self, id: &str) -> ContainerStatus {
        match self
            .invoke(&svec(["inspect", "--format", "{{.State.Status}}", id]))
            .await
        {
            Ok(output) if output.exit_code == 0 => ContainerStatus::parse(&output.stdout),
            _ => ContainerStatus::Unknown,
        }
    }

    async fn find_by_name(&self, name: &str) -> Option<String> {
        let output = self
            .invoke(&vec![
                "ps".to_string(),
                "-a".to_string(),
                "--filter".to_string(),
                format!("name=^{name}$"),
                "--format".to_string(),
                "{{.ID}}".to_string(),
            ])
            .await
            .ok()?;
        if output.exit_code != 0 {
            return None;
        }

        let id = output.stdout.trim();
        if id.is_empty() {
            None
        } else {
            Some(id.lines().next().unwrap_or(id).to_string())
        }
    }

    async fn logs(&self, id: &str, tail: Option<u32>) -> Result<String, RuntimeError> {
        let mut args = vec!["logs".to_string()];
        if let Some(tail) = tail {
            args.push("--tail".to_string());
            args.push(tail.to_string());
        }
        args.push(id.to_string());

        let output = self.invoke_checked(&args).await?;
        // docker logs writes to both streams depending on how the workload
        // logged; callers want the interleaved whole.
        Ok(output.stdout + &output.stderr)
    }

    async fn stream_logs(
        &self,
        id: &str,
        tail: Option<u32>,
    ) -> Result<tokio::process::Child, RuntimeError> {
        let mut args = vec!["logs".to_string(), "-f".to_string()];
        if let Some(tail) = tail {
            args.push("--tail".to_string());
            args.push(tail.to_string());
        }
        args.push(id.to_string());

        let child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(child)
    }

    async fn exec(&self, id: &str, command: &[String]) -> Result<ExecResult, RuntimeError> {
        let mut args = vec!["exec".to_string(), id.to_string()];
        args.extend(command.iter().cloned());

        // The exit code here is the command's own, not an adapter failure.
        let output = self.invoke(&args).await?;
        Ok(ExecResult {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.invoke_checked(&svec(["network", "create", name])).await?;
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.invoke_checked(&svec(["network", "rm", name])).await?;
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> bool {
        matches!(
            self.invoke(&svec(["network", "inspect", name])).await,
            Ok(output) if output.exit_code == 0
        )
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.invoke_checked(&svec(["volume", "create", name])).await?;
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.invoke_checked(&svec(["volume", "rm", name])).await?;
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> bool {
        matches!(
            self.invoke(&svec(["volume", "inspect", name])).await,
            Ok(output) if output.exit_code == 0
        )
    }
}

struct CommandOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

fn svec<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.into_iter().map(str::to_string).collect()
}

async fn drain_lines<R>(reader: Option<R>, on_line: Progress<'_>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(reader) = reader else {
        return collected;
    };

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(on_line) = on_line {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                on_line(trimmed);
            }
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    collected
}

/// Assemble `docker run` arguments from a spec. Flags precede the image
/// reference; workload command tokens always come last.
fn build_run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["run".to_string()];

    if spec.detach {
        args.push("-d".to_string());
    }
    if spec.auto_remove {
        args.push("--rm".to_string());
    }
    if let Some(name) = &spec.name {
        args.push("--name".to_string());
        args.push(name.clone());
    }
    if let Some(network) = &spec.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    if let Some(workdir) = &spec.workdir {
        args.push("-w".to_string());
        args.push(workdir.clone());
    }

    for port in &spec.ports {
        args.push("-p".to_string());
        args.push(format!(
            "{}:{}/{}",
            port.host,
            port.container,
            port.protocol.as_str()
        ));
    }

    let mut env: Vec<_> = spec.env.iter().collect();
    env.sort_by_key(|(key, _)| key.as_str());
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }

    for volume in &spec.volumes {
        let mode = if volume.readonly { "ro" } else { "rw" };
        args.push("-v".to_string());
        args.push(format!("{}:{}:{}", volume.host, volume.container, mode));
    }

    args.push(spec.image_ref());
    args.extend(spec.command.iter().cloned());
    args
}

#[derive(Deserialize)]
struct InspectJson {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "State")]
    state: Option<StateJson>,
    #[serde(rename = "Config")]
    config: Option<ConfigJson>,
    #[serde(rename = "NetworkSettings")]
    network_settings: Option<NetworkSettingsJson>,
}

#[derive(Deserialize)]
struct StateJson {
    #[serde(rename = "Status")]
    status: Option<String>,
}

#[derive(Deserialize)]
struct ConfigJson {
    #[serde(rename = "Image")]
    image: Option<String>,
}

#[derive(Deserialize)]
struct NetworkSettingsJson {
    #[serde(rename = "Ports")]
    ports: Option<std::collections::HashMap<String, Option<Vec<PortBindingJson>>>>,
}

#[derive(Deserialize)]
struct PortBindingJson {
    #[serde(rename = "HostPort")]
    host_port: String,
}

impl InspectJson {
    fn into_handle(self) -> ContainerHandle {
        let mut ports = Vec::new();
        if let Some(map) = self.network_settings.and_then(|n| n.ports) {
            for (container_port, bindings) in map {
                let Some(bindings) = bindings else { continue };
                let Some(binding) = bindings.first() else { continue };

                let (port, protocol) = container_port
                    .split_once('/')
                    .unwrap_or((container_port.as_str(), "tcp"));
                let (Ok(container), Ok(host)) =
                    (port.parse::<u16>(), binding.host_port.parse::<u16>())
                else {
                    continue;
                };

                ports.push(PortMapping {
                    host,
                    container,
                    protocol: if protocol == "udp" {
                        Protocol::Udp
                    } else {
                        Protocol::Tcp
                    },
                });
            }
        }
        ports.sort_by_key(|p| (p.container, p.host));

        let image_ref = self.config.and_then(|c| c.image).unwrap_or_default();
        let (image, tag) = match image_ref.split_once(':') {
            Some((image, tag)) => (image.to_string(), tag.to_string()),
            None => (image_ref, "latest".to_string()),
        };

        let status = self
            .state
            .and_then(|s| s.status)
            .map(|s| ContainerStatus::parse(&s))
            .unwrap_or_default();

        ContainerHandle {
            id: self.id,
            name: self
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            ports,
            status,
            image,
            tag,
        }
    }
}
