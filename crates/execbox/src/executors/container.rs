//! Container execution backend
//!
//! Maps the environment's security policy onto container runtime
//! configuration, drives the created -> started -> {exited | timed-out} ->
//! removed lifecycle, and decodes the multiplexed log stream into the
//! result. Every failure path still attempts log retrieval and removal;
//! cleanup failures are logged, never allowed to replace the primary
//! outcome.

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as CreateContainerOptionsQuery,
    CreateImageOptions as CreateImageOptionsQuery,
    InspectContainerOptions as InspectContainerOptionsQuery,
    LogsOptions as LogsOptionsQuery,
    RemoveContainerOptions as RemoveContainerOptionsQuery,
    StartContainerOptions as StartContainerOptionsQuery,
    StopContainerOptions as StopContainerOptionsQuery,
    WaitContainerOptions as WaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

use crate::config::{EffectiveOptions, PullPolicy, SecurityPolicy, UserSpec};
use crate::engines::{CommandSpec, PreparedCommand};
use crate::errors::{ExecboxError, Result};
use crate::executors::stream::LogSink;
use crate::executors::{CommandExecutor, ExecutionResult, KILL_GRACE};

/// Fixed path the workspace is bind-mounted at inside every container; also
/// the container's working directory.
pub const WORKSPACE_MOUNT: &str = "/workspace";

pub struct ContainerExecutor {
    docker: Docker,
    policy: SecurityPolicy,
    run_as: Option<UserSpec>,
    preserve: bool,
}

impl ContainerExecutor {
    /// Connect to the local container runtime.
    pub fn connect(
        policy: SecurityPolicy,
        run_as: Option<UserSpec>,
        preserve: bool,
    ) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            ExecboxError::runtime(
                "docker",
                format!("failed to connect to the container runtime: {}", e),
            )
        })?;
        Ok(ContainerExecutor {
            docker,
            policy,
            run_as,
            preserve,
        })
    }

    /// Whether a container runtime is reachable on this host. Used by
    /// integration tests to skip container scenarios gracefully.
    pub async fn daemon_available() -> bool {
        match Docker::connect_with_local_defaults() {
            Ok(docker) => docker.ping().await.is_ok(),
            Err(_) => false,
        }
    }

    async fn ensure_image(&self, command_line: &str) -> Result<()> {
        match self.policy.pull_policy {
            PullPolicy::Never => Ok(()),
            PullPolicy::Always => self.pull_image(command_line).await,
            PullPolicy::IfNotPresent => {
                match self.docker.inspect_image(&self.policy.image).await {
                    Ok(_) => Ok(()),
                    Err(bollard::errors::Error::DockerResponseServerError {
                        status_code: 404,
                        ..
                    }) => self.pull_image(command_line).await,
                    Err(e) => Err(ExecboxError::runtime(
                        command_line,
                        format!("image inspection failed for '{}': {}", self.policy.image, e),
                    )),
                }
            }
        }
    }

    async fn pull_image(&self, command_line: &str) -> Result<()> {
        log::info!("pulling image {}", self.policy.image);
        let options = CreateImageOptionsQuery {
            from_image: Some(self.policy.image.clone()),
            ..Default::default()
        };
        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = pull_stream.next().await {
            progress.map_err(|e| {
                ExecboxError::runtime(
                    command_line,
                    format!("image pull failed for '{}': {}", self.policy.image, e),
                )
            })?;
        }
        Ok(())
    }

    /// Force-remove the container unless preservation was requested.
    async fn cleanup(&self, container_id: &str) {
        if self.preserve {
            log::info!("preserving container {} for diagnosis", container_id);
            return;
        }
        let options = RemoveContainerOptionsQuery {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(container_id, Some(options)).await {
            log::warn!("failed to remove container {}: {}", container_id, e);
        }
    }
}

#[async_trait]
impl CommandExecutor for ContainerExecutor {
    async fn run(&self, prepared: PreparedCommand, opts: &EffectiveOptions) -> Result<ExecutionResult> {
        let command_line = prepared.invocation.display_line();
        if opts.stdin.is_some() {
            log::debug!("stdin is not attached on the container backend; ignoring");
        }

        self.ensure_image(&command_line).await?;

        let options = Some(CreateContainerOptionsQuery {
            name: Some(format!("execbox-{}", Uuid::new_v4())),
            ..Default::default()
        });
        let body = create_body(&self.policy, self.run_as.as_ref(), &prepared, opts);

        let started = Instant::now();
        let container = self
            .docker
            .create_container(options, body)
            .await
            .map_err(|e| {
                ExecboxError::runtime(&command_line, format!("container creation failed: {}", e))
            })?;
        let container_id = container.id;

        if let Err(e) = self
            .docker
            .start_container(&container_id, None::<StartContainerOptionsQuery>)
            .await
        {
            self.cleanup(&container_id).await;
            return Err(ExecboxError::runtime(
                &command_line,
                format!("container start failed: {}", e),
            ));
        }

        let mut wait_stream = self
            .docker
            .wait_container(&container_id, None::<WaitContainerOptionsQuery>);

        let wait_outcome = tokio::select! {
            outcome = wait_stream.next() => outcome,
            _ = tokio::time::sleep(opts.timeout) => {
                let elapsed = started.elapsed();
                log::warn!("container {} exceeded its {:?} budget", container_id, opts.timeout);
                // Graceful stop bounded by the grace window; the final
                // force-remove kills whatever is left.
                let stop = self
                    .docker
                    .stop_container(&container_id, None::<StopContainerOptionsQuery>);
                if tokio::time::timeout(KILL_GRACE, stop).await.is_err() {
                    log::warn!("container {} ignored the stop request", container_id);
                }
                let (stdout, stderr) = collect_logs(&self.docker, &container_id).await;
                self.cleanup(&container_id).await;
                return Err(ExecboxError::Timeout {
                    configured: opts.timeout,
                    elapsed,
                    stdout,
                    stderr,
                });
            }
        };

        let status_code = match wait_outcome {
            Some(Ok(response)) => response.status_code,
            // The runtime reports non-zero exits through the wait error
            // channel; that is still a completed execution.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => {
                let (stdout, stderr) = collect_logs(&self.docker, &container_id).await;
                self.cleanup(&container_id).await;
                return Err(ExecboxError::runtime_with_logs(
                    &command_line,
                    format!("waiting on the container failed: {}", e),
                    stdout,
                    stderr,
                ));
            }
            None => {
                let (stdout, stderr) = collect_logs(&self.docker, &container_id).await;
                self.cleanup(&container_id).await;
                return Err(ExecboxError::runtime_with_logs(
                    &command_line,
                    "container wait stream ended unexpectedly".to_string(),
                    stdout,
                    stderr,
                ));
            }
        };

        let oom_killed = self
            .docker
            .inspect_container(&container_id, None::<InspectContainerOptionsQuery>)
            .await
            .ok()
            .and_then(|inspect| inspect.state)
            .and_then(|state| state.oom_killed)
            .unwrap_or(false);

        let (stdout, stderr) = collect_logs(&self.docker, &container_id).await;
        let duration = started.elapsed();
        self.cleanup(&container_id).await;

        if oom_killed {
            return Err(ExecboxError::MemoryLimit {
                limit_mb: opts.memory_limit_mb,
                stdout,
                stderr,
            });
        }

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code: Some(status_code),
            signal: None,
            duration,
        })
    }
}

/// Retrieve and demultiplex the container's combined log stream.
async fn collect_logs(docker: &Docker, container_id: &str) -> (String, String) {
    let mut sink = LogSink::new();
    let mut log_stream = docker.logs(
        container_id,
        Some(LogsOptionsQuery {
            stdout: true,
            stderr: true,
            ..Default::default()
        }),
    );
    while let Some(item) = log_stream.next().await {
        match item {
            Ok(LogOutput::StdOut { message }) => sink.push_stdout(&message),
            Ok(LogOutput::StdErr { message }) => sink.push_stderr(&message),
            Ok(_) => {}
            Err(e) => {
                log::debug!("log retrieval for {} ended early: {}", container_id, e);
                break;
            }
        }
    }
    sink.into_strings()
}

/// Map the security policy and effective options onto the runtime's
/// container configuration.
fn create_body(
    policy: &SecurityPolicy,
    run_as: Option<&UserSpec>,
    prepared: &PreparedCommand,
    opts: &EffectiveOptions,
) -> ContainerCreateBody {
    let cmd = match &prepared.invocation {
        CommandSpec::Explicit { program, args } => {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(program.clone());
            full.extend(args.iter().cloned());
            Some(full)
        }
        CommandSpec::ImageDefault { args } => {
            if args.is_empty() {
                None
            } else {
                Some(args.clone())
            }
        }
    };

    let mut env: Vec<String> = prepared
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    env.sort();

    ContainerCreateBody {
        image: Some(policy.image.clone()),
        cmd,
        env: Some(env),
        working_dir: Some(WORKSPACE_MOUNT.to_string()),
        user: run_as.map(UserSpec::as_user_string),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        host_config: Some(host_config(policy, opts, &prepared.workdir)),
        ..Default::default()
    }
}

fn host_config(policy: &SecurityPolicy, opts: &EffectiveOptions, workspace: &Path) -> HostConfig {
    let cap_drop = if policy.drops_all_capabilities() {
        Some(vec!["ALL".to_string()])
    } else if policy.cap_drop.is_empty() {
        None
    } else {
        Some(policy.cap_drop.clone())
    };

    HostConfig {
        binds: Some(vec![format!(
            "{}:{}:{}",
            workspace.display(),
            WORKSPACE_MOUNT,
            policy.workspace_mount
        )]),
        memory: opts.memory_limit_mb.map(|mb| (mb * 1024 * 1024) as i64),
        cpu_shares: policy.cpu_shares,
        cpu_period: policy.cpu_period,
        cpu_quota: policy.cpu_quota,
        pids_limit: policy.pids_limit,
        cap_add: if policy.cap_add.is_empty() {
            None
        } else {
            Some(policy.cap_add.clone())
        },
        cap_drop,
        security_opt: if policy.no_new_privileges {
            Some(vec!["no-new-privileges".to_string()])
        } else {
            None
        },
        readonly_rootfs: Some(policy.readonly_rootfs),
        network_mode: policy.network_mode.clone(),
        ..Default::default()
    }
}
