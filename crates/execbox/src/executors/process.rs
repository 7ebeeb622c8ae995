//! Host-process execution backend
//!
//! Runs the prepared command as a child process with piped streams, a
//! cleared-then-resolved environment, and the workspace as working
//! directory. Output is drained concurrently so partial output survives a
//! forced termination. This backend offers no kernel-level confinement;
//! callers who need genuine isolation use the container backend.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::{EffectiveOptions, UserSpec};
use crate::engines::{CommandSpec, PreparedCommand};
use crate::errors::{ExecboxError, Result};
use crate::executors::{CommandExecutor, ExecutionResult, KILL_GRACE};

pub struct ProcessExecutor {
    run_as: Option<UserSpec>,
}

impl ProcessExecutor {
    pub fn new(run_as: Option<UserSpec>) -> Self {
        ProcessExecutor { run_as }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, prepared: PreparedCommand, opts: &EffectiveOptions) -> Result<ExecutionResult> {
        let (program, args) = match &prepared.invocation {
            CommandSpec::Explicit { program, args } => (program.clone(), args.clone()),
            CommandSpec::ImageDefault { .. } => {
                return Err(ExecboxError::Configuration(
                    "the process backend has no image entrypoint to fall back to".to_string(),
                ))
            }
        };
        let command_line = prepared.invocation.display_line();

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .env_clear()
            .envs(&prepared.env)
            .current_dir(&prepared.workdir)
            .stdin(if opts.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        if let Some(user) = &self.run_as {
            // Insufficient privilege surfaces as a spawn error below.
            cmd.uid(user.uid);
            if let Some(gid) = user.gid {
                cmd.gid(gid);
            }
        }
        #[cfg(not(unix))]
        if self.run_as.is_some() {
            log::warn!("uid/gid overrides are ignored on non-unix hosts");
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            ExecboxError::runtime(&command_line, format!("failed to spawn: {}", e))
        })?;

        // Drain before writing stdin so a chatty child cannot deadlock on a
        // full pipe while we block on its input.
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        if let Some(input) = opts.stdin.clone() {
            if let Some(mut sink) = child.stdin.take() {
                // One-shot write off the wait path; dropping the handle at
                // task end closes the stream. No interactive input.
                tokio::spawn(async move {
                    if let Err(e) = sink.write_all(input.as_bytes()).await {
                        log::debug!("stdin write ended early: {}", e);
                    }
                });
            }
        }

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| {
                ExecboxError::runtime(&command_line, format!("wait failed: {}", e))
            })?,
            _ = tokio::time::sleep(opts.timeout) => {
                let elapsed = started.elapsed();
                log::warn!("'{}' exceeded its {:?} budget", command_line, opts.timeout);
                escalate(&mut child, &command_line).await;
                return Err(ExecboxError::Timeout {
                    configured: opts.timeout,
                    elapsed,
                    stdout: collect(stdout_task).await,
                    stderr: collect(stderr_task).await,
                });
            }
        };

        let duration = started.elapsed();
        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal().map(signal_name)
        };
        #[cfg(not(unix))]
        let signal: Option<String> = None;

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code: status.code().map(i64::from),
            signal,
            duration,
        })
    }
}

/// Soft interrupt, bounded grace, then hard kill.
async fn escalate(child: &mut Child, command_line: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        log::warn!("'{}' survived SIGTERM past the grace window", command_line);
    }
    if let Err(e) = child.kill().await {
        log::warn!("failed to kill '{}': {}", command_line, e);
    }
}

fn drain<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn collect(task: JoinHandle<Vec<u8>>) -> String {
    match task.await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    match signal {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        3 => "SIGQUIT".to_string(),
        6 => "SIGABRT".to_string(),
        9 => "SIGKILL".to_string(),
        11 => "SIGSEGV".to_string(),
        13 => "SIGPIPE".to_string(),
        15 => "SIGTERM".to_string(),
        24 => "SIGXCPU".to_string(),
        other => format!("SIG{}", other),
    }
}
