//! Error types for the execution environment lifecycle
//!
//! Every component reports failures through [`ExecboxError`]. The variants are
//! deliberately coarse: callers branch on the *kind* of failure (bad input,
//! failed compile, timeout, infrastructure) rather than on the underlying
//! library error, and each variant carries the captured output that was
//! available when the failure occurred so diagnostics never get lost.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ExecboxError>;

#[derive(Error, Debug, Clone)]
pub enum ExecboxError {
    /// Invalid input detected before any process or container exists: bad
    /// file paths, missing required configuration, non-positive limits,
    /// or a missing command for a backend that requires one.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The host-side compile step failed. Execution was never attempted.
    #[error("compilation failed:\nstdout: {stdout}\nstderr: {stderr}")]
    Compilation { stdout: String, stderr: String },

    /// Execution exceeded its wall-clock budget and was terminated.
    #[error("execution timed out after {elapsed:?} (configured limit {configured:?})")]
    Timeout {
        configured: Duration,
        elapsed: Duration,
        /// Output captured before termination.
        stdout: String,
        stderr: String,
    },

    /// Infrastructure failure: spawn failure, image pull failure, container
    /// creation or daemon communication failure. Carries the attempted
    /// command line for context plus whatever output was retrievable.
    #[error("runtime failure while executing '{command}': {message}")]
    Runtime {
        command: String,
        message: String,
        stdout: String,
        stderr: String,
    },

    /// The container runtime reported the workload as killed by its memory
    /// ceiling. Only the container backend produces this variant; process
    /// backend violations surface as a raw non-zero exit code or signal,
    /// since the kernel does not distinguish them reliably.
    #[error("memory limit exceeded ({limit_mb:?} MB)")]
    MemoryLimit {
        limit_mb: Option<u64>,
        stdout: String,
        stderr: String,
    },
}

impl ExecboxError {
    /// Shorthand for a [`ExecboxError::Runtime`] with formatted context.
    pub fn runtime(command: impl Into<String>, message: impl Into<String>) -> Self {
        ExecboxError::Runtime {
            command: command.into(),
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// A [`ExecboxError::Runtime`] that keeps the output captured before
    /// the infrastructure failure.
    pub fn runtime_with_logs(
        command: impl Into<String>,
        message: impl Into<String>,
        stdout: String,
        stderr: String,
    ) -> Self {
        ExecboxError::Runtime {
            command: command.into(),
            message: message.into(),
            stdout,
            stderr,
        }
    }
}
