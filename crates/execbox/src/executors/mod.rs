//! Execution backends
//!
//! An executor runs one [`PreparedCommand`] and produces an
//! [`ExecutionResult`] or a typed failure. Both backends share the same
//! timeout escalation: a soft interrupt when the budget expires, then a
//! hard kill after a fixed grace window, so observable cancellation latency
//! is bounded by the timeout plus a small constant in either backend.

pub mod container;
pub mod process;
pub mod stream;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EffectiveOptions;
use crate::engines::PreparedCommand;
use crate::errors::Result;

pub use container::ContainerExecutor;
pub use process::ProcessExecutor;

/// Grace window between the soft interrupt and the hard kill, shared by
/// both backends.
pub(crate) const KILL_GRACE: Duration = Duration::from_millis(500);

/// Captured output and exit disposition of one execution.
///
/// A graceful exit sets `exit_code` and leaves `signal` empty; a forced
/// termination sets `signal` and may leave `exit_code` empty.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub signal: Option<String>,
    pub duration: Duration,
}

impl ExecutionResult {
    /// True when the workload exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && self.signal.is_none()
    }

    /// Elapsed wall-clock time in milliseconds.
    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }
}

/// Backend capability: run one prepared command to completion.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, prepared: PreparedCommand, opts: &EffectiveOptions) -> Result<ExecutionResult>;
}
