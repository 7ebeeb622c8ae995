//! Fail-fast validation of environment configuration
//!
//! Runs once at environment creation, before any directory, process, or
//! container exists, so that bad input is always reported as a
//! configuration error rather than surfacing later as an infrastructure
//! failure.

use crate::config::types::{Backend, EnvironmentConfig};
use crate::errors::{ExecboxError, Result};

/// Validate an [`EnvironmentConfig`] before an environment is created.
pub fn validate(config: &EnvironmentConfig) -> Result<()> {
    if config.timeout_ms == 0 {
        return Err(ExecboxError::Configuration(
            "timeout_ms must be positive".to_string(),
        ));
    }
    if config.memory_limit_mb == Some(0) {
        return Err(ExecboxError::Configuration(
            "memory_limit_mb must be positive".to_string(),
        ));
    }
    if config.process_limit == Some(0) {
        return Err(ExecboxError::Configuration(
            "process_limit must be positive".to_string(),
        ));
    }

    match config.backend {
        Backend::Container => {
            let policy = config.policy.as_ref().ok_or_else(|| {
                ExecboxError::Configuration(
                    "container backend requires a security policy with an image".to_string(),
                )
            })?;
            if policy.image.trim().is_empty() {
                return Err(ExecboxError::Configuration(
                    "security policy image must not be empty".to_string(),
                ));
            }
            for (name, value) in [
                ("cpu_shares", policy.cpu_shares),
                ("cpu_period", policy.cpu_period),
                ("cpu_quota", policy.cpu_quota),
                ("pids_limit", policy.pids_limit),
            ] {
                if let Some(v) = value {
                    if v <= 0 {
                        return Err(ExecboxError::Configuration(format!(
                            "{} must be positive, got {}",
                            name, v
                        )));
                    }
                }
            }
        }
        Backend::Process => {
            if config.policy.is_some() {
                log::warn!("security policy is ignored by the process backend");
            }
        }
    }

    Ok(())
}
