//! Disposable, isolated execution contexts for untrusted code.
//!
//! An [`Environment`] owns a scratch workspace on the host, stages files
//! into it, and executes JavaScript, TypeScript, or Python workloads
//! through one of two backends: a lightweight host-process backend or a
//! strongly isolated container backend. Results carry captured output,
//! exit disposition, and timing; timeouts and resource ceilings are
//! enforced by both backends.
//!
//! # Architecture Overview
//!
//! - **Environment lifecycle**: workspace staging, per-call option
//!   merging, explicit idempotent cleanup
//! - **Language engines**: one strategy per (language, backend) pair,
//!   including the two-stage TypeScript compile-then-run pipeline
//! - **Execution backends**: host child processes with timeout escalation,
//!   or containers driven through the runtime's API with a configurable
//!   security policy
//! - **Resource ceilings**: V8 heap flags, unix rlimits through a staged
//!   wrapper, or container cgroup controls, depending on engine
//!
//! The process backend is not a security sandbox; it offers no
//! kernel-level confinement. Workloads that need genuine isolation belong
//! on the container backend.
//!
//! # Example
//!
//! ```no_run
//! use execbox::{Backend, Environment, EnvironmentConfig, ExecOptions, Language};
//!
//! # async fn run() -> execbox::Result<()> {
//! let config = EnvironmentConfig::new(Language::Javascript, Backend::Process)
//!     .with_timeout_ms(5_000);
//! let mut env = Environment::new(config)?;
//! env.add_file("main.js", "console.log('hello')").await?;
//! let result = env.execute(Some("main.js"), &[], ExecOptions::default()).await?;
//! assert_eq!(result.exit_code, Some(0));
//! env.delete().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engines;
pub mod environment;
pub mod errors;
pub mod executors;
pub mod sanitize;
pub mod toolchain;

pub use config::{
    Backend, EnvironmentConfig, ExecOptions, Language, LanguageOptions, MountMode, PullPolicy,
    SecurityPolicy, UserSpec,
};
pub use environment::Environment;
pub use errors::{ExecboxError, Result};
pub use executors::ExecutionResult;
