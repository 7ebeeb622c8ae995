//! Configuration type definitions for execution environments
//!
//! The configuration follows a layered approach: an environment carries
//! defaults for timeout, memory ceiling, and environment variables, and each
//! execute call may independently override any of them. Container isolation
//! controls live in [`SecurityPolicy`] and are immutable once a container
//! has been created from them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Languages an environment can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Typescript,
    Python,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Javascript => write!(f, "javascript"),
            Language::Typescript => write!(f, "typescript"),
            Language::Python => write!(f, "python"),
        }
    }
}

/// Execution backend. The process backend runs workloads as host child
/// processes; the container backend delegates isolation to the container
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Process,
    Container,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Process => write!(f, "process"),
            Backend::Container => write!(f, "container"),
        }
    }
}

/// Per-language toolchain path overrides. When unset, interpreters are
/// resolved through the environment's toolchain resolver (process backend)
/// or taken as in-container names (container backend).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageOptions {
    #[serde(default)]
    pub node_path: Option<PathBuf>,
    #[serde(default)]
    pub python_path: Option<PathBuf>,
    #[serde(default)]
    pub tsc_path: Option<PathBuf>,
}

/// uid/gid identity a workload runs under. On the process backend this is
/// applied at spawn time; on the container backend it becomes the container
/// user specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub uid: u32,
    #[serde(default)]
    pub gid: Option<u32>,
}

impl UserSpec {
    /// Container-style `uid` or `uid:gid` string.
    pub fn as_user_string(&self) -> String {
        match self.gid {
            Some(gid) => format!("{}:{}", self.uid, gid),
            None => self.uid.to_string(),
        }
    }
}

/// Image pull behavior for the container backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

/// Mount mode of the workspace bind inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MountMode {
    #[default]
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "ro")]
    ReadOnly,
}

impl fmt::Display for MountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountMode::ReadWrite => write!(f, "rw"),
            MountMode::ReadOnly => write!(f, "ro"),
        }
    }
}

/// Container-level isolation controls. Immutable once a container has been
/// created from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// Image reference, e.g. `node:20-slim`.
    pub image: String,
    #[serde(default)]
    pub pull_policy: PullPolicy,
    /// Container network mode (`bridge`, `none`, ...). `None` leaves the
    /// runtime default in place.
    #[serde(default)]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub workspace_mount: MountMode,
    #[serde(default)]
    pub cpu_shares: Option<i64>,
    #[serde(default)]
    pub cpu_period: Option<i64>,
    #[serde(default)]
    pub cpu_quota: Option<i64>,
    /// Maximum number of processes inside the container.
    #[serde(default)]
    pub pids_limit: Option<i64>,
    #[serde(default)]
    pub cap_add: Vec<String>,
    /// Capabilities to drop. The single entry `ALL` (case-insensitive)
    /// drops every capability.
    #[serde(default)]
    pub cap_drop: Vec<String>,
    #[serde(default)]
    pub no_new_privileges: bool,
    #[serde(default)]
    pub readonly_rootfs: bool,
}

impl SecurityPolicy {
    pub fn new(image: impl Into<String>) -> Self {
        SecurityPolicy {
            image: image.into(),
            pull_policy: PullPolicy::default(),
            network_mode: None,
            workspace_mount: MountMode::default(),
            cpu_shares: None,
            cpu_period: None,
            cpu_quota: None,
            pids_limit: None,
            cap_add: Vec::new(),
            cap_drop: Vec::new(),
            no_new_privileges: false,
            readonly_rootfs: false,
        }
    }

    /// True when the drop list is the "all capabilities" sentinel.
    pub fn drops_all_capabilities(&self) -> bool {
        self.cap_drop.len() == 1 && self.cap_drop[0].eq_ignore_ascii_case("all")
    }
}

/// Defaults an environment is created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub language: Language,
    pub backend: Backend,
    /// Default wall-clock budget per execute call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Default memory ceiling in megabytes. Interpreted per engine: a V8
    /// heap flag for JavaScript, an address-space rlimit for Python on the
    /// process backend, a cgroup limit on the container backend.
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
    /// Maximum number of processes the workload may hold. Only enforced for
    /// Python on unix hosts (process backend) and through the policy's pid
    /// limit (container backend).
    #[serde(default)]
    pub process_limit: Option<u64>,
    /// Default environment variables, layered over the sanitized host
    /// allowlist.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub languages: LanguageOptions,
    /// Identity the workload runs under, for both backends.
    #[serde(default)]
    pub run_as: Option<UserSpec>,
    /// Required when `backend` is [`Backend::Container`].
    #[serde(default)]
    pub policy: Option<SecurityPolicy>,
    /// Diagnostic switch: skip the final force-remove so a finished or
    /// timed-out container can be inspected by hand.
    #[serde(default)]
    pub preserve_containers: bool,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl EnvironmentConfig {
    pub fn new(language: Language, backend: Backend) -> Self {
        EnvironmentConfig {
            language,
            backend,
            timeout_ms: default_timeout_ms(),
            memory_limit_mb: None,
            process_limit: None,
            env: HashMap::new(),
            languages: LanguageOptions::default(),
            run_as: None,
            policy: None,
            preserve_containers: false,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_memory_limit_mb(mut self, limit: u64) -> Self {
        self.memory_limit_mb = Some(limit);
        self
    }

    pub fn with_process_limit(mut self, limit: u64) -> Self {
        self.process_limit = Some(limit);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_policy(mut self, policy: SecurityPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_run_as(mut self, user: UserSpec) -> Self {
        self.run_as = Some(user);
        self
    }
}

/// Per-call overrides. Every field is independently optional; a set field
/// wins over the environment default.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub timeout_ms: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    pub env: Option<HashMap<String, String>>,
    /// One-shot standard input, written once and closed. Process backend
    /// only; the container backend does not attach stdin.
    pub stdin: Option<String>,
}

impl ExecOptions {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_memory_limit_mb(mut self, limit: u64) -> Self {
        self.memory_limit_mb = Some(limit);
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

/// The merged view of environment defaults and call overrides handed to
/// engines and executors. `env` is already fully resolved: sanitized host
/// allowlist, then environment defaults, then call overrides.
#[derive(Debug, Clone)]
pub struct EffectiveOptions {
    pub timeout: Duration,
    pub memory_limit_mb: Option<u64>,
    pub process_limit: Option<u64>,
    pub env: HashMap<String, String>,
    pub stdin: Option<String>,
}

impl EffectiveOptions {
    /// Merge call options over environment defaults. Call-level values win
    /// field by field.
    pub fn merge(config: &EnvironmentConfig, call: &ExecOptions, resolved_env: HashMap<String, String>) -> Self {
        EffectiveOptions {
            timeout: Duration::from_millis(call.timeout_ms.unwrap_or(config.timeout_ms)),
            memory_limit_mb: call.memory_limit_mb.or(config.memory_limit_mb),
            process_limit: config.process_limit,
            env: resolved_env,
            stdin: call.stdin.clone(),
        }
    }
}
