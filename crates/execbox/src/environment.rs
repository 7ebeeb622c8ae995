//! Environment lifecycle: workspace staging, execution dispatch, cleanup
//!
//! An [`Environment`] exclusively owns one scratch directory on the host.
//! Engines and executors borrow it for the duration of a single execute
//! call and treat it as read/write scratch space, but never delete it;
//! removal is solely the environment's explicit [`Environment::delete`].

use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::config::{self, Backend, EffectiveOptions, EnvironmentConfig, ExecOptions};
use crate::engines::Engine;
use crate::errors::{ExecboxError, Result};
use crate::executors::{CommandExecutor, ContainerExecutor, ExecutionResult, ProcessExecutor};
use crate::sanitize;
use crate::toolchain::ToolchainResolver;

pub struct Environment {
    config: EnvironmentConfig,
    workspace: PathBuf,
    staged: Vec<PathBuf>,
    toolchain: ToolchainResolver,
    deleted: bool,
}

impl Environment {
    /// Validate the configuration and allocate a uniquely named workspace
    /// under the resolved (symlink-free) temp root, so bind-mount sources
    /// later refer to real paths.
    pub fn new(config: EnvironmentConfig) -> Result<Self> {
        config::validate(&config)?;

        let temp_root = std::fs::canonicalize(std::env::temp_dir()).map_err(|e| {
            ExecboxError::runtime(
                "workspace allocation",
                format!("could not resolve the temp root: {}", e),
            )
        })?;
        let workspace = temp_root.join(format!("execbox-{}", Uuid::new_v4()));
        std::fs::create_dir(&workspace).map_err(|e| {
            ExecboxError::runtime(
                "workspace allocation",
                format!("could not create {}: {}", workspace.display(), e),
            )
        })?;
        log::debug!("created environment workspace {}", workspace.display());

        Ok(Environment {
            config,
            workspace,
            staged: Vec::new(),
            toolchain: ToolchainResolver::new(),
            deleted: false,
        })
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Host path of the scratch directory.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Relative paths staged so far, in staging order.
    pub fn staged_files(&self) -> &[PathBuf] {
        &self.staged
    }

    /// Toolchain lookups for this environment. Exposed so callers that
    /// install tools mid-session can invalidate the cache.
    pub fn toolchain(&self) -> &ToolchainResolver {
        &self.toolchain
    }

    /// Stage a file into the workspace. The path must be relative and must
    /// not traverse outside the workspace; parents are created as needed
    /// and the file is written with execute permission so staged scripts
    /// can be invoked directly.
    pub async fn add_file(&mut self, path: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Result<()> {
        if self.deleted {
            return Err(ExecboxError::Configuration(
                "environment has been deleted".to_string(),
            ));
        }
        let rel = normalize_staged_path(path.as_ref())?;
        let dest = self.workspace.join(&rel);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ExecboxError::runtime(
                    rel.display().to_string(),
                    format!("could not create parent directories: {}", e),
                )
            })?;
        }
        tokio::fs::write(&dest, content.as_ref()).await.map_err(|e| {
            ExecboxError::runtime(
                rel.display().to_string(),
                format!("could not write staged file: {}", e),
            )
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| {
                    ExecboxError::runtime(
                        rel.display().to_string(),
                        format!("could not set permissions: {}", e),
                    )
                })?;
        }
        if !self.staged.contains(&rel) {
            self.staged.push(rel);
        }
        Ok(())
    }

    /// Run `command` with `args` under this environment's engine and
    /// backend. Call options override the environment defaults field by
    /// field. A compile failure propagates unchanged and never reaches an
    /// executor.
    pub async fn execute(
        &self,
        command: Option<&str>,
        args: &[String],
        options: ExecOptions,
    ) -> Result<ExecutionResult> {
        if self.deleted {
            return Err(ExecboxError::Configuration(
                "environment has been deleted".to_string(),
            ));
        }

        let resolved_env = sanitize::resolve_env(&self.config.env, options.env.as_ref());
        let effective = EffectiveOptions::merge(&self.config, &options, resolved_env);
        let engine = Engine::select(self.config.language, self.config.backend);
        let prepared = engine
            .prepare(
                &self.workspace,
                &self.config,
                &self.toolchain,
                command,
                args,
                &effective,
            )
            .await?;
        log::debug!(
            "prepared '{}' for {}/{}",
            prepared.invocation.display_line(),
            self.config.language,
            self.config.backend
        );

        match self.config.backend {
            Backend::Process => {
                ProcessExecutor::new(self.config.run_as)
                    .run(prepared, &effective)
                    .await
            }
            Backend::Container => {
                let policy = self.config.policy.clone().ok_or_else(|| {
                    ExecboxError::Configuration(
                        "container backend requires a security policy".to_string(),
                    )
                })?;
                ContainerExecutor::connect(
                    policy,
                    self.config.run_as,
                    self.config.preserve_containers,
                )?
                .run(prepared, &effective)
                .await
            }
        }
    }

    /// Recursively and forcibly remove the workspace. Safe to call more
    /// than once; failures are logged, never raised.
    pub async fn delete(&mut self) {
        if self.deleted {
            return;
        }
        match tokio::fs::remove_dir_all(&self.workspace).await {
            Ok(()) => {
                log::debug!("removed workspace {}", self.workspace.display());
                self.deleted = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.deleted = true;
            }
            Err(e) => {
                log::warn!(
                    "failed to remove workspace {}: {}",
                    self.workspace.display(),
                    e
                );
            }
        }
    }
}

/// Normalize a staged path to pure forward components, rejecting anything
/// absolute or traversing.
fn normalize_staged_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Err(ExecboxError::Configuration(format!(
            "staged path must be relative: {}",
            path.display()
        )));
    }
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ExecboxError::Configuration(format!(
                    "staged path must not contain parent-directory segments: {}",
                    path.display()
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ExecboxError::Configuration(format!(
                    "staged path must be relative: {}",
                    path.display()
                )))
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(ExecboxError::Configuration(
            "staged path must name a file".to_string(),
        ));
    }
    Ok(normalized)
}
