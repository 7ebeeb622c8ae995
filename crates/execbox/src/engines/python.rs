//! Python engine, process and container variants
//!
//! The process variant is the one place resource ceilings need host
//! cooperation: on unix, when a memory or process ceiling is configured,
//! the prepared command targets a staged limiter script instead of the
//! interpreter. The limiter applies the rlimits to itself and execs the
//! real command line (passed through environment variables), so the limits
//! bind transitively. Off unix, or without ceilings, the interpreter runs
//! directly and limits are a no-op. The container variant never uses the
//! wrapper; the security policy's cgroup controls take its place.

use std::path::Path;

use crate::config::{EffectiveOptions, EnvironmentConfig};
use crate::engines::{container_script_path, CommandSpec, PreparedCommand};
use crate::errors::{ExecboxError, Result};
use crate::toolchain::ToolchainResolver;

const DEFAULT_INTERPRETER: &str = "python3";

/// Limiter source, staged into the workspace on demand.
const LIMITER_SOURCE: &str = include_str!("limiter.py");

/// Workspace-relative name of the staged limiter.
pub(crate) const LIMITER_FILE: &str = ".execbox-limiter.py";

/// Environment variables the limiter reads.
pub(crate) const ENV_EXEC_ARGS: &str = "EXECBOX_EXEC_ARGS";
pub(crate) const ENV_MEMORY_LIMIT: &str = "EXECBOX_MEMORY_LIMIT_MB";
pub(crate) const ENV_PROCESS_LIMIT: &str = "EXECBOX_PROCESS_LIMIT";

fn host_interpreter(config: &EnvironmentConfig, toolchain: &ToolchainResolver) -> String {
    match &config.languages.python_path {
        Some(path) => path.to_string_lossy().into_owned(),
        None => toolchain.resolve_or_bare(DEFAULT_INTERPRETER),
    }
}

fn container_interpreter(config: &EnvironmentConfig) -> String {
    match &config.languages.python_path {
        Some(path) => path.to_string_lossy().into_owned(),
        None => DEFAULT_INTERPRETER.to_string(),
    }
}

pub(crate) async fn prepare_process(
    workspace: &Path,
    config: &EnvironmentConfig,
    toolchain: &ToolchainResolver,
    script: &str,
    args: &[String],
    opts: &EffectiveOptions,
) -> Result<PreparedCommand> {
    let interpreter = host_interpreter(config, toolchain);
    let wants_limits = opts.memory_limit_mb.is_some() || opts.process_limit.is_some();

    if wants_limits && cfg!(unix) {
        stage_limiter(workspace).await?;
        let mut env = opts.env.clone();
        let mut real_argv = vec![interpreter.clone(), script.to_string()];
        real_argv.extend(args.iter().cloned());
        let marshalled = serde_json::to_string(&real_argv).map_err(|e| {
            ExecboxError::Configuration(format!("could not marshal command line: {}", e))
        })?;
        env.insert(ENV_EXEC_ARGS.to_string(), marshalled);
        if let Some(mb) = opts.memory_limit_mb {
            env.insert(ENV_MEMORY_LIMIT.to_string(), mb.to_string());
        }
        if let Some(n) = opts.process_limit {
            env.insert(ENV_PROCESS_LIMIT.to_string(), n.to_string());
        }
        return Ok(PreparedCommand {
            invocation: CommandSpec::Explicit {
                program: interpreter,
                args: vec![LIMITER_FILE.to_string()],
            },
            env,
            workdir: workspace.to_path_buf(),
        });
    }

    if wants_limits {
        log::warn!("resource ceilings are a no-op for python on non-unix hosts");
    }
    let mut shaped = Vec::with_capacity(args.len() + 1);
    shaped.push(script.to_string());
    shaped.extend(args.iter().cloned());
    Ok(PreparedCommand {
        invocation: CommandSpec::Explicit {
            program: interpreter,
            args: shaped,
        },
        env: opts.env.clone(),
        workdir: workspace.to_path_buf(),
    })
}

pub(crate) fn prepare_container(
    workspace: &Path,
    config: &EnvironmentConfig,
    script: &str,
    args: &[String],
    opts: &EffectiveOptions,
) -> Result<PreparedCommand> {
    let script = container_script_path(script);
    let mut shaped = Vec::with_capacity(args.len() + 1);
    shaped.push(script);
    shaped.extend(args.iter().cloned());
    Ok(PreparedCommand {
        invocation: CommandSpec::Explicit {
            program: container_interpreter(config),
            args: shaped,
        },
        env: opts.env.clone(),
        workdir: workspace.to_path_buf(),
    })
}

async fn stage_limiter(workspace: &Path) -> Result<()> {
    let path = workspace.join(LIMITER_FILE);
    tokio::fs::write(&path, LIMITER_SOURCE).await.map_err(|e| {
        ExecboxError::runtime(
            LIMITER_FILE,
            format!("failed to stage resource limiter: {}", e),
        )
    })
}
