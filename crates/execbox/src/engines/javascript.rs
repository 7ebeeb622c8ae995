//! JavaScript engine, process and container variants
//!
//! Argument shaping is identical for both backends: an optional V8 heap
//! ceiling flag, then the script path, then the user's arguments unchanged.
//! The variants differ only in how the interpreter and script path are
//! resolved: against the host filesystem for the process backend, against
//! the in-container filesystem for the container backend.

use std::path::Path;

use crate::config::{EffectiveOptions, EnvironmentConfig};
use crate::engines::{container_script_path, CommandSpec, PreparedCommand};
use crate::errors::Result;
use crate::toolchain::ToolchainResolver;

const DEFAULT_INTERPRETER: &str = "node";

/// Interpreter for the process backend: explicit override, then a PATH
/// lookup, then the bare default so a missing interpreter fails at spawn
/// with the real error.
fn host_interpreter(config: &EnvironmentConfig, toolchain: &ToolchainResolver) -> String {
    match &config.languages.node_path {
        Some(path) => path.to_string_lossy().into_owned(),
        None => toolchain.resolve_or_bare(DEFAULT_INTERPRETER),
    }
}

/// Interpreter for the container backend: the override is taken verbatim as
/// an in-container path, no host lookup.
fn container_interpreter(config: &EnvironmentConfig) -> String {
    match &config.languages.node_path {
        Some(path) => path.to_string_lossy().into_owned(),
        None => DEFAULT_INTERPRETER.to_string(),
    }
}

/// Heap flag plus script plus user args, in that order.
pub(crate) fn shape_args(
    memory_limit_mb: Option<u64>,
    script: &str,
    args: &[String],
) -> Vec<String> {
    let mut shaped = Vec::with_capacity(args.len() + 2);
    if let Some(mb) = memory_limit_mb {
        shaped.push(format!("--max-old-space-size={}", mb));
    }
    shaped.push(script.to_string());
    shaped.extend(args.iter().cloned());
    shaped
}

pub(crate) fn prepare_process(
    workspace: &Path,
    config: &EnvironmentConfig,
    toolchain: &ToolchainResolver,
    script: &str,
    args: &[String],
    opts: &EffectiveOptions,
) -> Result<PreparedCommand> {
    Ok(PreparedCommand {
        invocation: CommandSpec::Explicit {
            program: host_interpreter(config, toolchain),
            args: shape_args(opts.memory_limit_mb, script, args),
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
    Ok(PreparedCommand {
        invocation: CommandSpec::Explicit {
            program: container_interpreter(config),
            args: shape_args(opts.memory_limit_mb, &script, args),
        },
        env: opts.env.clone(),
        workdir: workspace.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backend, Language};
    use std::collections::HashMap;
    use std::time::Duration;

    fn opts(memory_limit_mb: Option<u64>) -> EffectiveOptions {
        EffectiveOptions {
            timeout: Duration::from_secs(5),
            memory_limit_mb,
            process_limit: None,
            env: HashMap::new(),
            stdin: None,
        }
    }

    #[test]
    fn memory_ceiling_prepends_heap_flag() {
        let shaped = shape_args(Some(128), "main.js", &["--verbose".to_string()]);
        assert_eq!(shaped, vec!["--max-old-space-size=128", "main.js", "--verbose"]);
    }

    #[test]
    fn no_ceiling_means_no_flag() {
        let shaped = shape_args(None, "main.js", &[]);
        assert_eq!(shaped, vec!["main.js"]);
    }

    #[test]
    fn container_variant_rebases_script_and_skips_host_lookup() {
        let config = EnvironmentConfig::new(Language::Javascript, Backend::Container);
        let prepared = prepare_container(
            Path::new("/tmp/ws"),
            &config,
            "main.js",
            &[],
            &opts(Some(64)),
        )
        .unwrap();
        match prepared.invocation {
            CommandSpec::Explicit { program, args } => {
                assert_eq!(program, "node");
                assert_eq!(args, vec!["--max-old-space-size=64", "/workspace/main.js"]);
            }
            other => panic!("unexpected invocation: {:?}", other),
        }
    }

    #[test]
    fn explicit_interpreter_override_wins() {
        let mut config = EnvironmentConfig::new(Language::Javascript, Backend::Process);
        config.languages.node_path = Some("/opt/node/bin/node".into());
        let toolchain = ToolchainResolver::new();
        let prepared = prepare_process(
            Path::new("/tmp/ws"),
            &config,
            &toolchain,
            "main.js",
            &[],
            &opts(None),
        )
        .unwrap();
        match prepared.invocation {
            CommandSpec::Explicit { program, .. } => assert_eq!(program, "/opt/node/bin/node"),
            other => panic!("unexpected invocation: {:?}", other),
        }
    }
}
