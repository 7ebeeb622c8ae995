//! Per-(language, backend) command preparation
//!
//! An engine turns a (command, args, options) request into a fully resolved
//! [`PreparedCommand`], performing host-side compilation when the language
//! requires it. The set of engines is closed: one variant per supported
//! (language, backend) pair, selected by the pure [`Engine::select`]
//! function. Engines borrow the workspace for the duration of one prepare
//! call and never delete anything from it.

pub mod javascript;
pub mod python;
pub mod typescript;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::{Backend, EffectiveOptions, EnvironmentConfig, Language};
use crate::errors::{ExecboxError, Result};
use crate::toolchain::ToolchainResolver;

/// What to run. Container runs without an explicit command fall back to the
/// image's built-in entrypoint; both cases are spelled out so every
/// consumer handles both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// Run `program` with `args`.
    Explicit { program: String, args: Vec<String> },
    /// Let the image's default entrypoint run, optionally with `args`.
    /// Only meaningful on the container backend.
    ImageDefault { args: Vec<String> },
}

impl CommandSpec {
    /// Human-readable command line for error context.
    pub fn display_line(&self) -> String {
        match self {
            CommandSpec::Explicit { program, args } => {
                let mut line = program.clone();
                for arg in args {
                    line.push(' ');
                    line.push_str(arg);
                }
                line
            }
            CommandSpec::ImageDefault { args } => {
                let mut line = "<image entrypoint>".to_string();
                for arg in args {
                    line.push(' ');
                    line.push_str(arg);
                }
                line
            }
        }
    }
}

/// A fully resolved command: what to run, with which variables, and where.
/// Produced once per execute call by exactly one engine, consumed once by
/// exactly one executor.
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    pub invocation: CommandSpec,
    pub env: HashMap<String, String>,
    /// Host workspace directory; the process backend runs there, the
    /// container backend bind-mounts it.
    pub workdir: PathBuf,
}

/// Closed set of engines over {JavaScript, TypeScript, Python} x
/// {Process, Container}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    JavascriptProcess,
    JavascriptContainer,
    TypescriptProcess,
    TypescriptContainer,
    PythonProcess,
    PythonContainer,
}

impl Engine {
    /// Pure selection function over the supported pairs.
    pub fn select(language: Language, backend: Backend) -> Engine {
        match (language, backend) {
            (Language::Javascript, Backend::Process) => Engine::JavascriptProcess,
            (Language::Javascript, Backend::Container) => Engine::JavascriptContainer,
            (Language::Typescript, Backend::Process) => Engine::TypescriptProcess,
            (Language::Typescript, Backend::Container) => Engine::TypescriptContainer,
            (Language::Python, Backend::Process) => Engine::PythonProcess,
            (Language::Python, Backend::Container) => Engine::PythonContainer,
        }
    }

    /// Turn the request into a [`PreparedCommand`]. A compile failure is
    /// reported as [`ExecboxError::Compilation`] and guarantees that no
    /// executor is ever invoked for this call.
    pub async fn prepare(
        &self,
        workspace: &Path,
        config: &EnvironmentConfig,
        toolchain: &ToolchainResolver,
        command: Option<&str>,
        args: &[String],
        opts: &EffectiveOptions,
    ) -> Result<PreparedCommand> {
        match self {
            Engine::JavascriptProcess => {
                let script = require_command(command)?;
                javascript::prepare_process(workspace, config, toolchain, script, args, opts)
            }
            Engine::JavascriptContainer => match command {
                Some(script) => javascript::prepare_container(workspace, config, script, args, opts),
                None => Ok(image_default(workspace, args, opts)),
            },
            Engine::TypescriptProcess => {
                let script = require_command(command)?;
                typescript::prepare(workspace, config, toolchain, script, args, opts, Backend::Process).await
            }
            Engine::TypescriptContainer => match command {
                Some(script) => {
                    typescript::prepare(workspace, config, toolchain, script, args, opts, Backend::Container).await
                }
                None => Ok(image_default(workspace, args, opts)),
            },
            Engine::PythonProcess => {
                let script = require_command(command)?;
                python::prepare_process(workspace, config, toolchain, script, args, opts).await
            }
            Engine::PythonContainer => match command {
                Some(script) => python::prepare_container(workspace, config, script, args, opts),
                None => Ok(image_default(workspace, args, opts)),
            },
        }
    }
}

fn require_command(command: Option<&str>) -> Result<&str> {
    command.ok_or_else(|| {
        ExecboxError::Configuration("a command is required for the process backend".to_string())
    })
}

fn image_default(workspace: &Path, args: &[String], opts: &EffectiveOptions) -> PreparedCommand {
    PreparedCommand {
        invocation: CommandSpec::ImageDefault { args: args.to_vec() },
        env: opts.env.clone(),
        workdir: workspace.to_path_buf(),
    }
}

/// Rebase a workspace-relative script path onto the fixed in-container
/// mount path.
pub(crate) fn container_script_path(script: &str) -> String {
    format!(
        "{}/{}",
        crate::executors::container::WORKSPACE_MOUNT,
        script.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_total_over_the_matrix() {
        let languages = [Language::Javascript, Language::Typescript, Language::Python];
        let backends = [Backend::Process, Backend::Container];
        let mut seen = Vec::new();
        for language in languages {
            for backend in backends {
                seen.push(Engine::select(language, backend));
            }
        }
        seen.dedup();
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn container_script_paths_are_rebased() {
        assert_eq!(container_script_path("main.js"), "/workspace/main.js");
        assert_eq!(container_script_path("src/app.js"), "/workspace/src/app.js");
    }

    #[test]
    fn display_line_covers_both_cases() {
        let explicit = CommandSpec::Explicit {
            program: "node".to_string(),
            args: vec!["main.js".to_string()],
        };
        assert_eq!(explicit.display_line(), "node main.js");

        let fallback = CommandSpec::ImageDefault {
            args: vec!["--version".to_string()],
        };
        assert_eq!(fallback.display_line(), "<image entrypoint> --version");
    }
}
