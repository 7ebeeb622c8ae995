//! TypeScript engine: host-side compile, then the JavaScript engine
//!
//! Two stages. Stage one always runs on the host, even when the run target
//! is a container: the workspace is compiled with `tsc`, synthesizing a
//! minimal `tsconfig.json` when the workspace has none. A non-zero compiler
//! exit becomes a compilation error carrying the compiler's captured
//! output, and execution is never attempted. Stage two computes the emitted
//! script path and delegates to the JavaScript engine of the requested
//! backend.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::process::Command;

use crate::config::{Backend, EffectiveOptions, EnvironmentConfig};
use crate::engines::{javascript, PreparedCommand};
use crate::errors::{ExecboxError, Result};
use crate::toolchain::ToolchainResolver;

const DEFAULT_COMPILER: &str = "tsc";
const TSCONFIG: &str = "tsconfig.json";

/// Output subdirectory used by the synthesized compiler configuration.
pub(crate) const DEFAULT_OUT_DIR: &str = ".execbox-out";

pub(crate) async fn prepare(
    workspace: &Path,
    config: &EnvironmentConfig,
    toolchain: &ToolchainResolver,
    source: &str,
    args: &[String],
    opts: &EffectiveOptions,
    backend: Backend,
) -> Result<PreparedCommand> {
    let out_dir = ensure_compiler_config(workspace).await?;
    compile(workspace, config, toolchain, opts).await?;
    let emitted = emitted_path(source, &out_dir);
    match backend {
        Backend::Process => {
            javascript::prepare_process(workspace, config, toolchain, &emitted, args, opts)
        }
        Backend::Container => {
            javascript::prepare_container(workspace, config, &emitted, args, opts)
        }
    }
}

/// Make sure a compiler configuration exists and report its output
/// directory. A user-supplied `tsconfig.json` wins; otherwise a minimal
/// default is written with a dedicated output subdirectory.
async fn ensure_compiler_config(workspace: &Path) -> Result<String> {
    let path = workspace.join(TSCONFIG);
    match tokio::fs::read_to_string(&path).await {
        Ok(existing) => Ok(read_out_dir(&existing)),
        Err(_) => {
            let default = json!({
                "compilerOptions": {
                    "target": "ES2020",
                    "module": "commonjs",
                    "outDir": DEFAULT_OUT_DIR,
                    "rootDir": ".",
                    "esModuleInterop": true,
                    "skipLibCheck": true,
                    // A failed compile must leave nothing runnable behind.
                    "noEmitOnError": true,
                }
            });
            let body = serde_json::to_string_pretty(&default)
                .map_err(|e| ExecboxError::Configuration(format!("tsconfig synthesis failed: {}", e)))?;
            tokio::fs::write(&path, body).await.map_err(|e| {
                ExecboxError::runtime("tsc -p .", format!("failed to write {}: {}", TSCONFIG, e))
            })?;
            Ok(DEFAULT_OUT_DIR.to_string())
        }
    }
}

/// `compilerOptions.outDir` from an existing config, defaulting to the
/// project root when absent or unreadable.
fn read_out_dir(tsconfig: &str) -> String {
    serde_json::from_str::<Value>(tsconfig)
        .ok()
        .and_then(|v| {
            v.get("compilerOptions")?
                .get("outDir")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| ".".to_string())
}

async fn compile(
    workspace: &Path,
    config: &EnvironmentConfig,
    toolchain: &ToolchainResolver,
    opts: &EffectiveOptions,
) -> Result<()> {
    let compiler = match &config.languages.tsc_path {
        Some(path) => path.to_string_lossy().into_owned(),
        None => toolchain.resolve_or_bare(DEFAULT_COMPILER),
    };
    let command_line = format!("{} -p .", compiler);

    let mut cmd = Command::new(&compiler);
    cmd.arg("-p")
        .arg(".")
        .current_dir(workspace)
        .env_clear()
        .envs(&opts.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let output = match tokio::time::timeout(opts.timeout, cmd.output()).await {
        Ok(result) => result.map_err(|e| {
            ExecboxError::runtime(&command_line, format!("failed to run compiler: {}", e))
        })?,
        // Dropping the output future kills the wedged compiler.
        Err(_) => {
            return Err(ExecboxError::Timeout {
                configured: opts.timeout,
                elapsed: started.elapsed(),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    };

    if !output.status.success() {
        return Err(ExecboxError::Compilation {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    log::debug!("compiled workspace {} in {:?}", workspace.display(), started.elapsed());
    Ok(())
}

/// Map a source path to its emitted location: relocated under the output
/// directory with the `.ts` suffix replaced.
pub(crate) fn emitted_path(source: &str, out_dir: &str) -> String {
    let source = source.trim_start_matches("./");
    let stem = source.strip_suffix(".ts").unwrap_or(source);
    let out_dir = out_dir.trim_start_matches("./").trim_end_matches('/');
    if out_dir.is_empty() || out_dir == "." {
        format!("{}.js", stem)
    } else {
        format!("{}/{}.js", out_dir, stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitted_path_relocates_under_out_dir() {
        assert_eq!(emitted_path("main.ts", DEFAULT_OUT_DIR), ".execbox-out/main.js");
        assert_eq!(emitted_path("src/app.ts", DEFAULT_OUT_DIR), ".execbox-out/src/app.js");
    }

    #[test]
    fn emitted_path_handles_root_out_dir() {
        assert_eq!(emitted_path("main.ts", "."), "main.js");
        assert_eq!(emitted_path("./main.ts", ""), "main.js");
    }

    #[test]
    fn read_out_dir_prefers_user_config() {
        let tsconfig = r#"{"compilerOptions": {"outDir": "build"}}"#;
        assert_eq!(read_out_dir(tsconfig), "build");
    }

    #[test]
    fn read_out_dir_defaults_to_root() {
        assert_eq!(read_out_dir(r#"{"compilerOptions": {}}"#), ".");
        assert_eq!(read_out_dir("not json at all"), ".");
    }

    #[tokio::test]
    async fn synthesized_config_points_at_dedicated_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = ensure_compiler_config(dir.path()).await.unwrap();
        assert_eq!(out_dir, DEFAULT_OUT_DIR);

        let written = tokio::fs::read_to_string(dir.path().join(TSCONFIG)).await.unwrap();
        let value: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["compilerOptions"]["outDir"], DEFAULT_OUT_DIR);
        assert_eq!(value["compilerOptions"]["rootDir"], ".");
    }

    #[tokio::test]
    async fn existing_config_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let custom = r#"{"compilerOptions": {"outDir": "dist"}}"#;
        tokio::fs::write(dir.path().join(TSCONFIG), custom).await.unwrap();

        let out_dir = ensure_compiler_config(dir.path()).await.unwrap();
        assert_eq!(out_dir, "dist");
        let on_disk = tokio::fs::read_to_string(dir.path().join(TSCONFIG)).await.unwrap();
        assert_eq!(on_disk, custom);
    }
}
