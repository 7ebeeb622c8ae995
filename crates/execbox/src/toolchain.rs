//! Host toolchain resolution
//!
//! Interpreter and compiler lookups go through a per-environment resolver
//! that caches the result of each `PATH` search. The cache is explicit
//! state owned by the environment, with a single invalidation rule: anyone
//! who installs or removes a PATH-visible tool mid-session calls
//! [`ToolchainResolver::invalidate`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use which::which;

#[derive(Debug, Default)]
pub struct ToolchainResolver {
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl ToolchainResolver {
    pub fn new() -> Self {
        ToolchainResolver::default()
    }

    /// Resolve a tool name to an absolute path, caching both hits and
    /// misses. Returns `None` when the tool is not on `PATH`; callers fall
    /// back to the bare name so the spawn failure carries the real error.
    pub fn resolve(&self, tool: &str) -> Option<PathBuf> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(tool.to_string())
            .or_insert_with(|| {
                let found = which(tool).ok();
                match &found {
                    Some(path) => log::debug!("resolved '{}' to {}", tool, path.display()),
                    None => log::debug!("tool '{}' not found on PATH", tool),
                }
                found
            })
            .clone()
    }

    /// Resolve to a display string, falling back to the bare name when the
    /// tool is absent from `PATH`.
    pub fn resolve_or_bare(&self, tool: &str) -> String {
        self.resolve(tool)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| tool.to_string())
    }

    /// Drop every cached lookup.
    pub fn invalidate(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_misses() {
        let resolver = ToolchainResolver::new();
        assert!(resolver.resolve("execbox-no-such-tool").is_none());
        // Second call hits the cache; same answer either way.
        assert!(resolver.resolve("execbox-no-such-tool").is_none());
    }

    #[test]
    fn bare_fallback_returns_the_name() {
        let resolver = ToolchainResolver::new();
        assert_eq!(
            resolver.resolve_or_bare("execbox-no-such-tool"),
            "execbox-no-such-tool"
        );
    }

    #[test]
    fn invalidate_clears_the_cache() {
        let resolver = ToolchainResolver::new();
        resolver.resolve("execbox-no-such-tool");
        resolver.invalidate();
        assert!(resolver.cache.lock().unwrap().is_empty());
    }
}
