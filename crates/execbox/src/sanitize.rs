//! Host environment sanitization boundary
//!
//! Only an explicit allowlist of host variables is ever forwarded into a
//! spawned process or container. Everything else from the host process
//! environment stays behind the boundary; callers add what they need
//! through the environment defaults or per-call overrides.

use std::collections::HashMap;
use std::env;

/// Host variables forwarded into workloads: path, home, user identity,
/// locale, and temp-directory settings.
pub const HOST_ALLOWLIST: &[&str] = &[
    "PATH", "HOME", "USER", "LOGNAME", "LANG", "LC_ALL", "TMPDIR", "TEMP", "TMP",
];

/// Snapshot the allowlisted subset of the current host environment.
pub fn base_env() -> HashMap<String, String> {
    let mut out = HashMap::new();
    for key in HOST_ALLOWLIST {
        if let Ok(value) = env::var(key) {
            out.insert((*key).to_string(), value);
        }
    }
    out
}

/// Build the fully resolved variable map for one execute call: sanitized
/// host base, then environment defaults, then call overrides. Later layers
/// win on key collisions.
pub fn resolve_env(
    defaults: &HashMap<String, String>,
    overrides: Option<&HashMap<String, String>>,
) -> HashMap<String, String> {
    let mut out = base_env();
    for (k, v) in defaults {
        out.insert(k.clone(), v.clone());
    }
    if let Some(overrides) = overrides {
        for (k, v) in overrides {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}
