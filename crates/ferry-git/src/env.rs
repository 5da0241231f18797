//! Sanitized environment for spawned git processes.
//!
//! Git children never inherit the full parent environment. Only a whitelist
//! passes through (`HOME`, `PATH`, `GIT_*`, `SSH_*`, locale), plus any
//! explicit overrides a caller registers — e.g. a pinned `HOME` for hermetic
//! tests, or `GIT_CONFIG_*` keys pointing at a credentials store.

use std::collections::BTreeMap;
use std::process::Command;

/// Environment policy applied to every spawned git process.
#[derive(Clone, Debug, Default)]
pub struct GitEnv {
    overrides: BTreeMap<String, String>,
}

impl GitEnv {
    /// Environment with no overrides: the whitelist alone passes through.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an explicit variable, overriding any inherited value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Builder-style variant of [`GitEnv::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Clear the child environment and apply whitelist plus overrides.
    pub(crate) fn apply(&self, cmd: &mut Command) {
        cmd.env_clear();
        for (key, value) in std::env::vars() {
            if passes_whitelist(&key) {
                cmd.env(key, value);
            }
        }
        for (key, value) in &self.overrides {
            cmd.env(key, value);
        }
    }
}

fn passes_whitelist(key: &str) -> bool {
    matches!(key, "HOME" | "PATH" | "TMPDIR" | "USER" | "LANG")
        || key.starts_with("GIT_")
        || key.starts_with("SSH_")
        || key.starts_with("LC_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_admits_git_and_ssh_vars() {
        assert!(passes_whitelist("GIT_AUTHOR_NAME"));
        assert!(passes_whitelist("SSH_AUTH_SOCK"));
        assert!(passes_whitelist("HOME"));
        assert!(passes_whitelist("LC_ALL"));
    }

    #[test]
    fn whitelist_rejects_unrelated_vars() {
        assert!(!passes_whitelist("AWS_SECRET_ACCESS_KEY"));
        assert!(!passes_whitelist("DISPLAY"));
        assert!(!passes_whitelist("CARGO_HOME"));
    }

    #[test]
    fn overrides_accumulate() {
        let env = GitEnv::new()
            .with("GIT_AUTHOR_NAME", "Ferry")
            .with("GIT_AUTHOR_EMAIL", "ferry@example.com");
        assert_eq!(env.overrides.len(), 2);
    }
}
