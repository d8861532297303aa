//! Ambient supervisor configuration: default CLI flag values, loaded from
//! an optional TOML file. Independent of the [`super::project::ProjectContract`]
//! the repository itself declares — this file is personal/host-local and
//! is never checked into the repository being supervised.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

const ENV_OVERRIDE: &str = "SWARM_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SupervisorConfig {
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_worktree_parent")]
    pub worktree_parent: String,
    #[serde(default)]
    pub worker_command: Option<String>,
    #[serde(default)]
    pub planner_command: Option<String>,
    #[serde(default = "default_sandbox_level")]
    pub sandbox_level: String,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_remote() -> String {
    "origin".to_string()
}
fn default_base_branch() -> String {
    "main".to_string()
}
fn default_worktree_parent() -> String {
    ".worktrees".to_string()
}
fn default_sandbox_level() -> String {
    "workspace-write".to_string()
}
fn default_interval_seconds() -> u64 {
    60
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            base_branch: default_base_branch(),
            worktree_parent: default_worktree_parent(),
            worker_command: None,
            planner_command: None,
            sandbox_level: default_sandbox_level(),
            interval_seconds: default_interval_seconds(),
        }
    }
}

fn resolve_config_path(env_override: Option<String>) -> Option<PathBuf> {
    if let Some(path) = env_override {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("swarm-supervisor").join("config.toml"))
}

/// Resolve the config file path: `SWARM_CONFIG_PATH` if set, otherwise
/// `~/.config/swarm-supervisor/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    resolve_config_path(std::env::var(ENV_OVERRIDE).ok())
}

impl SupervisorConfig {
    fn load_from(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Toml { path, source })
    }

    /// Load from disk, falling back to defaults when no config file exists.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = SupervisorConfig::default();
        assert_eq!(config.remote, "origin");
        assert_eq!(config.base_branch, "main");
        assert_eq!(config.interval_seconds, 60);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig::load_from(Some(dir.path().join("missing.toml"))).unwrap();
        assert_eq!(config.remote, "origin");
    }

    #[test]
    fn load_parses_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "remote = \"upstream\"\ninterval-seconds = 30\n").unwrap();
        let config = SupervisorConfig::load_from(Some(path)).unwrap();
        assert_eq!(config.remote, "upstream");
        assert_eq!(config.interval_seconds, 30);
        assert_eq!(config.base_branch, "main");
    }

    #[test]
    fn resolve_config_path_prefers_env_override() {
        let resolved = resolve_config_path(Some("/tmp/custom/config.toml".to_string()));
        assert_eq!(resolved, Some(PathBuf::from("/tmp/custom/config.toml")));
    }
}
