//! Two independent configuration surfaces:
//!
//! - [`supervisor`]: ambient, host-local TOML defaults for CLI flags.
//! - [`project`]: the repository's own Project Contract, declaring `mode`.
//!
//! They are never merged — one configures "how the supervisor behaves
//! here", the other "what this repository's gates check."

mod error;
mod project;
mod supervisor;

pub use error::ConfigError;
pub use project::{Mode, ProjectContract, parse_top_level_keys};
pub use supervisor::{SupervisorConfig, config_path};

/// Env var that must be set to `1` before unattended mode is allowed to
/// run, since it authorizes the Worker subprocess to bypass its own
/// approval prompts.
pub const UNATTENDED_INTERLOCK_VAR: &str = "SWARM_UNATTENDED_I_UNDERSTAND";

fn check_interlock_value(value: Option<&str>) -> Result<(), ConfigError> {
    match value {
        Some("1") => Ok(()),
        _ => Err(ConfigError::MissingInterlock { var: UNATTENDED_INTERLOCK_VAR }),
    }
}

pub fn check_unattended_interlock() -> Result<(), ConfigError> {
    check_interlock_value(std::env::var(UNATTENDED_INTERLOCK_VAR).ok().as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interlock_rejects_when_unset() {
        assert!(check_interlock_value(None).is_err());
    }

    #[test]
    fn interlock_rejects_wrong_value() {
        assert!(check_interlock_value(Some("true")).is_err());
    }

    #[test]
    fn interlock_accepts_exact_value() {
        assert!(check_interlock_value(Some("1")).is_ok());
    }
}
