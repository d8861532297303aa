//! Process-window abstraction for the windowed runner mode: one external
//! terminal multiplexer window per dispatched task, so an operator can
//! attach and watch a specific Worker run.

use std::path::Path;
use std::process::Command;

pub trait ProcessWindow {
    /// Ensure the named session exists, creating it in `start_dir` if not.
    fn ensure_session(&self, session: &str, start_dir: &Path) -> anyhow::Result<()>;

    /// Spawn `command` in a new window of `session`, running in `workdir`.
    fn spawn_window(&self, session: &str, window_name: &str, workdir: &Path, command: &[String]) -> anyhow::Result<()>;

    fn attach(&self, session: &str) -> anyhow::Result<()>;
}

pub struct TmuxWindow;

impl TmuxWindow {
    fn run(args: &[&str]) -> anyhow::Result<std::process::Output> {
        if which::which("tmux").is_err() {
            anyhow::bail!("tmux not found on PATH (install tmux or use runner=local)");
        }
        let mut cmd = Command::new("tmux");
        cmd.args(args);
        crate::process::run(&mut cmd, Some("tmux")).map_err(anyhow::Error::from)
    }
}

impl ProcessWindow for TmuxWindow {
    fn ensure_session(&self, session: &str, start_dir: &Path) -> anyhow::Result<()> {
        let has_session = Self::run(&["has-session", "-t", session])?;
        if has_session.status.success() {
            return Ok(());
        }
        let start_dir_str = start_dir.to_string_lossy().into_owned();
        Self::run(&["new-session", "-d", "-s", session, "-c", &start_dir_str])?;
        Ok(())
    }

    fn spawn_window(&self, session: &str, window_name: &str, workdir: &Path, command: &[String]) -> anyhow::Result<()> {
        let workdir_str = workdir.to_string_lossy().into_owned();
        let cmd_str = shell_quote_join(command);
        let output = Self::run(&["new-window", "-t", session, "-n", window_name, "-c", &workdir_str, "bash", "-lc", &cmd_str])?;
        if !output.status.success() {
            anyhow::bail!("tmux new-window failed: {}", String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(())
    }

    fn attach(&self, session: &str) -> anyhow::Result<()> {
        Self::run(&["attach", "-t", session]).map(|_| ())
    }
}

/// Runner mode that executes tasks inline with no windowing, used for tests
/// and the `runner=local` CLI flag.
pub struct NoWindow;

impl ProcessWindow for NoWindow {
    fn ensure_session(&self, _session: &str, _start_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn spawn_window(&self, _session: &str, _window_name: &str, _workdir: &Path, _command: &[String]) -> anyhow::Result<()> {
        anyhow::bail!("NoWindow cannot spawn windows; use the inline runner path instead")
    }

    fn attach(&self, _session: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn shell_quote_join(parts: &[String]) -> String {
    parts.iter().map(|p| shell_quote(p)).collect::<Vec<_>>().join(" ")
}

fn shell_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || "-_./=:".contains(c)) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_passes_through_safe_tokens() {
        assert_eq!(shell_quote("swarm-runner"), "swarm-runner");
        assert_eq!(shell_quote("--task-id"), "--task-id");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
