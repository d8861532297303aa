//! A thin handle over the `git` CLI for the repository root the supervisor
//! was pointed at.
//!
//! Every method shells out through [`crate::process::run`] and bails with
//! the combined stderr/stdout on a non-zero exit, mirroring the teacher's
//! own single-entry-point command runner.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, bail};

use super::error::VcsError;
use super::worktree::Worktree;

#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
}

/// One line of `git status --porcelain` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub code: String,
    pub path: String,
}

impl Repository {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = self.run_output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let msg = [stderr.trim(), stdout.trim()].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("\n");
            bail!("git {}: {msg}", args.join(" "));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_output(&self, args: &[&str]) -> anyhow::Result<std::process::Output> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.root);
        let ctx = self.root.file_name().and_then(|n| n.to_str()).unwrap_or(".");
        crate::process::run(&mut cmd, Some(ctx)).with_context(|| format!("failed to execute: git {}", args.join(" ")))
    }

    pub fn current_branch(&self) -> anyhow::Result<Option<String>> {
        let out = self.run(&["branch", "--show-current"])?;
        let branch = out.trim();
        Ok(if branch.is_empty() { None } else { Some(branch.to_string()) })
    }

    pub fn is_dirty(&self) -> anyhow::Result<bool> {
        Ok(!self.run(&["status", "--porcelain"])?.trim().is_empty())
    }

    pub fn status_porcelain(&self) -> anyhow::Result<Vec<StatusEntry>> {
        let out = self.run(&["status", "--porcelain"])?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                if line.len() < 4 {
                    return None;
                }
                Some(StatusEntry { code: line[..2].to_string(), path: line[3..].to_string() })
            })
            .collect())
    }

    pub fn fetch(&self, remote: &str) -> anyhow::Result<()> {
        self.run(&["fetch", remote]).map(|_| ())
    }

    pub fn hard_reset_to(&self, reference: &str) -> anyhow::Result<()> {
        self.run(&["reset", "--hard", reference]).map(|_| ())
    }

    pub fn add_all(&self) -> anyhow::Result<()> {
        self.run(&["add", "-A"]).map(|_| ())
    }

    pub fn commit(&self, message: &str) -> anyhow::Result<()> {
        self.run(&["commit", "-m", message]).map(|_| ())
    }

    pub fn push(&self, remote: &str, branch: &str) -> anyhow::Result<()> {
        self.run(&["push", "-u", remote, branch]).map(|_| ())
    }

    pub fn branch_exists(&self, branch: &str) -> anyhow::Result<bool> {
        let mut cmd = Command::new("git");
        cmd.args(["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")]).current_dir(&self.root);
        let output = crate::process::run(&mut cmd, None)?;
        Ok(output.status.success())
    }

    pub fn remote_branch_exists(&self, remote: &str, branch: &str) -> anyhow::Result<bool> {
        let out = self.run(&["ls-remote", "--heads", remote, branch])?;
        Ok(!out.trim().is_empty())
    }

    pub fn list_worktrees(&self) -> anyhow::Result<Vec<Worktree>> {
        let out = self.run(&["worktree", "list", "--porcelain"])?;
        Worktree::parse_porcelain_list(&out).map_err(anyhow::Error::from)
    }

    pub fn worktree_for_branch(&self, branch: &str) -> anyhow::Result<Option<Worktree>> {
        Ok(self.list_worktrees()?.into_iter().find(|wt| wt.branch.as_deref() == Some(branch)))
    }

    /// Create a worktree at `path` on `branch`, creating the branch from
    /// `base` if it does not already exist.
    pub fn add_worktree(&self, path: &Path, branch: &str, base: Option<&str>) -> anyhow::Result<()> {
        if path.exists() {
            return Err(VcsError::WorktreePathExists { path: path.to_path_buf() }.into());
        }
        let path_str = path.to_string_lossy().into_owned();
        if self.branch_exists(branch)? {
            self.run(&["worktree", "add", &path_str, branch])?;
        } else {
            let base = base.unwrap_or("HEAD");
            self.run(&["worktree", "add", "-b", branch, &path_str, base])?;
        }
        Ok(())
    }

    pub fn remove_worktree(&self, path: &Path, force: bool) -> anyhow::Result<()> {
        let path_str = path.to_string_lossy().into_owned();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        self.run(&args).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        StdCommand::new("git").args(["init", "-q"]).current_dir(dir.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.email", "a@b.c"]).current_dir(dir.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.name", "test"]).current_dir(dir.path()).output().unwrap();
        std::fs::write(dir.path().join("README.md"), "hi\n").unwrap();
        StdCommand::new("git").args(["add", "-A"]).current_dir(dir.path()).output().unwrap();
        StdCommand::new("git").args(["commit", "-q", "-m", "init"]).current_dir(dir.path()).output().unwrap();
        dir
    }

    #[test]
    fn current_branch_and_dirty_state() {
        let dir = init_repo();
        let repo = Repository::at(dir.path());
        assert!(repo.current_branch().unwrap().is_some());
        assert!(!repo.is_dirty().unwrap());
        std::fs::write(dir.path().join("new.txt"), "x").unwrap();
        assert!(repo.is_dirty().unwrap());
    }

    #[test]
    fn add_worktree_creates_branch() {
        let dir = init_repo();
        let repo = Repository::at(dir.path());
        let wt_path = dir.path().join(".worktrees").join("T001_demo");
        repo.add_worktree(&wt_path, "T001_demo", None).unwrap();
        assert!(wt_path.join("README.md").exists());
        let found = repo.worktree_for_branch("T001_demo").unwrap();
        assert!(found.is_some());
    }
}
