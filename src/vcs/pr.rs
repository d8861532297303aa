//! Pull request provider abstraction and its `gh`-CLI-backed implementation.
//!
//! The scheduler's repair pass and the Task Runner's PR step both go
//! through [`PrProvider`] rather than shelling out to `gh` directly, so a
//! future hosting backend only needs a new impl.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Merge status the repair pass uses to decide whether a PR needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksRollup {
    Pending,
    Passing,
    Failing,
}

#[derive(Debug, Clone)]
pub struct OpenPr {
    pub number: u64,
    pub head_branch: String,
    pub mergeable: bool,
    pub checks: ChecksRollup,
    pub updated_at: DateTime<Utc>,
}

pub trait PrProvider {
    /// Create a PR for the current branch against `base`, unless one is
    /// already open for that head branch.
    fn create_pr_if_missing(&self, repo_dir: &Path, base_branch: &str, title: &str, body: &str) -> Result<()>;

    /// Request auto-merge for the current branch's PR. Best-effort: a
    /// failure here (missing permissions, branch protection) is logged by
    /// the caller but does not fail the run.
    fn enable_auto_merge(&self, repo_dir: &Path, squash: bool) -> Result<()>;

    /// List open PRs targeting `base_branch`, for the repair pass.
    fn list_open_prs_on_base(&self, repo_dir: &Path, base_branch: &str) -> Result<Vec<OpenPr>>;
}

pub struct GhPrProvider;

impl GhPrProvider {
    pub fn new() -> Self {
        Self
    }

    fn run(repo_dir: &Path, args: &[&str]) -> Result<std::process::Output> {
        let mut cmd = Command::new("gh");
        cmd.args(args).current_dir(repo_dir);
        crate::process::run(&mut cmd, Some("gh")).with_context(|| format!("failed to execute: gh {}", args.join(" ")))
    }

    fn current_branch(repo_dir: &Path) -> Result<String> {
        crate::vcs::Repository::at(repo_dir)
            .current_branch()?
            .context("repository is in detached HEAD state; cannot operate on a PR")
    }
}

impl Default for GhPrProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct PrListItem {
    number: u64,
}

impl PrProvider for GhPrProvider {
    fn create_pr_if_missing(&self, repo_dir: &Path, base_branch: &str, title: &str, body: &str) -> Result<()> {
        let branch = Self::current_branch(repo_dir)?;

        let list_out = Self::run(repo_dir, &["pr", "list", "--state", "open", "--head", &branch, "--json", "number"])?;
        if list_out.status.success() {
            let items: Vec<PrListItem> = serde_json::from_slice(&list_out.stdout).unwrap_or_default();
            if !items.is_empty() {
                log::debug!("PR already open for branch {branch}, skipping create");
                return Ok(());
            }
        }

        let out = Self::run(repo_dir, &["pr", "create", "--base", base_branch, "--title", title, "--body", body])?;
        if !out.status.success() {
            anyhow::bail!("gh pr create failed: {}", String::from_utf8_lossy(&out.stderr).trim());
        }
        Ok(())
    }

    fn enable_auto_merge(&self, repo_dir: &Path, squash: bool) -> Result<()> {
        let branch = Self::current_branch(repo_dir)?;
        let merge_flag = if squash { "--squash" } else { "--merge" };
        let out = Self::run(repo_dir, &["pr", "merge", "--auto", merge_flag, "--delete-branch", &branch]);
        match out {
            Ok(output) if !output.status.success() => {
                log::warn!("gh pr merge --auto failed, leaving PR open: {}", String::from_utf8_lossy(&output.stderr).trim());
            }
            Err(e) => log::warn!("gh pr merge --auto failed to run, leaving PR open: {e}"),
            Ok(_) => {}
        }
        Ok(())
    }

    fn list_open_prs_on_base(&self, repo_dir: &Path, base_branch: &str) -> Result<Vec<OpenPr>> {
        #[derive(Deserialize)]
        struct RawCheck {
            #[serde(default)]
            conclusion: Option<String>,
            #[serde(default)]
            status: String,
        }
        #[derive(Deserialize)]
        struct RawPr {
            number: u64,
            #[serde(rename = "headRefName")]
            head_branch: String,
            mergeable: String,
            #[serde(rename = "statusCheckRollup", default)]
            status_check_rollup: Vec<RawCheck>,
            #[serde(rename = "updatedAt")]
            updated_at: DateTime<Utc>,
        }

        let out = Self::run(
            repo_dir,
            &[
                "pr",
                "list",
                "--state",
                "open",
                "--base",
                base_branch,
                "--json",
                "number,headRefName,mergeable,statusCheckRollup,updatedAt",
            ],
        )?;
        if !out.status.success() {
            anyhow::bail!("gh pr list failed: {}", String::from_utf8_lossy(&out.stderr).trim());
        }
        let raw: Vec<RawPr> = serde_json::from_slice(&out.stdout).context("parsing gh pr list JSON")?;

        Ok(raw
            .into_iter()
            .map(|pr| {
                let checks = if pr.status_check_rollup.is_empty() {
                    ChecksRollup::Pending
                } else if pr.status_check_rollup.iter().any(|c| c.status != "COMPLETED") {
                    ChecksRollup::Pending
                } else if pr.status_check_rollup.iter().all(|c| c.conclusion.as_deref() == Some("SUCCESS")) {
                    ChecksRollup::Passing
                } else {
                    ChecksRollup::Failing
                };
                OpenPr { number: pr.number, head_branch: pr.head_branch, mergeable: pr.mergeable != "CONFLICTING", checks, updated_at: pr.updated_at }
            })
            .collect())
    }
}
