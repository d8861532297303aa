//! The claimed task-id set: a strict union of three sources, so that a
//! supervisor that cannot see one source (no `gh`, or a remote that
//! doesn't expose the expected branch glob) never under-reports what's
//! claimed.

use std::collections::HashSet;
use std::process::Command;

use regex::Regex;

use super::pr::PrProvider;
use super::repository::Repository;

fn task_id_prefix(branch: &str) -> Option<String> {
    static RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| Regex::new(r"^T\d{3}").unwrap());
    RE.find(branch).map(|m| m.as_str().to_string())
}

/// (a) task ids parsed from local worktree branches.
fn from_local_worktrees(repo: &Repository) -> anyhow::Result<HashSet<String>> {
    Ok(repo.list_worktrees()?.into_iter().filter_map(|wt| wt.branch).filter_map(|b| task_id_prefix(&b)).collect())
}

/// (b) task ids parsed from open PR head-branches against the base.
fn from_open_prs(repo_dir: &std::path::Path, base_branch: &str, pr_provider: Option<&dyn PrProvider>) -> HashSet<String> {
    let Some(provider) = pr_provider else { return HashSet::new() };
    match provider.list_open_prs_on_base(repo_dir, base_branch) {
        Ok(prs) => prs.into_iter().filter_map(|pr| task_id_prefix(&pr.head_branch)).collect(),
        Err(e) => {
            log::warn!("could not list open PRs for claimed-set computation: {e}");
            HashSet::new()
        }
    }
}

/// (c) task ids parsed from remote branches matching `T[0-9][0-9][0-9]_*`.
fn from_remote_branches(repo: &Repository, remote: &str) -> HashSet<String> {
    let mut cmd = Command::new("git");
    cmd.args(["ls-remote", "--heads", remote, "T[0-9][0-9][0-9]_*"]).current_dir(repo.root());
    let Ok(output) = crate::process::run(&mut cmd, Some("claimed-set")) else { return HashSet::new() };
    if !output.status.success() {
        return HashSet::new();
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .filter_map(|ref_name| ref_name.strip_prefix("refs/heads/"))
        .filter_map(task_id_prefix)
        .collect()
}

/// Strict union of all three sources per spec: a task is considered
/// claimed if *any* source reports it, regardless of whether the others
/// are reachable.
pub fn claimed_task_ids(repo: &Repository, remote: &str, base_branch: &str, pr_provider: Option<&dyn PrProvider>) -> HashSet<String> {
    let mut ids = from_local_worktrees(repo).unwrap_or_default();
    ids.extend(from_open_prs(repo.root(), base_branch, pr_provider));
    ids.extend(from_remote_branches(repo, remote));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_anchored_task_id_prefix() {
        assert_eq!(task_id_prefix("T001_add_ingest"), Some("T001".to_string()));
        assert_eq!(task_id_prefix("feature/T002_x"), None);
        assert_eq!(task_id_prefix("main"), None);
    }

    struct FakePrProvider(Vec<super::super::pr::OpenPr>);
    impl PrProvider for FakePrProvider {
        fn create_pr_if_missing(&self, _: &std::path::Path, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        fn enable_auto_merge(&self, _: &std::path::Path, _: bool) -> anyhow::Result<()> {
            Ok(())
        }
        fn list_open_prs_on_base(&self, _: &std::path::Path, _: &str) -> anyhow::Result<Vec<super::super::pr::OpenPr>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn union_includes_pr_only_claims() {
        let dir = tempfile::tempdir().unwrap();
        Command::new("git").args(["init", "-q"]).current_dir(dir.path()).output().unwrap();
        let repo = Repository::at(dir.path());

        let provider = FakePrProvider(vec![super::super::pr::OpenPr {
            number: 1,
            head_branch: "T005_from_pr".to_string(),
            mergeable: true,
            checks: super::super::pr::ChecksRollup::Passing,
            updated_at: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc),
        }]);

        let ids = claimed_task_ids(&repo, "origin", "main", Some(&provider));
        assert!(ids.contains("T005"));
    }
}
