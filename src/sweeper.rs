//! Reconciles the physical lifecycle-folder layout with each task's
//! declared `State`, using VCS-tracked moves so history follows the file.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::task_store;

#[derive(Debug, Clone)]
pub struct PlannedMove {
    pub task_id: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Problem {
    pub task_id: String,
    pub path: PathBuf,
    pub reason: String,
}

pub struct SweepReport {
    pub moves: Vec<PlannedMove>,
    pub problems: Vec<Problem>,
}

/// Scan every lifecycle folder and compute the moves/problems, without
/// mutating anything. Used by both the dry-run and live paths.
pub fn plan_sweep(control_plane_root: &Path) -> SweepReport {
    let (tasks, parse_errors) = task_store::list_tasks(control_plane_root);
    let mut moves = Vec::new();
    let mut problems: Vec<Problem> = parse_errors
        .iter()
        .map(|e| Problem { task_id: "?".to_string(), path: PathBuf::new(), reason: e.to_string() })
        .collect();

    for task in &tasks {
        let Some(declared_state) = task.state else {
            problems.push(Problem {
                task_id: task.task_id.clone(),
                path: task.path.clone(),
                reason: format!("unknown or malformed state `{}`", task.state_raw.clone().unwrap_or_default()),
            });
            continue;
        };

        let actual_folder = task.path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()).unwrap_or_default();
        let declared_folder = declared_state.folder_name();

        if actual_folder != declared_folder {
            if actual_folder == task_store::TaskState::Done.folder_name() {
                log::warn!("{}: hand-edited State reverts a done task to `{}`; honoring it (I4 only binds the Task Runner)", task.task_id, declared_state);
            }
            let file_name = task.path.file_name().expect("task path always has a filename");
            let to = control_plane_root.join(declared_folder).join(file_name);
            moves.push(PlannedMove { task_id: task.task_id.clone(), from: task.path.clone(), to });
        }
    }

    SweepReport { moves, problems }
}

/// Apply the moves computed by [`plan_sweep`] with `git mv`, returning the
/// git command failures (if any) as additional problems.
pub fn apply_sweep(repo_root: &Path, report: &SweepReport) -> Vec<Problem> {
    let mut failures = Vec::new();
    for mv in &report.moves {
        if let Some(parent) = mv.to.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let mut cmd = Command::new("git");
        cmd.args(["mv", &mv.from.to_string_lossy(), &mv.to.to_string_lossy()]).current_dir(repo_root);
        match crate::process::run(&mut cmd, Some(&mv.task_id)) {
            Ok(output) if output.status.success() => {}
            Ok(output) => failures.push(Problem {
                task_id: mv.task_id.clone(),
                path: mv.from.clone(),
                reason: format!("git mv failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
            }),
            Err(e) => failures.push(Problem { task_id: mv.task_id.clone(), path: mv.from.clone(), reason: format!("git mv failed to run: {e}") }),
        }
    }
    failures
}

pub fn sweep(repo_root: &Path, control_plane_root: &Path, dry_run: bool) -> SweepReport {
    let mut report = plan_sweep(control_plane_root);
    if !dry_run {
        let failures = apply_sweep(repo_root, &report);
        report.problems.extend(failures);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_task(root: &Path, folder: &str, task_id: &str, state: &str) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{task_id}_demo.md")),
            format!(
                "---\ntask_id: {task_id}\ntitle: Demo\nworkstream: W1\nrole: Worker\npriority: medium\n---\n\n## Status\n\n- State: {state}\n- Last updated: 2026-01-01\n\n## Notes / Decisions\n\n- created\n"
            ),
        )
        .unwrap();
    }

    #[test]
    fn plan_detects_folder_state_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_task(dir.path(), "backlog", "T001", "done");
        let report = plan_sweep(dir.path());
        assert_eq!(report.moves.len(), 1);
        assert_eq!(report.moves[0].to.parent().unwrap().file_name().unwrap(), "done");
        assert!(report.problems.is_empty());
    }

    #[test]
    fn plan_reports_unknown_state_without_moving() {
        let dir = tempfile::tempdir().unwrap();
        write_task(dir.path(), "backlog", "T002", "mystery");
        let report = plan_sweep(dir.path());
        assert!(report.moves.is_empty());
        assert_eq!(report.problems.len(), 1);
    }

    #[test]
    fn plan_leaves_matching_tasks_untouched() {
        let dir = tempfile::tempdir().unwrap();
        write_task(dir.path(), "active", "T003", "active");
        let report = plan_sweep(dir.path());
        assert!(report.moves.is_empty());
        assert!(report.problems.is_empty());
    }
}
