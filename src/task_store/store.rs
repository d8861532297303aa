//! Directory-level task operations: listing the lifecycle folders, finding
//! a task by id, and persisting the surgical State/Notes edit to disk.

use std::path::{Path, PathBuf};

use super::model::{Task, TaskState};
use super::parse::{self, TaskParseError};

/// Lifecycle folders in fixed traversal order, relative to a control-plane
/// root such as `tasks/`.
pub const LIFECYCLE_DIRS: [&str; 5] = ["backlog", "active", "blocked", "ready_for_review", "done"];

/// Load a single task descriptor from an explicit path.
pub fn load_task(path: &Path) -> Result<Task, TaskParseError> {
    parse::load_task(path)
}

/// List every task descriptor under `root`'s lifecycle folders.
///
/// Unreadable or malformed files are collected as errors rather than
/// aborting the walk, so a single bad file does not hide the rest of the
/// backlog from callers such as the Gate Battery.
pub fn list_tasks(root: &Path) -> (Vec<Task>, Vec<TaskParseError>) {
    let mut tasks = Vec::new();
    let mut errors = Vec::new();

    for dir_name in LIFECYCLE_DIRS {
        let dir = root.join(dir_name);
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();
        for path in paths {
            match parse::load_task(&path) {
                Ok(task) => tasks.push(task),
                Err(err) => errors.push(err),
            }
        }
    }

    (tasks, errors)
}

/// Find a task by id across all lifecycle folders.
pub fn find_task_by_id<'a>(tasks: &'a [Task], task_id: &str) -> Option<&'a Task> {
    tasks.iter().find(|t| t.task_id == task_id)
}

/// Rewrite `task`'s State and Last-updated lines and append a Notes entry,
/// writing the result back to `task.path`.
///
/// This is the only sanctioned way to change a task's declared state: it
/// edits exactly the three anchored regions spec'd in [`parse`] and leaves
/// every other byte of the file untouched. Per invariant I4, a task already
/// `done` is never modified except by explicit administrative action, so
/// this refuses any transition out of `done`; administrative edits to a
/// `done` task's `State` line bypass this function entirely (they're made
/// by hand, then picked up by the Sweeper).
pub fn update_state_and_append_note(task: &Task, new_state: TaskState, today: &str, note_line: &str) -> anyhow::Result<()> {
    if task.state == Some(TaskState::Done) && new_state != TaskState::Done {
        anyhow::bail!("{}: refusing to transition a done task to {new_state} (I4)", task.path.display());
    }
    let text = std::fs::read_to_string(&task.path)?;
    let updated = parse::update_state_and_append_note(&text, new_state, today, note_line)
        .map_err(|msg| anyhow::anyhow!("{}: {msg}", task.path.display()))?;
    std::fs::write(&task.path, updated)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_task(dir: &Path, state_dir: &str, task_id: &str) -> PathBuf {
        let folder = dir.join(state_dir);
        fs::create_dir_all(&folder).unwrap();
        let path = folder.join(format!("{task_id}_demo.md"));
        fs::write(
            &path,
            format!(
                "---\ntask_id: {task_id}\ntitle: Demo\nworkstream: W1\nrole: Worker\npriority: medium\n---\n\n## Status\n\n- State: {state_dir}\n- Last updated: 2026-01-01\n\n## Notes / Decisions\n\n- 2026-01-01: created\n"
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn list_tasks_walks_all_lifecycle_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write_task(dir.path(), "backlog", "T001");
        write_task(dir.path(), "active", "T002");

        let (tasks, errors) = list_tasks(dir.path());
        assert!(errors.is_empty());
        assert_eq!(tasks.len(), 2);
        assert!(find_task_by_id(&tasks, "T001").is_some());
        assert!(find_task_by_id(&tasks, "T002").is_some());
    }

    #[test]
    fn update_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_task(dir.path(), "backlog", "T001");
        let task = load_task(&path).unwrap();

        update_state_and_append_note(&task, TaskState::Active, "2026-02-02", "claimed by worker").unwrap();

        let reloaded = load_task(&path).unwrap();
        assert_eq!(reloaded.state, Some(TaskState::Active));
        assert_eq!(reloaded.last_updated.as_deref(), Some("2026-02-02"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("claimed by worker"));
        assert!(text.contains("2026-01-01: created"));
    }

    #[test]
    fn refuses_to_transition_a_done_task_out_of_done() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_task(dir.path(), "done", "T001");
        let task = load_task(&path).unwrap();

        let err = update_state_and_append_note(&task, TaskState::Active, "2026-02-02", "reopened").unwrap_err();
        assert!(err.to_string().contains("I4"));

        let untouched = load_task(&path).unwrap();
        assert_eq!(untouched.state, Some(TaskState::Done));
    }
}
