//! Task descriptor model, header grammar parser, and directory-level
//! operations over the control-plane lifecycle folders.

mod model;
mod parse;
mod store;

pub use model::{Priority, Role, Task, TaskState};
pub use parse::TaskParseError;
pub use store::{LIFECYCLE_DIRS, find_task_by_id, list_tasks, load_task, update_state_and_append_note};

/// Control-plane directory holding the five lifecycle folders, relative to
/// the repository root.
pub const CONTROL_PLANE_DIR: &str = "tasks";

/// Sub-path under the control plane reserved for cross-task handoff notes;
/// the Task Runner's path-ownership check always permits writes here.
pub const HANDOFF_SUBDIR: &str = "tasks/handoff";

/// Scan all lifecycle folders for the first file whose name starts with
/// `task_id`.
pub fn resolve_task_file(control_plane_root: &std::path::Path, task_id: &str) -> Option<std::path::PathBuf> {
    for dir_name in LIFECYCLE_DIRS {
        let dir = control_plane_root.join(dir_name);
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && name.starts_with(task_id)
            {
                return Some(path);
            }
        }
    }
    None
}
