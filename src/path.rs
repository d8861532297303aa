//! Path display and task/branch naming helpers.

use std::path::Path;

/// Format a filesystem path for user-facing output, shortening the home
/// directory prefix to `~`.
pub fn format_path_for_display(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        if stripped.as_os_str().is_empty() {
            return "~".to_string();
        }
        let mut display_path = std::path::PathBuf::from("~");
        display_path.push(stripped);
        return display_path.display().to_string();
    }
    path.display().to_string()
}

/// Derive a task's branch slug from its descriptor file stem.
///
/// Task files are named `<task_id>_<slug>.md`; the branch created for the
/// task is `<task_id>_<slug>`. Falls back to the whole stem when the file
/// does not carry the expected `<task_id>_` prefix.
pub fn slug_from_task_filename(stem: &str, task_id: &str) -> String {
    let prefix = format!("{task_id}_");
    stem.strip_prefix(prefix.as_str()).unwrap_or(stem).to_string()
}

/// Branch name a claimed task runs on.
pub fn task_branch_name(task_id: &str, slug: &str) -> String {
    format!("{task_id}_{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn slug_strips_task_id_prefix() {
        assert_eq!(slug_from_task_filename("T001_add_ingest", "T001"), "add_ingest");
    }

    #[test]
    fn slug_falls_back_to_whole_stem() {
        assert_eq!(slug_from_task_filename("weird_name", "T001"), "weird_name");
    }

    #[test]
    fn branch_name_joins_id_and_slug() {
        assert_eq!(task_branch_name("T001", "add_ingest"), "T001_add_ingest");
    }

    #[test]
    fn display_path_outside_home_unchanged() {
        let path = PathBuf::from("/definitely/not/under/home");
        assert_eq!(format_path_for_display(&path), path.display().to_string());
    }
}
