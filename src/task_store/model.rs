//! Typed task descriptor fields.

use std::path::PathBuf;
use std::str::FromStr;

use strum::{Display, EnumString};

/// One of the three declared roles a task carries out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Role {
    Planner,
    Worker,
    Judge,
}

/// Scheduling priority; lower-ranked values are selected first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// `(priority_rank, task_id)` ordering key used by the heuristic planner.
    /// Values outside the closed enum are not representable, so there is no
    /// "other" arm here — `task_hygiene` rejects those before scheduling sees them.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// Lifecycle state, also the name of the physical control-plane folder the
/// task file should live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TaskState {
    Backlog,
    Active,
    Blocked,
    #[strum(serialize = "ready_for_review")]
    ReadyForReview,
    Done,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::Backlog,
        TaskState::Active,
        TaskState::Blocked,
        TaskState::ReadyForReview,
        TaskState::Done,
    ];

    /// Name of the lifecycle folder this state lives in, relative to the
    /// control-plane directory.
    pub fn folder_name(self) -> &'static str {
        match self {
            TaskState::Backlog => "backlog",
            TaskState::Active => "active",
            TaskState::Blocked => "blocked",
            TaskState::ReadyForReview => "ready_for_review",
            TaskState::Done => "done",
        }
    }
}

/// A fully parsed task descriptor.
#[derive(Debug, Clone)]
pub struct Task {
    /// Absolute path to the descriptor file.
    pub path: PathBuf,
    pub task_id: String,
    pub title: String,
    pub workstream: String,
    pub role: Role,
    pub priority: Priority,
    pub dependencies: Vec<String>,
    pub parallel_ok: bool,
    pub allowed_paths: Vec<String>,
    pub disallowed_paths: Vec<String>,
    pub outputs: Vec<String>,
    pub gates: Vec<String>,
    pub stop_conditions: Vec<String>,
    /// Parsed `- State: <state>` prose line. `None` if absent or unparseable
    /// (callers in the hygiene gate surface this; schedulers treat it as "not runnable").
    pub state: Option<TaskState>,
    /// Raw state token, preserved even when it fails to parse as [`TaskState`],
    /// so hygiene diagnostics can report what was actually written.
    pub state_raw: Option<String>,
    /// Parsed `- Last updated: YYYY-MM-DD` prose line.
    pub last_updated: Option<String>,
}

impl Task {
    /// The branch slug this task runs on: its filename stem with the
    /// `<task_id>_` prefix stripped.
    pub fn slug(&self) -> String {
        let stem = self.path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        crate::path::slug_from_task_filename(stem, &self.task_id)
    }

    pub fn branch_name(&self) -> String {
        crate::path::task_branch_name(&self.task_id, &self.slug())
    }

    pub fn is_done(&self) -> bool {
        self.state == Some(TaskState::Done)
    }
}

pub fn parse_state(raw: &str) -> Option<TaskState> {
    TaskState::from_str(raw).ok()
}
