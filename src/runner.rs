//! The Task Runner: a single task's claim → Worker → Judge → persist
//! lifecycle, executed inside the worktree bound to that task's branch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use crate::agent::{self, SandboxLevel, WorkerOutcome, WorkerPromptCtx};
use crate::task_store::{self, Task, TaskState};
use crate::vcs::{PrProvider, Repository};

pub struct RunnerConfig {
    pub worker_command: String,
    pub worker_model: Option<String>,
    pub sandbox: SandboxLevel,
    pub max_worker_seconds: u64,
    pub max_review_seconds: u64,
    pub run_review: bool,
    pub final_state: TaskState,
    pub create_pr: bool,
    pub auto_merge: bool,
    pub base_branch: String,
    pub control_docs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipFailureReason {
    OutsideAllowedPaths,
    DisallowedPath,
    TaskFileRenamedOrDeleted,
}

#[derive(Debug, Clone)]
pub struct OwnershipFailure {
    pub path: String,
    pub reason: OwnershipFailureReason,
}

#[derive(Debug)]
pub struct JudgeOutcome {
    pub gates_ok: bool,
    pub gate_output_tail: String,
    pub ownership_ok: bool,
    pub ownership_failures: Vec<OwnershipFailure>,
}

impl JudgeOutcome {
    pub fn passed(&self) -> bool {
        self.gates_ok && self.ownership_ok
    }
}

/// Step 2: claim the task if it's currently `backlog`. Runs inside the
/// worktree already checked out on the task's branch.
pub fn claim(worktree_dir: &Path, task: &Task, today: &str) -> anyhow::Result<()> {
    if task.state != Some(TaskState::Backlog) {
        return Ok(());
    }
    let worktree_repo = Repository::at(worktree_dir);
    task_store::update_state_and_append_note(task, TaskState::Active, today, "claimed by Task Runner")?;
    worktree_repo.add_all()?;
    worktree_repo.commit(&format!("{}: claim", task.task_id))?;
    worktree_repo.push("origin", &task.branch_name())?;
    Ok(())
}

/// Step 3: build the prompt and spawn the worker agent.
pub fn run_worker_step(config: &RunnerConfig, worktree_dir: &Path, task: &Task, repair_context: Option<&str>) -> anyhow::Result<WorkerOutcome> {
    let prompt = agent::render_worker_prompt(&WorkerPromptCtx {
        task_path: &task.path,
        control_docs: &config.control_docs,
        allowed_paths: &task.allowed_paths,
        disallowed_paths: &task.disallowed_paths,
        repair_context,
    })?;

    let network_allowed = agent::network_allowed_for_workstream(&task.workstream);
    agent::run_worker(
        &config.worker_command,
        config.worker_model.as_deref(),
        config.sandbox,
        network_allowed,
        worktree_dir,
        &prompt,
        Duration::from_secs(config.max_worker_seconds),
        &task.task_id,
    )
}

/// Step 4: run every command in `task.gates` as a shell command in the
/// worktree; pass iff every one exits zero.
pub fn run_gates(worktree_dir: &Path, task: &Task) -> (bool, String) {
    let mut ok = true;
    let mut tail = String::new();
    for gate_cmd in &task.gates {
        let mut cmd = std::process::Command::new("sh");
        cmd.args(["-c", gate_cmd]).current_dir(worktree_dir);
        match crate::process::run(&mut cmd, Some(&task.task_id)) {
            Ok(output) => {
                let combined = format!("{}{}", String::from_utf8_lossy(&output.stdout), String::from_utf8_lossy(&output.stderr));
                tail = last_n_bytes(&combined, 2048);
                if !output.status.success() {
                    ok = false;
                    break;
                }
            }
            Err(e) => {
                ok = false;
                tail = format!("failed to execute `{gate_cmd}`: {e}");
                break;
            }
        }
    }
    (ok, tail)
}

fn last_n_bytes(s: &str, n: usize) -> String {
    if s.len() <= n {
        s.to_string()
    } else {
        s[s.len() - n..].to_string()
    }
}

/// Step 5: enumerate porcelain status entries and apply the path matcher.
pub fn check_ownership(worktree_dir: &Path, task: &Task) -> anyhow::Result<(bool, Vec<OwnershipFailure>)> {
    let worktree_repo = Repository::at(worktree_dir);
    let entries = worktree_repo.status_porcelain()?;

    let task_file_name = task.path.to_string_lossy().replace('\\', "/");
    let mut failures = Vec::new();

    for entry in &entries {
        let path = entry.path.trim_matches('"');
        let is_rename = entry.code.starts_with('R');
        let old_path = if is_rename { path.split(" -> ").next().map(str::to_string) } else { None };
        let new_path = if is_rename { path.split(" -> ").nth(1).unwrap_or(path) } else { path };

        let touches_task_file = old_path.as_deref() == Some(task_file_name.as_str()) || new_path == task_file_name;
        let is_deletion = entry.code.contains('D');

        if touches_task_file && (is_rename || (is_deletion && new_path == task_file_name)) {
            failures.push(OwnershipFailure { path: new_path.to_string(), reason: OwnershipFailureReason::TaskFileRenamedOrDeleted });
            continue;
        }
        if new_path == task_file_name {
            continue;
        }

        if path_is_allowed(new_path, task) {
            continue;
        }
        let under_control_plane = new_path.starts_with(task_store::CONTROL_PLANE_DIR);
        let under_handoff = new_path.starts_with(task_store::HANDOFF_SUBDIR);
        if under_control_plane && !under_handoff {
            failures.push(OwnershipFailure { path: new_path.to_string(), reason: OwnershipFailureReason::OutsideAllowedPaths });
            continue;
        }
        if task.disallowed_paths.iter().any(|p| new_path.starts_with(p.as_str())) {
            failures.push(OwnershipFailure { path: new_path.to_string(), reason: OwnershipFailureReason::DisallowedPath });
            continue;
        }
        failures.push(OwnershipFailure { path: new_path.to_string(), reason: OwnershipFailureReason::OutsideAllowedPaths });
    }

    Ok((failures.is_empty(), failures))
}

/// Handoff writes and the task's own file are always allowed; otherwise a
/// write is permitted iff some `allowed_paths` prefix matches and no
/// `disallowed_paths` prefix matches.
fn path_is_allowed(path: &str, task: &Task) -> bool {
    if path.starts_with(task_store::HANDOFF_SUBDIR) {
        return true;
    }
    if task.disallowed_paths.iter().any(|p| path.starts_with(p.as_str())) {
        return false;
    }
    task.allowed_paths.iter().any(|p| path.starts_with(p.as_str()))
}

/// Step 7+8: decide the new state, persist the surgical edit, commit,
/// push, and optionally create/auto-merge a PR.
pub fn finish(
    config: &RunnerConfig,
    worktree_dir: &Path,
    task: &Task,
    judge: &JudgeOutcome,
    repair_context: Option<&str>,
    pr_provider: Option<&dyn PrProvider>,
) -> anyhow::Result<TaskState> {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    let worktree_repo = Repository::at(worktree_dir);

    let (new_state, note) = if judge.passed() {
        let mut note = "gates and ownership checks passed".to_string();
        if let Some(ctx) = repair_context {
            note.push_str(&format!("; repair context: {ctx}"));
        }
        (config.final_state, note)
    } else {
        let mut reasons = Vec::new();
        if !judge.gates_ok {
            reasons.push("gates_failed".to_string());
        }
        if !judge.ownership_ok {
            reasons.push("path_ownership_violation".to_string());
        }
        let mut note = format!("@human attention needed: {}", reasons.join(", "));
        if !judge.ownership_failures.is_empty() {
            let details: Vec<String> = judge.ownership_failures.iter().map(|f| format!("{}:{:?}", f.path, f.reason)).collect();
            note.push_str(&format!(" [{}]", details.join(", ")));
        }
        if let Some(ctx) = repair_context {
            note.push_str(&format!("; repair context: {ctx}"));
        }
        (TaskState::Blocked, note)
    };

    task_store::update_state_and_append_note(task, new_state, &today, &note)?;
    worktree_repo.add_all()?;
    worktree_repo.commit(&format!("{}: {}", task.task_id, new_state))?;
    worktree_repo.push("origin", &task.branch_name())?;

    if config.create_pr && let Some(provider) = pr_provider {
        let title = format!("{}: {}", task.task_id, task.title);
        let body = note.clone();
        if let Err(e) = provider.create_pr_if_missing(worktree_dir, &config.base_branch, &title, &body) {
            log::warn!("PR creation failed for {}: {e}", task.task_id);
        }
        if config.auto_merge && matches!(new_state, TaskState::ReadyForReview | TaskState::Done) {
            let _ = provider.enable_auto_merge(worktree_dir, true);
        }
    }

    Ok(new_state)
}

/// Best-effort review invocation; output is written to a per-task log file
/// under `log_dir`.
pub fn run_review_step(config: &RunnerConfig, worktree_dir: &Path, task: &Task, log_dir: &Path) -> Option<PathBuf> {
    let prompt = agent::render_review_prompt(&task.task_id, &config.base_branch).ok()?;
    let output = agent::run_review(&config.worker_command, worktree_dir, &prompt, Duration::from_secs(config.max_review_seconds), &task.task_id)?;

    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let log_path = log_dir.join(format!("{}_{}_review.txt", task.task_id, timestamp));
    if std::fs::create_dir_all(log_dir).is_ok() && std::fs::write(&log_path, &output).is_ok() {
        Some(log_path)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_store::{Priority, Role};

    fn sample_task() -> Task {
        Task {
            path: PathBuf::from("tasks/active/T001_demo.md"),
            task_id: "T001".to_string(),
            title: "Demo".to_string(),
            workstream: "W1".to_string(),
            role: Role::Worker,
            priority: Priority::Medium,
            dependencies: vec![],
            parallel_ok: true,
            allowed_paths: vec!["src/etl/".to_string()],
            disallowed_paths: vec!["src/etl/secrets/".to_string()],
            outputs: vec![],
            gates: vec![],
            stop_conditions: vec![],
            state: Some(TaskState::Active),
            state_raw: None,
            last_updated: None,
        }
    }

    #[test]
    fn path_allowed_inside_allowed_prefix() {
        let task = sample_task();
        assert!(path_is_allowed("src/etl/extract.rs", &task));
    }

    #[test]
    fn path_denied_outside_allowed_prefix() {
        let task = sample_task();
        assert!(!path_is_allowed("docs/protocol.md", &task));
    }

    #[test]
    fn path_denied_matching_disallowed_prefix_even_under_allowed_parent() {
        let task = sample_task();
        assert!(!path_is_allowed("src/etl/secrets/key.txt", &task));
    }

    #[test]
    fn handoff_subpath_always_allowed() {
        let task = sample_task();
        assert!(path_is_allowed(&format!("{}/note.md", task_store::HANDOFF_SUBDIR), &task));
    }

    #[test]
    fn gates_pass_requires_zero_exit_on_every_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = sample_task();
        task.gates = vec!["true".to_string(), "false".to_string()];
        let (ok, _tail) = run_gates(dir.path(), &task);
        assert!(!ok);

        task.gates = vec!["true".to_string(), "true".to_string()];
        let (ok, _tail) = run_gates(dir.path(), &task);
        assert!(ok);
    }
}
