//! The periodic tick loop: hard-reset to the tracked base branch, compute
//! the ready set, select and dispatch work, then look for stalled PRs to
//! repair before sleeping until the next tick.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;

use crate::agent::SandboxLevel;
use crate::planner;
use crate::runner::{self, JudgeOutcome, RunnerConfig};
use crate::task_store::{self, Task, TaskState};
use crate::vcs::{PrProvider, Repository};
use crate::window::ProcessWindow;

pub enum PlannerMode {
    Heuristic,
    Agent { command: String, model: Option<String>, timeout: Duration },
}

pub struct TickConfig {
    pub repo_root: PathBuf,
    pub control_plane_root: PathBuf,
    pub remote: String,
    pub base_branch: String,
    pub worktree_parent: PathBuf,
    pub max_workers: usize,
    pub planner_mode: PlannerMode,
    pub runner: RunnerConfig,
    pub repair_after_seconds: u64,
    pub max_repairs_per_tick: usize,
}

#[derive(Debug)]
pub struct TickReport {
    pub dispatched: Vec<String>,
    pub repaired: Vec<String>,
    pub errors: Vec<String>,
}

/// One supervisor tick: reset, plan, dispatch, repair. Returns a report
/// rather than failing the whole process on a single task's error, so an
/// unattended loop keeps making progress on the rest of the backlog.
pub fn run_tick(config: &TickConfig, pr_provider: Option<&dyn PrProvider>, window: &dyn ProcessWindow) -> anyhow::Result<TickReport> {
    let repo = Repository::at(&config.repo_root);
    repo.fetch(&config.remote)?;
    repo.hard_reset_to(&format!("{}/{}", config.remote, config.base_branch))?;

    let (tasks, parse_errors) = task_store::list_tasks(&config.control_plane_root);
    let mut errors: Vec<String> = parse_errors.iter().map(|e| e.to_string()).collect();

    let done = planner::done_task_ids(&tasks);
    let claimed = crate::vcs::claimed_task_ids(&repo, &config.remote, &config.base_branch, pr_provider);
    let ready = planner::compute_ready(&tasks, &done, &claimed);

    let claimed_tasks: Vec<&Task> = tasks.iter().filter(|t| claimed.contains(&t.task_id)).collect();
    let locks = planner::compute_workstream_locks(&claimed_tasks);

    let selected = match &config.planner_mode {
        PlannerMode::Heuristic => {
            let candidates = planner::select_heuristic(&ready, ready.len());
            planner::apply_workstream_filter(&candidates, &locks, config.max_workers)
        }
        PlannerMode::Agent { command, model, timeout } => {
            let agent_selected = planner::select_via_agent(&ready, ready.len(), command, model.as_deref(), *timeout);
            planner::apply_workstream_filter(&agent_selected, &locks, config.max_workers)
        }
    };

    let mut dispatched = Vec::new();
    for task in selected {
        match dispatch_task(config, &repo, task, None, window) {
            Ok(()) => dispatched.push(task.task_id.clone()),
            Err(e) => errors.push(format!("{}: {e}", task.task_id)),
        }
    }

    let repaired = match pr_provider {
        Some(provider) => run_repair_pass(config, &repo, &tasks, provider, window, &mut errors),
        None => Vec::new(),
    };

    Ok(TickReport { dispatched, repaired, errors })
}

/// Create (or reuse) the task's worktree and dispatch it through either the
/// windowed runner (a detached terminal window the operator can attach to)
/// or the inline path used by tests and `runner=local`.
fn dispatch_task(config: &TickConfig, repo: &Repository, task: &Task, repair_context: Option<&str>, window: &dyn ProcessWindow) -> anyhow::Result<()> {
    let branch = task.branch_name();
    let worktree_dir = config.worktree_parent.join(&branch);

    if repo.worktree_for_branch(&branch)?.is_none() {
        repo.add_worktree(&worktree_dir, &branch, Some(&format!("{}/{}", config.remote, config.base_branch)))?;
    }

    let command = vec!["supervisor".to_string(), "run-task".to_string(), "--task-id".to_string(), task.task_id.clone()];
    match window.spawn_window("swarm-supervisor", &branch, &worktree_dir, &command) {
        Ok(()) => Ok(()),
        Err(_) => run_task_inline(config, task, &worktree_dir, repair_context),
    }
}

/// The Task Runner's full lifecycle for one task, executed in its worktree.
/// Shared by the inline dispatch path and `supervisor run-task`.
pub fn run_task_inline(config: &TickConfig, task: &Task, worktree_dir: &Path, repair_context: Option<&str>) -> anyhow::Result<()> {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    runner::claim(worktree_dir, task, &today)?;

    let outcome = runner::run_worker_step(&config.runner, worktree_dir, task, repair_context)?;
    if matches!(outcome, crate::agent::WorkerOutcome::TimedOut) {
        // Stays `active`: the worker may have left partial work, and only
        // the Judge is authorized to move a task out of `active`.
        task_store::update_state_and_append_note(task, TaskState::Active, &today, "worker timed out before completing the task")?;
        let worktree_repo = Repository::at(worktree_dir);
        worktree_repo.add_all()?;
        worktree_repo.commit(&format!("{}: worker timeout", task.task_id))?;
        worktree_repo.push(&config.remote, &task.branch_name())?;
        anyhow::bail!("worker timed out for {}", task.task_id);
    }

    let (gates_ok, gate_output_tail) = runner::run_gates(worktree_dir, task);
    let (ownership_ok, ownership_failures) = runner::check_ownership(worktree_dir, task)?;
    let judge = JudgeOutcome { gates_ok, gate_output_tail, ownership_ok, ownership_failures };

    if config.runner.run_review {
        let log_dir = config.repo_root.join("data").join("review_logs");
        let _ = runner::run_review_step(&config.runner, worktree_dir, task, &log_dir);
    }

    let pr_provider = crate::vcs::GhPrProvider::new();
    let provider: Option<&dyn PrProvider> = if config.runner.create_pr { Some(&pr_provider) } else { None };
    runner::finish(&config.runner, worktree_dir, task, &judge, repair_context, provider)?;
    Ok(())
}

struct RepairCandidate {
    task: Task,
    branch: String,
    context: String,
    updated_at: chrono::DateTime<Utc>,
}

/// §4.5.1 repair pass: attach repair context to stalled PRs (failing checks
/// or no longer mergeable) and re-dispatch, oldest-first, up to the tick's
/// repair budget.
fn run_repair_pass(config: &TickConfig, repo: &Repository, tasks: &[Task], provider: &dyn PrProvider, window: &dyn ProcessWindow, errors: &mut Vec<String>) -> Vec<String> {
    let open_prs = match provider.list_open_prs_on_base(&config.repo_root, &config.base_branch) {
        Ok(prs) => prs,
        Err(e) => {
            errors.push(format!("repair pass: could not list open PRs: {e}"));
            return Vec::new();
        }
    };

    let now = Utc::now();
    let stale_before = now - chrono::Duration::seconds(config.repair_after_seconds as i64);

    let mut candidates: Vec<RepairCandidate> = Vec::new();
    for pr in &open_prs {
        let needs_repair = pr.checks == crate::vcs::ChecksRollup::Failing || !pr.mergeable;
        if !needs_repair || pr.updated_at > stale_before {
            continue;
        }
        let Some(task) = tasks.iter().find(|t| t.branch_name() == pr.head_branch) else { continue };
        let context = format!(
            "PR #{} on branch {} needs repair: checks={:?}, mergeable={}",
            pr.number, pr.head_branch, pr.checks, pr.mergeable
        );
        candidates.push(RepairCandidate { task: task.clone(), branch: pr.head_branch.clone(), context, updated_at: pr.updated_at });
    }

    candidates.sort_by_key(|c| c.updated_at);
    candidates.truncate(config.max_repairs_per_tick);

    let mut repaired = Vec::new();
    for candidate in candidates {
        let worktree_dir = config.worktree_parent.join(&candidate.branch);
        let attach_result = if repo.worktree_for_branch(&candidate.branch).ok().flatten().is_none() {
            repo.add_worktree(&worktree_dir, &candidate.branch, None)
        } else {
            Ok(())
        };
        if let Err(e) = attach_result {
            errors.push(format!("repair pass: could not attach worktree for {}: {e}", candidate.task.task_id));
            continue;
        }

        let command = vec!["supervisor".to_string(), "run-task".to_string(), "--task-id".to_string(), candidate.task.task_id.clone()];
        let dispatch_result = match window.spawn_window("swarm-supervisor", &candidate.branch, &worktree_dir, &command) {
            Ok(()) => Ok(()),
            Err(_) => run_task_inline(config, &candidate.task, &worktree_dir, Some(&candidate.context)),
        };
        match dispatch_result {
            Ok(()) => repaired.push(candidate.task.task_id.clone()),
            Err(e) => errors.push(format!("repair pass: {}: {e}", candidate.task.task_id)),
        }
    }
    repaired
}

/// Shared between [`request_shutdown`]/[`is_shutdown_requested`] and, on
/// unix, the signal handler registered by [`install_shutdown_handler`] —
/// `signal_hook::flag::register` needs its own `Arc` to the flag it sets.
static SHUTDOWN: std::sync::LazyLock<std::sync::Arc<AtomicBool>> = std::sync::LazyLock::new(|| std::sync::Arc::new(AtomicBool::new(false)));

pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn is_shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Sleep `interval_seconds` (minimum 5) in short increments so a requested
/// shutdown is honored promptly rather than only between ticks. Returns
/// `true` if a shutdown was observed during the sleep.
pub fn sleep_until_next_tick(interval_seconds: u64) -> bool {
    let interval = interval_seconds.max(5);
    let mut remaining = interval;
    while remaining > 0 && !is_shutdown_requested() {
        let chunk = remaining.min(5);
        std::thread::sleep(Duration::from_secs(chunk));
        remaining -= chunk;
    }
    is_shutdown_requested()
}

/// Register a SIGINT/SIGTERM handler that flips the shutdown flag observed
/// by [`sleep_until_next_tick`], so `loop` exits at the next ≤5s sleep
/// increment boundary instead of dying immediately to the default
/// disposition. Unix-only: `signal_hook`'s flag registration is POSIX.
#[cfg(unix)]
pub fn install_shutdown_handler() -> anyhow::Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, SHUTDOWN.clone())?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install_shutdown_handler() -> anyhow::Result<()> {
    Ok(())
}

/// Build the default production config for a `supervisor loop`/`tick`
/// invocation from the ambient [`crate::config::SupervisorConfig`] and CLI
/// overrides. Fails loudly rather than defaulting any unattended-mode
/// interlock.
pub fn default_runner_config(supervisor: &crate::config::SupervisorConfig, final_state: TaskState, create_pr: bool, auto_merge: bool, max_worker_seconds: u64, max_review_seconds: u64, run_review: bool) -> anyhow::Result<RunnerConfig> {
    let sandbox: SandboxLevel = supervisor.sandbox_level.parse().map_err(|_| anyhow::anyhow!("invalid sandbox-level `{}`", supervisor.sandbox_level))?;
    Ok(RunnerConfig {
        worker_command: supervisor.worker_command.clone().unwrap_or_else(|| "agent".to_string()),
        worker_model: None,
        sandbox,
        max_worker_seconds,
        max_review_seconds,
        run_review,
        final_state,
        create_pr,
        auto_merge,
        base_branch: supervisor.base_branch.clone(),
        control_docs: vec!["AGENTS.md".to_string(), "contracts/project.yaml".to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_store::{Priority, Role};
    use std::process::Command as StdCommand;

    struct NullPrProvider;
    impl PrProvider for NullPrProvider {
        fn create_pr_if_missing(&self, _: &Path, _: &str, _: &str, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        fn enable_auto_merge(&self, _: &Path, _: bool) -> anyhow::Result<()> {
            Ok(())
        }
        fn list_open_prs_on_base(&self, _: &Path, _: &str) -> anyhow::Result<Vec<crate::vcs::OpenPr>> {
            Ok(vec![])
        }
    }

    fn init_bare_remote_and_clone() -> (tempfile::TempDir, tempfile::TempDir) {
        let remote = tempfile::tempdir().unwrap();
        StdCommand::new("git").args(["init", "-q", "--bare"]).current_dir(remote.path()).output().unwrap();

        let seed = tempfile::tempdir().unwrap();
        StdCommand::new("git").args(["init", "-q"]).current_dir(seed.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.email", "a@b.c"]).current_dir(seed.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.name", "test"]).current_dir(seed.path()).output().unwrap();
        std::fs::create_dir_all(seed.path().join("tasks/backlog")).unwrap();
        std::fs::write(seed.path().join("tasks/backlog/.gitkeep"), "").unwrap();
        StdCommand::new("git").args(["add", "-A"]).current_dir(seed.path()).output().unwrap();
        StdCommand::new("git").args(["commit", "-q", "-m", "init"]).current_dir(seed.path()).output().unwrap();
        StdCommand::new("git").args(["branch", "-M", "main"]).current_dir(seed.path()).output().unwrap();
        StdCommand::new("git").args(["remote", "add", "origin", &remote.path().to_string_lossy()]).current_dir(seed.path()).output().unwrap();
        StdCommand::new("git").args(["push", "-u", "origin", "main"]).current_dir(seed.path()).output().unwrap();

        let work = tempfile::tempdir().unwrap();
        StdCommand::new("git").args(["clone", "-q", &remote.path().to_string_lossy(), "."]).current_dir(work.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.email", "a@b.c"]).current_dir(work.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.name", "test"]).current_dir(work.path()).output().unwrap();
        (remote, work)
    }

    fn sample_task(task_id: &str) -> Task {
        Task {
            path: PathBuf::from(format!("tasks/backlog/{task_id}_demo.md")),
            task_id: task_id.to_string(),
            title: "Demo".to_string(),
            workstream: "W1".to_string(),
            role: Role::Worker,
            priority: Priority::Medium,
            dependencies: vec![],
            parallel_ok: true,
            allowed_paths: vec!["src/".to_string()],
            disallowed_paths: vec![],
            outputs: vec![],
            gates: vec!["true".to_string()],
            stop_conditions: vec![],
            state: Some(TaskState::Backlog),
            state_raw: None,
            last_updated: None,
        }
    }

    #[test]
    fn sleep_until_next_tick_honors_shutdown_request() {
        request_shutdown();
        let start = std::time::Instant::now();
        assert!(sleep_until_next_tick(3600));
        assert!(start.elapsed() < Duration::from_secs(2));
        SHUTDOWN.store(false, Ordering::SeqCst);
    }

    #[test]
    fn run_tick_with_empty_backlog_dispatches_nothing() {
        let (_remote, work) = init_bare_remote_and_clone();
        let config = TickConfig {
            repo_root: work.path().to_path_buf(),
            control_plane_root: work.path().join("tasks"),
            remote: "origin".to_string(),
            base_branch: "main".to_string(),
            worktree_parent: work.path().join(".worktrees"),
            max_workers: 2,
            planner_mode: PlannerMode::Heuristic,
            runner: RunnerConfig {
                worker_command: "true".to_string(),
                worker_model: None,
                sandbox: SandboxLevel::WorkspaceWrite,
                max_worker_seconds: 5,
                max_review_seconds: 5,
                run_review: false,
                final_state: TaskState::ReadyForReview,
                create_pr: false,
                auto_merge: false,
                base_branch: "main".to_string(),
                control_docs: vec![],
            },
            repair_after_seconds: 14400,
            max_repairs_per_tick: 1,
        };
        let provider = NullPrProvider;
        let report = run_tick(&config, Some(&provider), &crate::window::NoWindow).unwrap();
        assert!(report.dispatched.is_empty());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn repair_candidates_sorted_oldest_first_and_truncated_to_budget() {
        let newer = Utc::now();
        let older = newer - chrono::Duration::hours(1);
        let mut candidates = vec![
            RepairCandidate { task: sample_task("T009"), branch: "T009_x".to_string(), context: String::new(), updated_at: newer },
            RepairCandidate { task: sample_task("T002"), branch: "T002_x".to_string(), context: String::new(), updated_at: older },
        ];
        candidates.sort_by_key(|c| c.updated_at);
        candidates.truncate(1);
        assert_eq!(candidates[0].task.task_id, "T002");
    }
}
