//! Ready-set computation and task selection.
//!
//! Two selection strategies share one shape — `(ready tasks, capacity) ->
//! selected task ids` — so the scheduler can swap the external-agent
//! planner for the heuristic one without touching the workstream filter.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Deserialize;

use crate::task_store::Task;

/// Task ids whose declared `State == done`, regardless of which lifecycle
/// folder currently holds the file — this lets the Planner make forward
/// progress even when the Sweeper hasn't caught up yet.
pub fn done_task_ids(tasks: &[Task]) -> HashSet<String> {
    tasks.iter().filter(|t| t.is_done()).map(|t| t.task_id.clone()).collect()
}

/// A backlog task is ready iff it is not claimed and every dependency is done.
pub fn compute_ready<'a>(tasks: &'a [Task], done: &HashSet<String>, claimed: &HashSet<String>) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|t| t.state == Some(crate::task_store::TaskState::Backlog))
        .filter(|t| !claimed.contains(&t.task_id))
        .filter(|t| t.dependencies.iter().all(|dep| done.contains(dep)))
        .collect()
}

fn priority_rank(task: &Task) -> u8 {
    task.priority.rank()
}

/// Stable sort by `(priority_rank, task_id)`, take the first `capacity`.
pub fn select_heuristic<'a>(ready: &[&'a Task], capacity: usize) -> Vec<&'a Task> {
    let mut sorted: Vec<&Task> = ready.to_vec();
    sorted.sort_by(|a, b| (priority_rank(a), &a.task_id).cmp(&(priority_rank(b), &b.task_id)));
    sorted.into_iter().take(capacity).collect()
}

/// Workstreams with any claimed task lacking `parallel_ok`, and workstreams
/// whose claimed tasks are *all* `parallel_ok`.
pub struct WorkstreamLocks {
    pub locked: HashSet<String>,
    pub parallel_only: HashSet<String>,
}

pub fn compute_workstream_locks(claimed_tasks: &[&Task]) -> WorkstreamLocks {
    let mut any_non_parallel: HashSet<String> = HashSet::new();
    let mut all_parallel: HashMap<String, bool> = HashMap::new();

    for task in claimed_tasks {
        if !task.parallel_ok {
            any_non_parallel.insert(task.workstream.clone());
        }
        let entry = all_parallel.entry(task.workstream.clone()).or_insert(true);
        *entry &= task.parallel_ok;
    }

    let parallel_only: HashSet<String> =
        all_parallel.into_iter().filter(|(ws, all_ok)| *all_ok && !any_non_parallel.contains(ws)).map(|(ws, _)| ws).collect();

    WorkstreamLocks { locked: any_non_parallel, parallel_only }
}

/// Apply the workstream concurrency filter to a priority-ordered candidate
/// list, stopping once `capacity` tasks are selected.
pub fn apply_workstream_filter<'a>(candidates: &[&'a Task], locks: &WorkstreamLocks, capacity: usize) -> Vec<&'a Task> {
    let mut selected: Vec<&Task> = Vec::new();
    let mut selected_workstreams: HashSet<&str> = HashSet::new();

    for task in candidates {
        if selected.len() >= capacity {
            break;
        }
        if locks.locked.contains(&task.workstream) {
            continue;
        }
        if locks.parallel_only.contains(&task.workstream) && !task.parallel_ok {
            continue;
        }
        if !task.parallel_ok && selected_workstreams.contains(task.workstream.as_str()) {
            continue;
        }
        selected_workstreams.insert(task.workstream.as_str());
        selected.push(task);
    }

    selected
}

#[derive(Debug, Deserialize)]
pub struct AgentSelection {
    pub selected_task_ids: Vec<String>,
}

/// Shell out to an external agent with a strict JSON-schema prompt asking
/// for `selected_task_ids`; fall back to [`select_heuristic`] on any
/// deviation (non-zero exit, timeout, malformed/unknown ids).
pub fn select_via_agent<'a>(
    ready: &[&'a Task],
    capacity: usize,
    agent_command: &str,
    model: Option<&str>,
    timeout: Duration,
) -> Vec<&'a Task> {
    match try_select_via_agent(ready, capacity, agent_command, model, timeout) {
        Ok(selected) if !selected.is_empty() || ready.is_empty() => selected,
        Ok(_) => {
            log::warn!("planner agent returned no usable selection, falling back to heuristic");
            select_heuristic(ready, capacity)
        }
        Err(e) => {
            log::warn!("planner agent failed ({e}), falling back to heuristic");
            select_heuristic(ready, capacity)
        }
    }
}

fn try_select_via_agent<'a>(
    ready: &[&'a Task],
    capacity: usize,
    agent_command: &str,
    model: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<Vec<&'a Task>> {
    let prompt = build_planner_prompt(ready, capacity);

    let mut cmd = std::process::Command::new(agent_command);
    if let Some(model) = model {
        cmd.args(["--model", model]);
    }

    let outcome = crate::process::run_with_deadline(&mut cmd, Some(&prompt), timeout, Some("planner"))?;
    let output = match outcome {
        crate::process::DeadlineOutcome::Finished(out) => out,
        crate::process::DeadlineOutcome::TimedOut => anyhow::bail!("planner agent timed out"),
    };
    if !output.status.success() {
        anyhow::bail!("planner agent exited non-zero");
    }

    let selection: AgentSelection = serde_json::from_slice(&output.stdout)?;
    let known: HashMap<&str, &Task> = ready.iter().map(|t| (t.task_id.as_str(), *t)).collect();

    let mut selected = Vec::new();
    for id in &selection.selected_task_ids {
        let Some(task) = known.get(id.as_str()) else {
            anyhow::bail!("planner agent selected unknown task id `{id}`");
        };
        selected.push(*task);
    }
    if selected.len() > capacity {
        anyhow::bail!("planner agent selected more tasks than capacity");
    }
    // Re-impose the priority order regardless of how the agent ordered its
    // response, so the workstream filter's "higher-priority candidate
    // already selected" inference (which reads list order) holds for the
    // agent planner the same way it does for the heuristic one.
    selected.sort_by(|a, b| (priority_rank(a), &a.task_id).cmp(&(priority_rank(b), &b.task_id)));
    Ok(selected)
}

fn build_planner_prompt(ready: &[&Task], capacity: usize) -> String {
    let ids: Vec<&str> = ready.iter().map(|t| t.task_id.as_str()).collect();
    format!(
        "Select up to {capacity} task ids to run next from this ready set: {ids:?}.\n\
         Respond with JSON matching exactly {{\"selected_task_ids\": [string, ...]}} and nothing else."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_store::{Priority, Role, TaskState};
    use std::path::PathBuf;

    fn task(id: &str, ws: &str, priority: Priority, deps: &[&str], parallel_ok: bool, state: TaskState) -> Task {
        Task {
            path: PathBuf::from(format!("{id}_demo.md")),
            task_id: id.to_string(),
            title: "demo".to_string(),
            workstream: ws.to_string(),
            role: Role::Worker,
            priority,
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            parallel_ok,
            allowed_paths: vec![],
            disallowed_paths: vec![],
            outputs: vec![],
            gates: vec![],
            stop_conditions: vec![],
            state: Some(state),
            state_raw: None,
            last_updated: None,
        }
    }

    #[test]
    fn backlog_with_dependency() {
        let t001 = task("T001", "W1", Priority::Medium, &[], true, TaskState::Done);
        let t002 = task("T002", "W1", Priority::Medium, &["T001"], true, TaskState::Backlog);
        let tasks = vec![t001, t002];
        let done: HashSet<String> = ["T001".to_string()].into_iter().collect();
        let claimed = HashSet::new();

        let ready = compute_ready(&tasks, &done, &claimed);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].task_id, "T002");

        let selected = select_heuristic(&ready, 1);
        assert_eq!(selected[0].task_id, "T002");
    }

    #[test]
    fn workstream_lock_excludes_locked_workstream() {
        let t010 = task("T010", "W3", Priority::Medium, &[], false, TaskState::Active);
        let t011 = task("T011", "W3", Priority::Medium, &[], false, TaskState::Backlog);
        let t012 = task("T012", "W4", Priority::Medium, &[], true, TaskState::Backlog);

        let claimed_tasks = vec![&t010];
        let locks = compute_workstream_locks(&claimed_tasks);
        assert!(locks.locked.contains("W3"));

        let candidates = vec![&t011, &t012];
        let selected = apply_workstream_filter(&candidates, &locks, 2);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].task_id, "T012");
    }

    #[test]
    fn workstream_filter_allows_two_parallel_ok_tasks_in_same_workstream() {
        let a = task("T020", "W5", Priority::High, &[], true, TaskState::Backlog);
        let b = task("T021", "W5", Priority::High, &[], true, TaskState::Backlog);
        let locks = WorkstreamLocks { locked: HashSet::new(), parallel_only: HashSet::new() };
        let selected = apply_workstream_filter(&[&a, &b], &locks, 2);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn agent_selection_is_sorted_by_priority_rank_regardless_of_agent_order() {
        use std::os::unix::fs::PermissionsExt;

        let high = task("T030", "W1", Priority::High, &[], true, TaskState::Backlog);
        let low = task("T031", "W2", Priority::Low, &[], true, TaskState::Backlog);
        let ready = vec![&low, &high];

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake_agent.sh");
        std::fs::write(&script, "#!/bin/sh\ncat <<'EOF'\n{\"selected_task_ids\": [\"T031\", \"T030\"]}\nEOF\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let selected = try_select_via_agent(&ready, 2, script.to_str().unwrap(), None, Duration::from_secs(5)).unwrap();
        assert_eq!(selected.iter().map(|t| t.task_id.as_str()).collect::<Vec<_>>(), vec!["T030", "T031"]);
    }

    #[test]
    fn ready_set_is_monotonic_under_done_growth_and_claimed_shrink() {
        let t001 = task("T001", "W1", Priority::Medium, &[], true, TaskState::Backlog);
        let t002 = task("T002", "W1", Priority::Medium, &["T001"], true, TaskState::Backlog);
        let tasks = vec![t001, t002];

        let done_small: HashSet<String> = HashSet::new();
        let claimed_large: HashSet<String> = ["T002".to_string()].into_iter().collect();
        let ready_before: HashSet<&str> = compute_ready(&tasks, &done_small, &claimed_large).into_iter().map(|t| t.task_id.as_str()).collect();

        let done_large: HashSet<String> = ["T001".to_string()].into_iter().collect();
        let claimed_small: HashSet<String> = HashSet::new();
        let ready_after: HashSet<&str> = compute_ready(&tasks, &done_large, &claimed_small).into_iter().map(|t| t.task_id.as_str()).collect();

        assert!(ready_before.is_subset(&ready_after));
    }
}
