//! External agent invocation: building the Worker/Review prompt and
//! spawning the configured agent subprocess.
//!
//! Mirrors the teacher's `execute_llm_command` pattern — a prompt is always
//! piped to stdin, never interpolated into argv, and a broken pipe from an
//! agent that exits before reading all of stdin is not a failure.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use minijinja::{Environment, context};

use crate::process::DeadlineOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum SandboxLevel {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

const WORKER_TEMPLATE: &str = r###"You are the Worker for a single task in an unattended multi-agent pipeline.

Task file: {{ task_path }}

Controlling documents (read these before acting):
{% for doc in control_docs %}
- {{ doc }}
{% endfor %}

Constraints:
- Work on exactly this one task. Do not touch any other task file.
- Allowed write paths: {{ allowed_paths }}
- Disallowed write paths: {{ disallowed_paths }}
- Edit only this task file's "## Status" and "## Notes / Decisions" sections; never rewrite the rest of the file.
- Run every command listed in the task's `gates` field before finishing and make sure each exits zero.
{% if repair_context %}

Repair context (a previous attempt on this branch needs attention):
{{ repair_context }}
{% endif %}
"###;

const REVIEW_TEMPLATE: &str = r#"You are reviewing the uncommitted changes for task {{ task_id }} against base branch {{ base_branch }}.
Summarize whether the diff looks correct and complete relative to the task's stated outputs and stop conditions.
Do not make any edits; this is a read-only review pass.
"#;

pub struct WorkerPromptCtx<'a> {
    pub task_path: &'a Path,
    pub control_docs: &'a [String],
    pub allowed_paths: &'a [String],
    pub disallowed_paths: &'a [String],
    pub repair_context: Option<&'a str>,
}

pub fn render_worker_prompt(ctx: &WorkerPromptCtx) -> anyhow::Result<String> {
    let env = Environment::new();
    let rendered = env.render_str(
        WORKER_TEMPLATE,
        context! {
            task_path => ctx.task_path.display().to_string(),
            control_docs => ctx.control_docs,
            allowed_paths => ctx.allowed_paths.join(", "),
            disallowed_paths => ctx.disallowed_paths.join(", "),
            repair_context => ctx.repair_context,
        },
    )?;
    Ok(rendered)
}

pub fn render_review_prompt(task_id: &str, base_branch: &str) -> anyhow::Result<String> {
    let env = Environment::new();
    Ok(env.render_str(REVIEW_TEMPLATE, context! { task_id, base_branch })?)
}

/// Whether a workstream is permitted a network-access override for its
/// Worker invocation — ETL workstreams (W1, W2) only.
pub fn network_allowed_for_workstream(workstream: &str) -> bool {
    matches!(workstream, "W1" | "W2")
}

pub enum WorkerOutcome {
    Finished(std::process::Output),
    TimedOut,
}

/// Spawn the configured worker agent with the rendered prompt on stdin.
pub fn run_worker(
    agent_command: &str,
    model: Option<&str>,
    sandbox: SandboxLevel,
    network_allowed: bool,
    worktree_dir: &Path,
    prompt: &str,
    timeout: Duration,
    task_id: &str,
) -> anyhow::Result<WorkerOutcome> {
    let mut cmd = Command::new(agent_command);
    cmd.current_dir(worktree_dir);
    cmd.args(["--sandbox", &sandbox.to_string()]);
    if let Some(model) = model {
        cmd.args(["--model", model]);
    }
    if network_allowed {
        cmd.arg("--allow-network");
    }

    match crate::process::run_with_deadline(&mut cmd, Some(prompt), timeout, Some(task_id))? {
        DeadlineOutcome::Finished(out) => Ok(WorkerOutcome::Finished(out)),
        DeadlineOutcome::TimedOut => Ok(WorkerOutcome::TimedOut),
    }
}

/// Best-effort review invocation. Never propagates a hard error: callers
/// treat any failure the same as "no review output."
pub fn run_review(agent_command: &str, worktree_dir: &Path, prompt: &str, timeout: Duration, task_id: &str) -> Option<String> {
    let mut cmd = Command::new(agent_command);
    cmd.current_dir(worktree_dir);
    cmd.args(["review", "--uncommitted"]);

    match crate::process::run_with_deadline(&mut cmd, Some(prompt), timeout, Some(task_id)) {
        Ok(DeadlineOutcome::Finished(out)) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(DeadlineOutcome::Finished(out)) => {
            log::warn!("review agent for {task_id} exited non-zero: {}", String::from_utf8_lossy(&out.stderr).trim());
            None
        }
        Ok(DeadlineOutcome::TimedOut) => {
            log::warn!("review agent for {task_id} timed out");
            None
        }
        Err(e) => {
            log::warn!("review agent for {task_id} failed to run: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_worker_prompt_with_repair_context() {
        let prompt = render_worker_prompt(&WorkerPromptCtx {
            task_path: Path::new("tasks/active/T001_demo.md"),
            control_docs: &["AGENTS.md".to_string()],
            allowed_paths: &["src/etl/".to_string()],
            disallowed_paths: &[],
            repair_context: Some("PR checks failing: lint"),
        })
        .unwrap();
        assert!(prompt.contains("T001_demo.md"));
        assert!(prompt.contains("src/etl/"));
        assert!(prompt.contains("PR checks failing: lint"));
    }

    #[test]
    fn network_override_limited_to_etl_workstreams() {
        assert!(network_allowed_for_workstream("W1"));
        assert!(network_allowed_for_workstream("W2"));
        assert!(!network_allowed_for_workstream("W3"));
    }
}
