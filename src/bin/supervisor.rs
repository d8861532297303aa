//! `supervisor` — the Planner/Worker/Judge tick loop and its single-task
//! escape hatch (`run-task`), used both for local testing and as the
//! command the windowed runner spawns per dispatched task.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use swarm_supervisor::agent::SandboxLevel;
use swarm_supervisor::config::{self, SupervisorConfig};
use swarm_supervisor::runner::RunnerConfig;
use swarm_supervisor::scheduler::{self, PlannerMode, TickConfig};
use swarm_supervisor::task_store::{self, TaskState};
use swarm_supervisor::vcs::{GhPrProvider, Repository};
use swarm_supervisor::window::{NoWindow, ProcessWindow, TmuxWindow};

#[derive(Parser)]
#[command(name = "supervisor", version, about = "Unattended multi-agent task supervisor")]
struct Cli {
    /// Repository root; defaults to the current directory.
    #[arg(short = 'C', long, global = true)]
    repo_root: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Emit `{done, claimed, ready}` as JSON without dispatching anything.
    Plan(TickArgs),
    /// Run one planning+dispatch cycle.
    Tick(TickArgs),
    /// Repeat `tick` every `interval-seconds` until interrupted.
    Loop(TickArgs),
    /// Create a window-session and spawn `loop` inside it.
    WindowStart {
        #[command(flatten)]
        args: TickArgs,
        #[arg(long)]
        attach: bool,
    },
    /// Execute one task's full lifecycle in the current working tree.
    RunTask {
        #[command(flatten)]
        args: TickArgs,
        #[arg(long)]
        task_id: String,
    },
}

#[derive(clap::Args, Clone)]
struct TickArgs {
    #[arg(long, value_enum, default_value = "heuristic")]
    planner: PlannerKind,
    #[arg(long, value_enum, default_value = "windowed")]
    runner: RunnerKind,
    #[arg(long, default_value = "swarm-supervisor")]
    window_session_name: String,
    #[arg(long, default_value_t = 2)]
    max_workers: usize,
    #[arg(long)]
    worktree_parent: Option<PathBuf>,
    #[arg(long)]
    remote: Option<String>,
    #[arg(long)]
    base_branch: Option<String>,
    #[arg(long)]
    agent_model: Option<String>,
    #[arg(long, value_enum)]
    sandbox_level: Option<SandboxLevelArg>,
    #[arg(long)]
    unattended: bool,
    #[arg(long, default_value_t = 1800)]
    max_worker_seconds: u64,
    #[arg(long, default_value_t = 300)]
    max_review_seconds: u64,
    #[arg(long)]
    run_review: bool,
    #[arg(long, default_value_t = 14400)]
    repair_after_seconds: u64,
    #[arg(long, default_value_t = 1)]
    max_repairs_per_tick: usize,
    #[arg(long)]
    create_pr: bool,
    #[arg(long)]
    auto_merge: bool,
    #[arg(long, value_enum, default_value = "ready-for-review")]
    final_state: FinalStateArg,
    #[arg(long)]
    dry_run: bool,
    #[arg(long, default_value_t = 60)]
    interval_seconds: u64,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum PlannerKind {
    Heuristic,
    Agent,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RunnerKind {
    Windowed,
    Local,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SandboxLevelArg {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl From<SandboxLevelArg> for SandboxLevel {
    fn from(value: SandboxLevelArg) -> Self {
        match value {
            SandboxLevelArg::ReadOnly => SandboxLevel::ReadOnly,
            SandboxLevelArg::WorkspaceWrite => SandboxLevel::WorkspaceWrite,
            SandboxLevelArg::DangerFullAccess => SandboxLevel::DangerFullAccess,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum FinalStateArg {
    ReadyForReview,
    Done,
}

impl From<FinalStateArg> for TaskState {
    fn from(value: FinalStateArg) -> Self {
        match value {
            FinalStateArg::ReadyForReview => TaskState::ReadyForReview,
            FinalStateArg::Done => TaskState::Done,
        }
    }
}

fn init_logging(verbose: bool) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "info" })).init();
}

fn build_tick_config(repo_root: &std::path::Path, supervisor: &SupervisorConfig, args: &TickArgs) -> anyhow::Result<TickConfig> {
    let sandbox: SandboxLevel = args
        .sandbox_level
        .map(SandboxLevel::from)
        .or_else(|| supervisor.sandbox_level.parse().ok())
        .unwrap_or(SandboxLevel::WorkspaceWrite);

    let runner_config = RunnerConfig {
        worker_command: supervisor.worker_command.clone().unwrap_or_else(|| "agent".to_string()),
        worker_model: args.agent_model.clone(),
        sandbox,
        max_worker_seconds: args.max_worker_seconds,
        max_review_seconds: args.max_review_seconds,
        run_review: args.run_review,
        final_state: args.final_state.into(),
        create_pr: args.create_pr,
        auto_merge: args.auto_merge,
        base_branch: args.base_branch.clone().unwrap_or_else(|| supervisor.base_branch.clone()),
        control_docs: vec!["AGENTS.md".to_string(), format!("{}/AGENTS.md", task_store::CONTROL_PLANE_DIR)],
    };

    let planner_mode = match args.planner {
        PlannerKind::Heuristic => PlannerMode::Heuristic,
        PlannerKind::Agent => PlannerMode::Agent {
            command: supervisor.planner_command.clone().unwrap_or_else(|| "agent".to_string()),
            model: args.agent_model.clone(),
            timeout: Duration::from_secs(args.max_worker_seconds),
        },
    };

    Ok(TickConfig {
        repo_root: repo_root.to_path_buf(),
        control_plane_root: repo_root.join(task_store::CONTROL_PLANE_DIR),
        remote: args.remote.clone().unwrap_or_else(|| supervisor.remote.clone()),
        base_branch: args.base_branch.clone().unwrap_or_else(|| supervisor.base_branch.clone()),
        worktree_parent: args.worktree_parent.clone().unwrap_or_else(|| repo_root.join(&supervisor.worktree_parent)),
        max_workers: args.max_workers,
        planner_mode,
        runner: runner_config,
        repair_after_seconds: args.repair_after_seconds,
        max_repairs_per_tick: args.max_repairs_per_tick,
    })
}

fn make_window(kind: RunnerKind) -> Box<dyn ProcessWindow> {
    match kind {
        RunnerKind::Windowed => Box::new(TmuxWindow),
        RunnerKind::Local => Box::new(NoWindow),
    }
}

fn run_plan(repo_root: &std::path::Path, supervisor: &SupervisorConfig, args: &TickArgs) -> anyhow::Result<ExitCode> {
    let config = build_tick_config(repo_root, supervisor, args)?;
    let repo = Repository::at(&config.repo_root);
    let (tasks, _errors) = task_store::list_tasks(&config.control_plane_root);
    let done = swarm_supervisor::planner::done_task_ids(&tasks);
    let pr_provider = GhPrProvider::new();
    let claimed = swarm_supervisor::vcs::claimed_task_ids(&repo, &config.remote, &config.base_branch, Some(&pr_provider));
    let ready = swarm_supervisor::planner::compute_ready(&tasks, &done, &claimed);

    let report = serde_json::json!({
        "done": done,
        "claimed": claimed,
        "ready": ready.iter().map(|t| t.task_id.clone()).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

fn run_tick_once(repo_root: &std::path::Path, supervisor: &SupervisorConfig, args: &TickArgs, unattended: bool) -> anyhow::Result<bool> {
    if unattended {
        config::check_unattended_interlock()?;
    }
    let config = build_tick_config(repo_root, supervisor, args)?;
    let pr_provider = GhPrProvider::new();
    let window = make_window(args.runner);

    if args.dry_run {
        let repo = Repository::at(&config.repo_root);
        let (tasks, _errors) = task_store::list_tasks(&config.control_plane_root);
        let done = swarm_supervisor::planner::done_task_ids(&tasks);
        let claimed = swarm_supervisor::vcs::claimed_task_ids(&repo, &config.remote, &config.base_branch, Some(&pr_provider));
        let ready = swarm_supervisor::planner::compute_ready(&tasks, &done, &claimed);
        println!("dry-run: {} ready task(s), no dispatch performed", ready.len());
        return Ok(true);
    }

    let report = scheduler::run_tick(&config, Some(&pr_provider), window.as_ref())?;
    log::info!("tick complete: dispatched={:?} repaired={:?} errors={:?}", report.dispatched, report.repaired, report.errors);
    Ok(report.errors.is_empty())
}

fn run_run_task(repo_root: &std::path::Path, supervisor: &SupervisorConfig, args: &TickArgs, task_id: &str) -> anyhow::Result<ExitCode> {
    let config = build_tick_config(repo_root, supervisor, args)?;
    let (tasks, _errors) = task_store::list_tasks(&config.control_plane_root);
    let task = tasks.into_iter().find(|t| t.task_id == task_id).ok_or_else(|| anyhow::anyhow!("unknown task id `{task_id}`"))?;

    scheduler::run_task_inline(&config, &task, repo_root, None)?;
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let repo_root = cli.repo_root.clone().unwrap_or_else(|| PathBuf::from("."));
    let supervisor = SupervisorConfig::load()?;

    match &cli.command {
        Command::Plan(args) => run_plan(&repo_root, &supervisor, args),
        Command::Tick(args) => {
            let ok = run_tick_once(&repo_root, &supervisor, args, args.unattended)?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Loop(args) => {
            scheduler::install_shutdown_handler()?;
            loop {
                match run_tick_once(&repo_root, &supervisor, args, args.unattended) {
                    Ok(true) => {}
                    Ok(false) => {
                        if args.unattended {
                            return Ok(ExitCode::FAILURE);
                        }
                    }
                    Err(e) => {
                        if args.unattended {
                            return Err(e);
                        }
                        log::error!("tick failed: {e:#}");
                    }
                }
                if scheduler::sleep_until_next_tick(args.interval_seconds) {
                    return Ok(ExitCode::SUCCESS);
                }
            }
        }
        Command::WindowStart { args, attach } => {
            let window = TmuxWindow;
            window.ensure_session(&args.window_session_name, &repo_root)?;
            let self_exe = std::env::current_exe()?.to_string_lossy().into_owned();
            window.spawn_window(&args.window_session_name, "loop", &repo_root, &[self_exe, "loop".to_string()])?;
            if *attach {
                window.attach(&args.window_session_name)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::RunTask { args, task_id } => run_run_task(&repo_root, &supervisor, args, task_id),
    }
}
