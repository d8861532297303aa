//! `sweeper` — reconciles the physical lifecycle-folder layout with each
//! task's declared `State`; exits non-zero iff any problems were reported.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use swarm_supervisor::sweeper;
use swarm_supervisor::task_store::CONTROL_PLANE_DIR;

#[derive(Parser)]
#[command(name = "sweeper", version, about = "Reconcile task file locations with their declared states")]
struct Cli {
    #[arg(short = 'C', long)]
    repo_root: Option<PathBuf>,

    /// Print planned moves without mutating anything.
    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" })).init();

    let repo_root = cli.repo_root.unwrap_or_else(|| PathBuf::from("."));
    let control_plane_root = repo_root.join(CONTROL_PLANE_DIR);

    let report = sweeper::sweep(&repo_root, &control_plane_root, cli.dry_run);

    for mv in &report.moves {
        println!("{}: {} -> {}", mv.task_id, mv.from.display(), mv.to.display());
    }
    for problem in &report.problems {
        println!("problem: {} {}: {}", problem.task_id, problem.path.display(), problem.reason);
    }

    if report.problems.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
