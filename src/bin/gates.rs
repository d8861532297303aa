//! `gates` — runs the full Gate Battery against a working tree and prints
//! one line per gate; exits non-zero iff any gate failed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use swarm_supervisor::config::ProjectContract;
use swarm_supervisor::gates::{self, GateCtx, PROJECT_CONTRACT_PATH};

#[derive(Parser)]
#[command(name = "gates", version, about = "Run the offline Gate Battery against a working tree")]
struct Cli {
    #[arg(short = 'C', long)]
    repo_root: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" })).init();

    let repo_root = cli.repo_root.unwrap_or_else(|| PathBuf::from("."));
    let contract_path = repo_root.join(PROJECT_CONTRACT_PATH);
    let mode = ProjectContract::load(&contract_path).ok().map(|c| c.mode);

    let ctx = GateCtx { repo_root: repo_root.clone(), mode };

    let mut results = gates::run_all(&ctx);
    results.push(gates::sample_panel_integrity(&ctx));

    let mut all_ok = true;
    for result in &results {
        if !result.ok {
            all_ok = false;
        }
        println!("[{}] ok={} details={}", result.name, result.ok, result.details);
    }

    if all_ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
