//! `make-manifest` — hashes a data snapshot directory and writes the Raw
//! Manifest JSON document; the trailing `-- <cmd...>` is recorded verbatim
//! as provenance, not executed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use swarm_supervisor::manifest::{self, BuildManifestArgs};

#[derive(Parser)]
#[command(name = "make-manifest", version, about = "Emit a content-addressed snapshot manifest")]
struct Cli {
    /// Logical name of the data source, e.g. `ais_positions`.
    source: String,

    /// Snapshot directory; must resolve inside the repository root.
    snapshot_dir: PathBuf,

    #[arg(long)]
    as_of: Option<String>,

    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(short = 'C', long)]
    repo_root: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,

    /// The command that produced this snapshot, recorded verbatim, not run.
    #[arg(last = true, required = true)]
    cmd: Vec<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" })).init();

    let repo_root = cli.repo_root.unwrap_or_else(|| PathBuf::from("."));

    let as_of_utc_date = match cli.as_of {
        Some(date) => date,
        None => manifest::infer_as_of_date(&cli.snapshot_dir)
            .ok_or_else(|| anyhow::anyhow!("--as-of not given and snapshot directory name is not a YYYY-MM-DD date"))?,
    };

    let fetched_at_utc = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let command = shell_words_join(&cli.cmd);

    let args = BuildManifestArgs {
        source: &cli.source,
        snapshot_dir: &cli.snapshot_dir,
        repo_root: &repo_root,
        as_of_utc_date: &as_of_utc_date,
        fetched_at_utc: &fetched_at_utc,
        command: &command,
    };

    let raw_manifest = manifest::build_manifest(&args)?;
    let json = manifest::to_sorted_json(&raw_manifest)?;

    let out_path = cli.out.unwrap_or_else(|| manifest::default_output_path(&repo_root, &cli.source, &as_of_utc_date));
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&out_path, json)?;
    println!("wrote {}", out_path.display());

    Ok(ExitCode::SUCCESS)
}

/// Quote each argument with single quotes when it contains characters a
/// shell would otherwise split on, so `command` round-trips as one string.
fn shell_words_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || "\"'$`\\".contains(c)) {
                format!("'{}'", arg.replace('\'', r"'\''"))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
