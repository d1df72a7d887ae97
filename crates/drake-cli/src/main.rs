mod config;
mod init_cmd;
mod run_cmd;
mod status_cmd;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "drake", about = "Task execution kernel for orchestrating fleets of LLM coding agents")]
struct Cli {
    /// Project root directory. Defaults to the current directory.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scaffold a starter project config and tasks directory.
    Init,
    /// Tick the supervisor until the project is done or stalled.
    Run {
        #[arg(long)]
        parallel_limit: Option<usize>,
    },
    /// Print per-status task counts.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_env("DRAKE_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let project_dir = cli.project_dir.unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Command::Init => {
            init_cmd::run_init(&project_dir)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { parallel_limit } => run_cmd::run(&project_dir, parallel_limit).await,
        Command::Status => {
            status_cmd::run_status(&project_dir)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
