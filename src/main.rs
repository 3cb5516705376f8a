mod flatten;
mod input;
mod record;
mod table;

use clap::Parser;
use flatten::FlattenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Convert the tuning agent's NDJSON log into `ticks.csv` and `actions.csv`.
#[derive(Parser, Debug)]
#[command(name = "logflat", version, about)]
pub struct Cli {
    /// Path to the .ndjson log written by the agent (.zst archives are accepted)
    #[arg(value_name = "NDJSON")]
    input: PathBuf,

    /// Output directory (default: same as input)
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logflat=warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let opts = FlattenOptions {
        input: cli.input,
        out_dir: cli.out_dir,
    };

    match flatten::flatten(&opts) {
        Ok(outcome) => {
            if outcome.skipped > 0 {
                tracing::info!(skipped = outcome.skipped, "ignored unparsable lines");
            }
            println!("Wrote: {}", outcome.ticks_path.display());
            println!("Wrote: {}", outcome.actions_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
