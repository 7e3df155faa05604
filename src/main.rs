//! Consensus Crowd CLI
//!
//! Command-line interface for generating crowd-voice audio.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use consensus_crowd::cli::{commands, Cli, Commands};
use consensus_crowd::CrowdError;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Consensus Crowd v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd).inspect_err(print_suggestions),
        None => {
            println!("Consensus Crowd v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn print_suggestions(err: &anyhow::Error) {
    if let Some(err) = err.downcast_ref::<CrowdError>() {
        for suggestion in err.recovery_suggestions() {
            eprintln!("hint: {}", suggestion);
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Generate {
            input,
            output,
            speech,
            cache_dir,
            no_cache,
            crowd,
        } => {
            commands::generate(&input, &output, speech, cache_dir.as_deref(), no_cache, &crowd)
                .with_context(|| format!("generating crowds from {}", input.display()))?;
        }
        Commands::Counts { input, crowd } => {
            commands::counts(&input, &crowd)
                .with_context(|| format!("reading {}", input.display()))?;
        }
        Commands::Crowd {
            input,
            size,
            output,
            no_jitter,
            crowd,
        } => {
            commands::crowd(&input, size, &output, !no_jitter, &crowd)
                .with_context(|| format!("rendering crowd from {}", input.display()))?;
        }
        Commands::Mix {
            first,
            second,
            output,
            crowd,
        } => {
            commands::mix(&first, &second, &output, &crowd).with_context(|| {
                format!("mixing {} and {}", first.display(), second.display())
            })?;
        }
    }
    Ok(())
}
