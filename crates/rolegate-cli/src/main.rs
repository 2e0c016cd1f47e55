mod cli;
mod commands;
mod config;
mod observability;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use rolegate_authz::FileGrantStore;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    let cfg = config::load()?;
    observability::init_tracing_with_level(observability::level_for(
        cli.verbose,
        cfg.log_level.as_deref(),
    ));

    let format = cli.format.unwrap_or_default();
    let store = FileGrantStore::new(config::grant_path()?);

    match &cli.command {
        Commands::Login(args) => {
            commands::auth::login(&store, args)?;
        }
        Commands::Logout => {
            commands::auth::logout(&store)?;
        }
        Commands::Whoami => {
            commands::auth::whoami(&store)?;
        }
        Commands::Can(args) => {
            let source =
                commands::check::metadata_source(&cfg, &cli.server, cli.metadata.as_deref())?;
            let snapshot = commands::check::load_snapshot(&cfg, store, source).await?;
            return Ok(commands::check::can(
                &snapshot,
                &args.resource,
                &args.action,
                format,
            ));
        }
        Commands::Policies => {
            let source =
                commands::check::metadata_source(&cfg, &cli.server, cli.metadata.as_deref())?;
            let snapshot = commands::check::load_snapshot(&cfg, store, source).await?;
            commands::check::policies(&snapshot, format)?;
        }
    }

    Ok(0)
}
