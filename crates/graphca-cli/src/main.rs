mod cli;
mod commands;
mod output;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use graphca_config::load_provider_config;
use graphca_provider::{Diagnostic, Provider};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let format = cli.output;
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<Diagnostic>() {
                Some(diag) => commands::report_diagnostic(diag, format),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_provider_config(cli.config.as_deref())
        .context("Failed to load provider configuration")?;
    let provider = Provider::from_config(&config);
    let format = cli.output;

    match cli.command {
        Command::Create { manifest } => commands::create(&provider, &manifest, format).await,
        Command::Read { kind, id } => commands::read(&provider, kind, &id, format).await,
        Command::Update { kind, id, manifest } => {
            commands::update(&provider, kind, &id, &manifest, format).await
        }
        Command::Delete { kind, id } => commands::delete(&provider, kind, &id, format).await,
        Command::Import { kind, id } => commands::import(&provider, kind, &id, format).await,
        Command::List { kind } => commands::list(&provider, kind, format).await,
        Command::Validate { path } => commands::validate(&provider, &path, format),
    }
}
