// Jellyship plugin release tool
// Main entry point for the jellyship binary

use clap::Parser;
use jellyship_engine::cli::{Cli, Command};
use jellyship_engine::config::Config;
use jellyship_engine::handlers::{
    handle_build, handle_deploy, handle_next_version, handle_release, handle_status, OutputFormat,
};
use jellyship_engine::telemetry::init_telemetry_with_level;
use sdk::errors::{DeployError, DeployErrorExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        if let Some(deploy_error) = e.downcast_ref::<DeployError>() {
            eprintln!("Hint: {}", deploy_error.user_hint());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!(
        "Jellyship v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Build { version } => handle_build(version, &config, format).await,
        Command::Deploy { version, branch } => {
            handle_deploy(version, branch, &config, format).await
        }
        Command::Release { version } => handle_release(version, &config, format).await,
        Command::NextVersion => handle_next_version(&config, format).await,
        Command::Status => handle_status(&config, format).await,
    }
}
