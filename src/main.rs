use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use merge_relay::config::MergeSettings;
use merge_relay::external::ProcessCommandExecutor;
use merge_relay::git::GitWorkspace;
use merge_relay::github::GitHubClient;
use merge_relay::lock::WorkspaceLock;
use merge_relay::orchestrator::{MergeOrchestrator, RelayError, RunOutcome};
use merge_relay::telemetry::init_telemetry;

#[derive(Parser)]
#[command(name = "merge-relay")]
#[command(about = "Merge a source repository branch into a target repository")]
#[command(long_about = "Merge Relay merges a branch of a source repository into a branch of a \
                       target repository and pushes the result. When the merge conflicts, the \
                       conflicted merge is pushed to a merge-conflict-<hash> branch and a pull \
                       request is opened for a human to resolve it.")]
struct Cli {
    /// Configuration file (defaults to ./merge-relay.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one merge (default when no subcommand is given)
    Run,
    /// Validate configuration and print it with the token left out
    CheckConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => match settings.to_redacted_toml() {
            Ok(rendered) => {
                print!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ failed to render configuration: {e}");
                ExitCode::FAILURE
            }
        },
        Commands::Run => {
            if let Err(e) = init_telemetry(settings.log_format) {
                eprintln!("⚠️  logging unavailable: {e}");
            }

            match run_command(settings) {
                Ok(Ok(outcome)) => {
                    println!("✅ {outcome}");
                    ExitCode::SUCCESS
                }
                Ok(Err(e)) => {
                    error!(error = %e, "merge run failed");
                    eprintln!("❌ {e}");
                    ExitCode::from(e.exit_code())
                }
                Err(e) => {
                    eprintln!("❌ {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn load_settings(config_file: Option<&std::path::Path>) -> Result<MergeSettings, RelayError> {
    MergeSettings::load_env_file()?;
    Ok(MergeSettings::load(config_file)?)
}

/// The outer error covers the runtime itself; the inner one is the run's verdict
fn run_command(settings: MergeSettings) -> Result<Result<RunOutcome, RelayError>> {
    let runtime = tokio::runtime::Runtime::new()?;
    Ok(runtime.block_on(async { merge(settings).await }))
}

async fn merge(settings: MergeSettings) -> Result<RunOutcome, RelayError> {
    let mut lock = WorkspaceLock::for_working_copy(&settings.target_repo_path)?;
    let lock_path = lock.path().display().to_string();
    let _guard = lock.try_acquire()?;
    info!(lock = %lock_path, "workspace lock acquired");

    let pulls = GitHubClient::new(
        &settings.github_token,
        settings.github_api_url.as_deref(),
        settings.network_timeout,
    )
    .map_err(RelayError::client_setup)?;

    let repo = GitWorkspace::new(
        &settings.target_repo_path,
        Arc::new(ProcessCommandExecutor),
        settings.identity.clone(),
        settings.network_timeout,
    );

    let mut orchestrator = MergeOrchestrator::new(settings, repo, pulls);
    orchestrator.run().await
}
