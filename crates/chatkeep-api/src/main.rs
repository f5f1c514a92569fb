//! Chatkeep CLI entry point.
//!
//! Binary name: `chatkeep`
//!
//! Parses CLI arguments, loads configuration, opens (and migrates) the
//! database, then dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;

use chatkeep_infra::config::{apply_env_overrides, load_config};
use chatkeep_types::config::{AppConfig, LoggingConfig};
use chatkeep_observe::TracingOptions;
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Tracing goes up before anything that can warn. A config that fails to
    // load still leaves the logging section at its defaults.
    let loaded = load_config(&cli.config).await;
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    chatkeep_observe::init_tracing(&tracing_options(&cli, &logging))
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let mut config = loaded.unwrap_or_else(|err| {
        tracing::warn!("{err}, using defaults");
        AppConfig::default()
    });
    apply_env_overrides(&mut config);
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }

    tracing::debug!(
        config = %cli.config.display(),
        database = %config.database.path.display(),
        "Configuration loaded"
    );

    // Initialize application state (DB, migrations, services)
    let state = AppState::init(&config).await?;

    let result = run(cli.command, &state, cli.json).await;

    state.db.close().await;
    chatkeep_observe::shutdown_tracing();
    result
}

/// Log filter from CLI verbosity, output format from the logging config.
fn tracing_options(cli: &Cli, logging: &LoggingConfig) -> TracingOptions {
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,chatkeep_core=debug,chatkeep_infra=debug",
        _ => "trace",
    };
    TracingOptions {
        json: logging.json,
        otel: logging.otel,
        default_filter: filter.to_string(),
    }
}

async fn run(command: Commands, state: &AppState, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => cli::schema::migrate(state, json).await,
        Commands::Migrations => cli::schema::list_migrations(state, json).await,
        Commands::User { action } => cli::user::handle_user_command(action, state, json).await,
        Commands::Say {
            username,
            content,
            role,
            provider,
        } => cli::chat::say(state, &username, &content, &role, &provider, json).await,
        Commands::History { username, limit } => {
            cli::chat::history(state, &username, limit, json).await
        }
        Commands::Clear { username } => cli::chat::clear(state, &username, json).await,
    }
}
