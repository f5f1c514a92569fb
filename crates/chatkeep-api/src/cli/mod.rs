//! CLI command definitions for the `chatkeep` binary.
//!
//! Uses clap derive macros for argument parsing. Every command accepts the
//! global `--json` flag for machine-readable output.

pub mod chat;
pub mod schema;
pub mod user;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use chatkeep_core::service::conversation::DEFAULT_HISTORY_LIMIT;

/// Inspect and manage stored chat history.
#[derive(Parser)]
#[command(name = "chatkeep", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides the config file and DATABASE_PATH).
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Config file to read.
    #[arg(long, global = true, default_value = chatkeep_infra::config::CONFIG_FILE_NAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bring the database schema up to date and report what was applied.
    Migrate,

    /// List applied schema migrations.
    Migrations,

    /// Manage users.
    User {
        #[command(subcommand)]
        action: user::UserCommand,
    },

    /// Record a message for a user (created on first use).
    Say {
        /// Username (case-insensitive).
        username: String,

        /// Message text.
        content: String,

        /// Author role: user, assistant or system.
        #[arg(long, default_value = "user")]
        role: String,

        /// Provider the message belongs to: ollama, openrouter or zai.
        #[arg(long, default_value = "ollama")]
        provider: String,
    },

    /// Show a user's most recent messages, oldest first.
    History {
        /// Username (case-insensitive).
        username: String,

        /// Maximum number of messages.
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: u32,
    },

    /// Delete every message of a user, keeping the user.
    Clear {
        /// Username (case-insensitive).
        username: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn say_defaults_role_and_provider() {
        let cli = Cli::try_parse_from(["chatkeep", "say", "bob", "hi there"]).unwrap();
        match cli.command {
            Commands::Say {
                username,
                content,
                role,
                provider,
            } => {
                assert_eq!(username, "bob");
                assert_eq!(content, "hi there");
                assert_eq!(role, "user");
                assert_eq!(provider, "ollama");
            }
            _ => panic!("expected say"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "chatkeep",
            "history",
            "bob",
            "--limit",
            "5",
            "--json",
            "--database",
            "/tmp/x.db",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(cli.command, Commands::History { limit: 5, .. }));
    }
}
