//! User CLI subcommands.

use anyhow::Result;
use clap::Subcommand;
use console::style;

use chatkeep_core::repository::{MessageRepository, UserRepository};
use chatkeep_types::user::User;

use crate::state::AppState;

/// User subcommands.
#[derive(Subcommand)]
pub enum UserCommand {
    /// Show a user and how many messages they have.
    Show {
        /// Username (case-insensitive).
        username: String,
    },

    /// Create a user unless one already exists under any casing.
    Ensure {
        /// Username; the first casing seen is kept for display.
        username: String,
    },

    /// Delete a user and all of their messages.
    #[command(alias = "rm")]
    Delete {
        /// Username (case-insensitive).
        username: String,
    },
}

/// Handle a user subcommand.
pub async fn handle_user_command(cmd: UserCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        UserCommand::Show { username } => show_user(state, &username, json).await,
        UserCommand::Ensure { username } => ensure_user(state, &username, json).await,
        UserCommand::Delete { username } => delete_user(state, &username, json).await,
    }
}

async fn show_user(state: &AppState, username: &str, json: bool) -> Result<()> {
    let Some(user) = state.conversation.users().find_by_username(username).await? else {
        return not_found(username, json);
    };
    let messages = state.conversation.messages().count_by_user(user.id).await?;

    if json {
        let result = serde_json::json!({
            "user": user,
            "messages": messages,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_user(&user);
        println!("  {:<10} {}", style("Messages").dim(), messages);
        println!();
    }

    Ok(())
}

async fn ensure_user(state: &AppState, username: &str, json: bool) -> Result<()> {
    let user = state.conversation.start(username).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        print_user(&user);
    }

    Ok(())
}

async fn delete_user(state: &AppState, username: &str, json: bool) -> Result<()> {
    let deleted = state.conversation.remove_user(username).await?;

    if json {
        let result = serde_json::json!({
            "username": username,
            "deleted": deleted,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if deleted {
        println!();
        println!(
            "  {} Deleted '{}' and their messages",
            style("ok").green(),
            style(username).cyan(),
        );
        println!();
    } else {
        return not_found(username, false);
    }

    Ok(())
}

fn print_user(user: &User) {
    println!();
    println!("  {}", style(&user.username).cyan().bold());
    println!("  {:<10} {}", style("Id").dim(), user.id);
    println!(
        "  {:<10} {}",
        style("Created").dim(),
        user.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {:<10} {}",
        style("Updated").dim(),
        user.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

/// Report a missing user. Not an error: the lookup itself succeeded.
pub(crate) fn not_found(username: &str, json: bool) -> Result<()> {
    if json {
        let result = serde_json::json!({
            "username": username,
            "found": false,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} No user named '{}'.",
            style("i").blue().bold(),
            style(username).cyan(),
        );
        println!();
    }
    Ok(())
}
