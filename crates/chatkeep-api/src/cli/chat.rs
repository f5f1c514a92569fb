//! Message CLI commands: record, read back and clear a user's history.

use anyhow::{Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use chatkeep_core::repository::UserRepository;
use chatkeep_types::chat::{ChatMessage, MessageRole};

use crate::cli::user::not_found;
use crate::state::AppState;

/// Longest content shown in a table cell before truncation.
const PREVIEW_CHARS: usize = 80;

/// Record one message, creating the user on first use.
pub async fn say(
    state: &AppState,
    username: &str,
    content: &str,
    role: &str,
    provider: &str,
    json: bool,
) -> Result<()> {
    let user = state.conversation.start(username).await?;
    let message = state
        .conversation
        .record(user.id, provider, role, content)
        .await
        .with_context(|| format!("Failed to record message for '{username}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        println!();
        println!(
            "  {} Saved message #{} for '{}' ({}, {})",
            style("ok").green(),
            message.id,
            style(&user.username).cyan(),
            message.role,
            message.provider,
        );
        println!();
    }

    Ok(())
}

/// Print the most recent `limit` messages, oldest first.
pub async fn history(state: &AppState, username: &str, limit: u32, json: bool) -> Result<()> {
    let Some(user) = state.conversation.users().find_by_username(username).await? else {
        return not_found(username, json);
    };
    let messages = state.conversation.history(user.id, limit).await?;

    if json {
        let result = serde_json::json!({
            "user": user,
            "messages": messages,
            "count": messages.len(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!(
            "  {} No messages for '{}'.",
            style("i").blue().bold(),
            style(&user.username).cyan(),
        );
        println!(
            "     Add one with: chatkeep say {} <message>",
            user.username,
        );
        println!();
        return Ok(());
    }

    println!();
    println!(
        "  History for '{}' ({} messages)",
        style(&user.username).cyan(),
        messages.len(),
    );
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("When").fg(Color::White),
        Cell::new("Role").fg(Color::White),
        Cell::new("Provider").fg(Color::White),
        Cell::new("Content").fg(Color::White),
    ]);

    for message in &messages {
        table.add_row(message_row(message));
    }

    println!("{table}");
    println!();

    Ok(())
}

/// Delete every message of a user, keeping the user.
pub async fn clear(state: &AppState, username: &str, json: bool) -> Result<()> {
    let Some(user) = state.conversation.users().find_by_username(username).await? else {
        return not_found(username, json);
    };
    let removed = state.conversation.forget(user.id).await?;

    if json {
        let result = serde_json::json!({
            "username": user.username,
            "removed": removed,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} Removed {} message(s) for '{}'",
            style("ok").green(),
            removed,
            style(&user.username).cyan(),
        );
        println!();
    }

    Ok(())
}

fn message_row(message: &ChatMessage) -> Vec<Cell> {
    let role_color = match message.role {
        MessageRole::User => Color::Cyan,
        MessageRole::Assistant => Color::Green,
        MessageRole::System => Color::Yellow,
    };
    vec![
        Cell::new(message.timestamp.format("%Y-%m-%d %H:%M:%S")).fg(Color::DarkGrey),
        Cell::new(message.role).fg(role_color),
        Cell::new(message.provider),
        Cell::new(preview(&message.content)),
    ]
}

fn preview(content: &str) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() > PREVIEW_CHARS {
        let cut: String = single_line.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        single_line
    }
}
