//! Schema migration CLI commands.

use anyhow::Result;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use crate::state::AppState;

/// Converge the schema and report what happened.
///
/// Startup already ran the embedded migrations, so this reports that run and
/// then confirms a second pass has nothing left to do.
pub async fn migrate(state: &AppState, json: bool) -> Result<()> {
    let again = state.migrations.run().await?;
    let mut applied = state.startup_migrations.applied.clone();
    applied.extend(again.applied);

    if json {
        let result = serde_json::json!({
            "applied": applied,
            "current_version": again.current_version,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    if applied.is_empty() {
        println!(
            "  {} Schema is up to date (version {})",
            style("ok").green(),
            again.current_version,
        );
    } else {
        let versions: Vec<String> = applied.iter().map(i64::to_string).collect();
        println!(
            "  {} Applied migration(s) {}; schema now at version {}",
            style("ok").green(),
            versions.join(", "),
            again.current_version,
        );
    }
    println!();

    Ok(())
}

/// List applied migrations in version order.
pub async fn list_migrations(state: &AppState, json: bool) -> Result<()> {
    let history = state.migrations.history().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!();
        println!("  {} No migrations applied.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Version").fg(Color::White),
        Cell::new("Description").fg(Color::White),
        Cell::new("Applied").fg(Color::White),
        Cell::new("Checksum").fg(Color::White),
    ]);

    for record in &history {
        table.add_row(vec![
            Cell::new(record.version).fg(Color::Cyan),
            Cell::new(&record.description),
            Cell::new(record.applied_at.format("%Y-%m-%d %H:%M:%S")).fg(Color::DarkGrey),
            Cell::new(record.checksum.get(..12).unwrap_or(&record.checksum)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}
