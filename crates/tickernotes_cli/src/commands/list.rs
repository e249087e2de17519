//! List command implementation.

use super::{open_store, CommandResult};
use std::path::Path;

/// Runs the list command.
pub fn run(path: &Path, format: &str) -> CommandResult {
    let store = open_store(path)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&store.snapshot_data())?);
        return Ok(());
    }

    let tables = store.tables();
    for group in tables.groups.values() {
        println!("[{}] {}", group.id, group.name);
        for security in tables.securities_in(&group.id) {
            print_security(&tables, security);
        }
    }

    let ungrouped: Vec<_> = tables
        .securities
        .values()
        .filter(|s| s.group_id.as_ref().map_or(true, |g| !tables.groups.contains_key(g)))
        .collect();
    if !ungrouped.is_empty() {
        println!("[ungrouped]");
        for security in ungrouped {
            print_security(&tables, security);
        }
    }

    if !tables.settings.is_empty() {
        println!("Settings:");
        for (key, value) in &tables.settings {
            println!("  {key} = {value}");
        }
    }
    Ok(())
}

fn print_security(
    tables: &tickernotes_core::EntityTables,
    security: &tickernotes_protocol::Security,
) {
    let active = if security.is_active { "" } else { " (inactive)" };
    match &security.name {
        Some(name) => println!("  {} {} - {}{}", security.id, security.symbol, name, active),
        None => println!("  {} {}{}", security.id, security.symbol, active),
    }
    for note in tables.notes_for(&security.id) {
        println!("    - {} {}", note.id, note.content);
    }
}
