//! Mutation commands.

use super::{open_store, CommandResult};
use serde_json::Value;
use std::path::Path;

/// Adds a security, optionally into a group.
pub fn add_security(
    path: &Path,
    symbol: &str,
    name: Option<&str>,
    group: Option<&str>,
) -> CommandResult {
    let store = open_store(path)?;
    let security = store.add_security(symbol, name)?;
    if let Some(group) = group {
        store.move_security_to_group(&security.id, Some(group))?;
    }
    println!("{}", security.id);
    Ok(())
}

/// Adds a note.
pub fn add_note(path: &Path, security_id: &str, content: &str) -> CommandResult {
    let note = open_store(path)?.add_note(security_id, content)?;
    println!("{}", note.id);
    Ok(())
}

/// Adds a group.
pub fn add_group(path: &Path, name: &str) -> CommandResult {
    let group = open_store(path)?.add_group(name)?;
    println!("{}", group.id);
    Ok(())
}

/// Deletes a security.
pub fn delete_security(path: &Path, id: &str) -> CommandResult {
    open_store(path)?.delete_security(id)?;
    Ok(())
}

/// Deletes a group.
pub fn delete_group(path: &Path, id: &str) -> CommandResult {
    open_store(path)?.delete_group(id)?;
    Ok(())
}

/// Moves a security.
pub fn move_security(path: &Path, security_id: &str, group_id: Option<&str>) -> CommandResult {
    open_store(path)?.move_security_to_group(security_id, group_id)?;
    Ok(())
}

/// Sets a setting.
pub fn set(path: &Path, key: &str, raw: &str) -> CommandResult {
    open_store(path)?.update_setting(key, parse_value(raw))?;
    Ok(())
}

/// Parses a setting value as JSON; anything else is kept as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
