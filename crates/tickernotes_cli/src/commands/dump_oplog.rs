//! Dump oplog command implementation.

use super::{open_store, CommandResult};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tickernotes_protocol::{Operation, Runlog};
use tickernotes_storage::{DirRemoteStore, RemoteLogStore};

/// Where to read operations from.
pub enum Source {
    /// The local operation log of a store directory.
    Local(PathBuf),
    /// The runlog of a remote directory.
    Remote(PathBuf),
}

/// Operation record representation for output.
#[derive(Debug, Serialize)]
pub struct OperationInfo {
    /// Operation id (`device-seq`).
    pub id: String,
    /// Recording time.
    pub ts: String,
    /// Operation kind.
    pub op: String,
    /// Whether the operation has been uploaded (local log only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced: Option<bool>,
    /// Payload.
    pub data: Value,
}

/// Runs the dump-oplog command.
pub fn run(source: &Source, limit: Option<usize>, format: &str) -> CommandResult {
    let (ops, local, skipped) = match source {
        Source::Local(path) => (open_store(path)?.local_operations(), true, 0),
        Source::Remote(path) => {
            let remote = DirRemoteStore::open(path)?;
            let runlog = Runlog::decode(&remote.read_log()?);
            let skipped = runlog.skipped();
            (runlog.into_operations(), false, skipped)
        }
    };

    let records = ops
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|op| describe(op, local))
        .collect::<Result<Vec<_>, _>>()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records, skipped);
        }
    }

    Ok(())
}

fn describe(op: &Operation, local: bool) -> CommandResult<OperationInfo> {
    Ok(OperationInfo {
        id: op.id().to_string(),
        ts: op.ts.to_string(),
        op: op.op_name().to_string(),
        synced: local.then_some(op.synced),
        data: op.kind.to_payload()?,
    })
}

fn print_text_output(records: &[OperationInfo], skipped: usize) {
    println!("Operations ({} total)", records.len());
    println!("================");
    if skipped > 0 {
        println!("({skipped} malformed lines skipped)");
    }
    println!();

    for record in records {
        print!("{:24} {:24} {:24}", record.ts, record.id, record.op);
        match record.synced {
            Some(true) => print!(" synced"),
            Some(false) => print!(" pending"),
            None => {}
        }
        println!(" {}", record.data);
    }
}
