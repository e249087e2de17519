//! Runlog codec.
//!
//! The runlog is the remote append-only operation log: UTF-8 text with one
//! JSON operation record per line. Blank lines are ignored. A line that does
//! not decode is skipped with a warning and never aborts the read.

use crate::error::ProtocolResult;
use crate::id::OperationId;
use crate::operation::Operation;
use std::collections::BTreeSet;

/// A decoded runlog.
#[derive(Debug, Clone, Default)]
pub struct Runlog {
    operations: Vec<Operation>,
    skipped: usize,
}

impl Runlog {
    /// Decodes runlog bytes, skipping malformed lines.
    pub fn decode(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut operations = Vec::new();
        let mut skipped = 0;

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match Operation::from_json(line) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        line = line_no + 1,
                        error = %e,
                        "skipping malformed runlog line"
                    );
                }
            }
        }

        Self {
            operations,
            skipped,
        }
    }

    /// Returns the decoded operations in log order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Consumes the runlog, returning its operations.
    #[must_use]
    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    /// Number of decoded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if no operation decoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of lines skipped as malformed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Returns the set of operation ids present.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<OperationId> {
        self.operations.iter().map(Operation::id).collect()
    }

    /// Returns the operations from `candidates` not yet present in this log.
    pub fn missing<'a>(&self, candidates: &'a [Operation]) -> Vec<&'a Operation> {
        let present = self.ids();
        candidates
            .iter()
            .filter(|op| !present.contains(&op.id()))
            .collect()
    }
}

/// Encodes one operation as a runlog line (no trailing newline).
pub fn encode_line(op: &Operation) -> ProtocolResult<String> {
    op.to_json()
}

/// Appends operations to existing runlog content.
///
/// New records are joined with `\n` and separated from non-empty existing
/// content by a single newline.
pub fn append_operations(existing: &[u8], ops: &[&Operation]) -> ProtocolResult<Vec<u8>> {
    let mut out = existing.to_vec();
    for op in ops {
        if !out.is_empty() && out.last() != Some(&b'\n') {
            out.push(b'\n');
        }
        out.extend_from_slice(encode_line(op)?.as_bytes());
    }
    Ok(out)
}
