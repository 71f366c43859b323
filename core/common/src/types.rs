//! Common types used throughout the plugin.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of session the host opens the plugin for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Stream records out of the source file.
    Read,
    /// Collect records and write them to the destination file.
    Write,
    /// Soft-delete records in the source file, rewriting it in place.
    Delete,
}

impl OperationKind {
    /// Whether the session decodes an existing file.
    pub fn reads_source(&self) -> bool {
        matches!(self, OperationKind::Read | OperationKind::Delete)
    }

    /// Whether closing the session writes a file.
    pub fn writes_file(&self) -> bool {
        matches!(self, OperationKind::Write | OperationKind::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
