//! Per-session operation statistics.

use serde::Serialize;
use std::fmt;

/// Counters collected between `open` and `close`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Records decoded successfully.
    pub read: usize,
    /// Records written to the output file.
    pub written: usize,
    /// Records marked deleted.
    pub deleted: usize,
    /// Elements that failed to decode.
    pub decode_errors: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read={} written={} deleted={} decode_errors={}",
            self.read, self.written, self.deleted, self.decode_errors
        )
    }
}
