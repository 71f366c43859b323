//! Common error types for the JSON IdP plugin.
//!
//! Every error maps onto a small, fixed [`ErrorCode`] so the plugin host can
//! react to the kind of failure without parsing messages.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Machine-readable error classification handed to the plugin host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A required path field was blank.
    MissingPath,
    /// A path or its parent directory is absent.
    NotFound,
    /// A path component is not a directory, or a value is malformed.
    InvalidArgument,
    /// The OS denied the requested access.
    PermissionDenied,
    /// Malformed JSON or a record failing schema validation.
    Decode,
    /// Any other read, write or flush failure.
    Io,
    /// The configuration has the wrong shape.
    InvalidConfig,
}

impl ErrorCode {
    /// Stable identifier for the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingPath => "missing_path",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::Decode => "decode",
            ErrorCode::Io => "io",
            ErrorCode::InvalidConfig => "invalid_config",
        }
    }

    /// gRPC status number the host reports for this code.
    pub fn status(&self) -> u32 {
        match self {
            ErrorCode::MissingPath
            | ErrorCode::InvalidArgument
            | ErrorCode::Decode
            | ErrorCode::InvalidConfig => 3,
            ErrorCode::NotFound => 5,
            ErrorCode::PermissionDenied => 7,
            ErrorCode::Io => 13,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for plugin operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Required path field was blank.
    #[error("no json file '{field}' name was provided")]
    MissingPath {
        /// Configuration field that was empty.
        field: &'static str,
    },

    /// Path or parent directory does not exist.
    #[error("'{}' doesn't exist: {source}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Invalid input provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Insufficient OS permission.
    #[error("cannot access '{}': {reason}", path.display())]
    PermissionDenied { path: PathBuf, reason: String },

    /// A single element failed to decode. The stream stays usable.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Decode failures collected while loading a whole file.
    #[error("{} element(s) failed to decode: {}", .0.len(), join_messages(.0))]
    DecodeBatch(Vec<Error>),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration value of the wrong shape.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Map an OS error raised while touching `path` onto the taxonomy.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                path: path.to_path_buf(),
                source,
            },
            io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: path.to_path_buf(),
                reason: source.to_string(),
            },
            _ => Error::Io(source),
        }
    }

    /// Classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::MissingPath { .. } => ErrorCode::MissingPath,
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Error::Decode(_) | Error::DecodeBatch(_) => ErrorCode::Decode,
            Error::Io(_) => ErrorCode::Io,
            Error::InvalidConfig(_) => ErrorCode::InvalidConfig,
        }
    }

    /// Whether the current session can no longer make progress.
    ///
    /// Only decode failures are recoverable: the caller may keep reading.
    /// This describes errors from an open session. A failed `open` leaves no
    /// session behind whatever its code, including a `Decode` for a source
    /// that is not a JSON array.
    pub fn is_fatal(&self) -> bool {
        self.code() != ErrorCode::Decode
    }
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
