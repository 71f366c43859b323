//! Common utilities and types shared across the JSON IdP plugin crates.
//!
//! This module provides the error taxonomy reported to the plugin host,
//! the operation kinds a session can be opened for, and the process-wide
//! version descriptor.

pub mod error;
pub mod types;
pub mod version;

pub use error::{Error, ErrorCode, Result};
pub use types::OperationKind;
pub use version::{version, VersionInfo};
