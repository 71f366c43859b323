//! JSON file adapter for the identity-provider plugin host.
//!
//! The host opens a session for one operation, streams records through it
//! and closes it:
//!
//! - read: `open` → `read`* → `close`, one record per call
//! - write: `open` → `write`* → `close`, the file is written on close
//! - delete: `open` → `delete`* → `close`, records are soft-deleted and the
//!   source file is rewritten in place
//!
//! Paths are checked with [`PluginConfig::validate`] before `open`.

pub mod adapter;
pub mod config;
pub mod logging;
pub mod plugin;
pub mod stats;

pub use adapter::JsonAdapter;
pub use config::{ConfigDescriptor, ConfigField, PluginConfig, RecordFormat};
pub use plugin::{JsonPlugin, Plugin, RawPlugin, SelectedPlugin};
pub use stats::Stats;

pub use idpjson_common::{Error, ErrorCode, OperationKind, Result};
pub use idpjson_records::{RawRecord, User};
