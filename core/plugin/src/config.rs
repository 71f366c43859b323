//! Plugin configuration and its host-facing descriptor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use idpjson_common::{Error, OperationKind, Result};
use idpjson_records::Layout;
use idpjson_storage::PathValidator;

/// Configuration field holding the source path.
pub const FROM_FILE: &str = "from_file";

/// Configuration field holding the destination path.
pub const TO_FILE: &str = "to_file";

/// Human-readable plugin description shown by the host.
pub const DESCRIPTION: &str = "JSON plugin";

/// Which record codec a session uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Typed user schema.
    #[default]
    Typed,
    /// Untyped JSON objects, passed through as-is.
    Raw,
}

impl RecordFormat {
    /// Name of the codec implementing this format.
    pub fn codec_name(&self) -> &'static str {
        match self {
            RecordFormat::Typed => "user",
            RecordFormat::Raw => "raw",
        }
    }
}

/// Plugin configuration supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    /// Source file for read and delete.
    pub from_file: PathBuf,
    /// Destination file for write.
    pub to_file: PathBuf,
    /// Record codec selection.
    pub format: RecordFormat,
    /// Indent records with two spaces instead of one record per line.
    pub pretty: bool,
}

impl PluginConfig {
    /// Configuration reading from `path`.
    pub fn source(path: impl Into<PathBuf>) -> Self {
        Self {
            from_file: path.into(),
            ..Self::default()
        }
    }

    /// Configuration writing to `path`.
    pub fn destination(path: impl Into<PathBuf>) -> Self {
        Self {
            to_file: path.into(),
            ..Self::default()
        }
    }

    /// Parse configuration values handed over by the host.
    ///
    /// # Errors
    /// - `InvalidConfig` if the value is not an object of known fields with
    ///   the right types
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Path a session for `op` works on: the source for read and delete
    /// (delete rewrites its source in place), the destination for write.
    pub fn target(&self, op: OperationKind) -> &Path {
        match op {
            OperationKind::Read | OperationKind::Delete => &self.from_file,
            OperationKind::Write => &self.to_file,
        }
    }

    /// Check that the configured path can serve `op`.
    pub fn validate(&self, op: OperationKind) -> Result<()> {
        self.validate_with(&PathValidator::new(), op)
    }

    /// Same as [`PluginConfig::validate`] with a specific validator.
    pub fn validate_with(&self, validator: &PathValidator, op: OperationKind) -> Result<()> {
        let field = match op {
            OperationKind::Read | OperationKind::Delete => FROM_FILE,
            OperationKind::Write => TO_FILE,
        };
        validator.validate(self.target(op), field, op)
    }

    pub fn layout(&self) -> Layout {
        if self.pretty {
            Layout::Pretty
        } else {
            Layout::Compact
        }
    }
}

/// One configuration field as presented in the host's configuration UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigField {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: &'static str,
    pub mode: &'static str,
    pub readonly: bool,
    pub sensitive: bool,
}

impl ConfigField {
    fn attribute(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: "attribute",
            mode: "normal",
            readonly: false,
            sensitive: false,
        }
    }
}

/// Description of the plugin's configuration surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDescriptor {
    pub description: &'static str,
    pub fields: Vec<ConfigField>,
}

impl ConfigDescriptor {
    pub fn new() -> Self {
        Self {
            description: DESCRIPTION,
            fields: vec![
                ConfigField::attribute(FROM_FILE, "JSON file path to read users from"),
                ConfigField::attribute(TO_FILE, "JSON file path to write users to"),
            ],
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&ConfigField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl Default for ConfigDescriptor {
    fn default() -> Self {
        Self::new()
    }
}
