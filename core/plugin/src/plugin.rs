//! Host-facing plugin contract.

use serde_json::Value;

use crate::adapter::JsonAdapter;
use crate::config::{ConfigDescriptor, PluginConfig, RecordFormat};
use crate::stats::Stats;
use idpjson_common::{Error, OperationKind, Result, VersionInfo};
use idpjson_records::{RawCodec, RecordCodec, User, UserCodec};

/// Operations the plugin host drives.
///
/// A host validates the configuration, opens one session, issues calls for
/// that session's operation and closes it. Calls for a different operation
/// than the open one fail with `InvalidArgument`.
pub trait Plugin {
    type Record;

    /// Configuration fields the host should present.
    fn config_descriptor(&self) -> ConfigDescriptor {
        ConfigDescriptor::new()
    }

    /// Build information of this plugin.
    fn version(&self) -> &'static VersionInfo {
        idpjson_common::version()
    }

    /// Start a session.
    ///
    /// Any error leaves the plugin closed, so `is_fatal` does not apply here.
    ///
    /// # Errors
    /// - `InvalidArgument` if a session is already open
    /// - `NotFound` / `PermissionDenied` / `Io` if the source cannot be opened
    /// - `Decode` if the source is not a JSON array
    fn open(&mut self, config: &PluginConfig, op: OperationKind) -> Result<()>;

    /// Next record, or `None` at end of stream.
    ///
    /// # Errors
    /// - `Decode` for one bad element; reading may continue
    /// - `Io` if the file is structurally damaged
    fn read(&mut self) -> Result<Option<Self::Record>>;

    /// Queue a record for the output file.
    fn write(&mut self, record: Self::Record) -> Result<()>;

    /// Soft-delete the record with identifier `id`.
    fn delete(&mut self, id: &str) -> Result<()>;

    /// End the session and flush any output.
    fn close(&mut self) -> Result<Option<Stats>>;
}

impl<C: RecordCodec> Plugin for JsonAdapter<C> {
    type Record = C::Record;

    fn open(&mut self, config: &PluginConfig, op: OperationKind) -> Result<()> {
        JsonAdapter::open(self, config, op)
    }

    fn read(&mut self) -> Result<Option<C::Record>> {
        JsonAdapter::read(self)
    }

    fn write(&mut self, record: C::Record) -> Result<()> {
        JsonAdapter::write(self, &record)
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        JsonAdapter::delete(self, id)
    }

    fn close(&mut self) -> Result<Option<Stats>> {
        JsonAdapter::close(self)
    }
}

/// Plugin over the typed user schema.
pub type JsonPlugin = JsonAdapter<UserCodec>;

/// Plugin passing records through as untyped JSON objects.
pub type RawPlugin = JsonAdapter<RawCodec>;

/// Plugin chosen from [`PluginConfig::format`].
///
/// Records cross this surface as `serde_json::Value` so a host can stay
/// agnostic of the configured format.
pub enum SelectedPlugin {
    Typed(JsonPlugin),
    Raw(RawPlugin),
}

impl SelectedPlugin {
    /// Closed plugin matching the configured format.
    pub fn for_config(config: &PluginConfig) -> Self {
        match config.format {
            RecordFormat::Typed => SelectedPlugin::Typed(JsonPlugin::default()),
            RecordFormat::Raw => SelectedPlugin::Raw(RawPlugin::default()),
        }
    }

    pub fn format(&self) -> RecordFormat {
        match self {
            SelectedPlugin::Typed(_) => RecordFormat::Typed,
            SelectedPlugin::Raw(_) => RecordFormat::Raw,
        }
    }

    /// Operation of the open session, if any.
    pub fn operation(&self) -> Option<OperationKind> {
        match self {
            SelectedPlugin::Typed(plugin) => plugin.operation(),
            SelectedPlugin::Raw(plugin) => plugin.operation(),
        }
    }
}

impl Plugin for SelectedPlugin {
    type Record = Value;

    fn open(&mut self, config: &PluginConfig, op: OperationKind) -> Result<()> {
        match self {
            SelectedPlugin::Typed(plugin) => plugin.open(config, op),
            SelectedPlugin::Raw(plugin) => plugin.open(config, op),
        }
    }

    fn read(&mut self) -> Result<Option<Value>> {
        match self {
            SelectedPlugin::Typed(plugin) => match plugin.read()? {
                Some(user) => serde_json::to_value(user)
                    .map(Some)
                    .map_err(|e| Error::InvalidArgument(format!("cannot encode record: {}", e))),
                None => Ok(None),
            },
            SelectedPlugin::Raw(plugin) => Ok(plugin.read()?.map(Value::Object)),
        }
    }

    fn write(&mut self, record: Value) -> Result<()> {
        match self {
            SelectedPlugin::Typed(plugin) => {
                let user: User = serde_json::from_value(record)
                    .map_err(|e| Error::InvalidArgument(format!("not a user record: {}", e)))?;
                plugin.write(&user)
            }
            SelectedPlugin::Raw(plugin) => match record {
                Value::Object(map) => plugin.write(&map),
                _ => Err(Error::InvalidArgument(
                    "raw records must be JSON objects".to_string(),
                )),
            },
        }
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        match self {
            SelectedPlugin::Typed(plugin) => plugin.delete(id),
            SelectedPlugin::Raw(plugin) => plugin.delete(id),
        }
    }

    fn close(&mut self) -> Result<Option<Stats>> {
        match self {
            SelectedPlugin::Typed(plugin) => plugin.close(),
            SelectedPlugin::Raw(plugin) => plugin.close(),
        }
    }
}
