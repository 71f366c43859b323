//! Session state machine over a JSON array file.
//!
//! An adapter moves `Closed → Read | Write | Delete → Closed`. Each open
//! session owns its file handle or output buffer; `close` consumes the
//! session and performs the final write, if any.

use chrono::Utc;
use std::fs::File;
use std::io::BufReader;
use std::mem;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::PluginConfig;
use crate::stats::Stats;
use idpjson_common::{Error, OperationKind, Result};
use idpjson_records::{ArrayBuffer, ElementReader, Layout, RecordCodec};
use idpjson_storage::write_atomic;

type FileElements = ElementReader<BufReader<File>>;

/// An element loaded for a delete. Elements the codec rejects are kept
/// verbatim so the rewrite never drops them.
enum Entry<R> {
    Decoded(R),
    Opaque(Vec<u8>),
}

struct ReadSession {
    elements: FileElements,
    source: PathBuf,
    stats: Stats,
}

struct WriteSession {
    buffer: ArrayBuffer,
    destination: PathBuf,
    stats: Stats,
}

struct DeleteSession<R> {
    elements: FileElements,
    source: PathBuf,
    layout: Layout,
    loaded: Option<Vec<Entry<R>>>,
    stats: Stats,
}

enum Session<R> {
    Closed,
    Read(ReadSession),
    Write(WriteSession),
    Delete(DeleteSession<R>),
}

impl<R> Session<R> {
    fn operation(&self) -> Option<OperationKind> {
        match self {
            Session::Closed => None,
            Session::Read(_) => Some(OperationKind::Read),
            Session::Write(_) => Some(OperationKind::Write),
            Session::Delete(_) => Some(OperationKind::Delete),
        }
    }
}

/// Plugin adapter reading and writing records of codec `C`.
///
/// The adapter trusts that the host validated the configuration, but every
/// I/O failure is still reported. Calls on one adapter must come from a
/// single caller in `open`, `read`/`write`/`delete`, `close` order.
pub struct JsonAdapter<C: RecordCodec> {
    codec: C,
    session: Session<C::Record>,
}

impl<C: RecordCodec> JsonAdapter<C> {
    /// Create a closed adapter.
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            session: Session::Closed,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Operation of the open session, if any.
    pub fn operation(&self) -> Option<OperationKind> {
        self.session.operation()
    }

    pub fn is_open(&self) -> bool {
        self.operation().is_some()
    }

    /// Start a session for `op`.
    ///
    /// # Postconditions
    /// - Write: an empty output buffer exists; the filesystem is untouched
    /// - Read/Delete: the source is open and its `[` consumed
    ///
    /// # Errors
    /// - `InvalidArgument` if a session is already open
    /// - `InvalidConfig` if the configured format does not match the codec
    /// - `NotFound` / `PermissionDenied` / `Io` if the source cannot be opened
    /// - `Decode` if the source does not start with a JSON array; unlike a
    ///   decode error from `read` this ends the attempt and the adapter
    ///   stays closed
    pub fn open(&mut self, config: &PluginConfig, op: OperationKind) -> Result<()> {
        if let Some(current) = self.operation() {
            return Err(Error::InvalidArgument(format!(
                "session already open for {}",
                current
            )));
        }
        if config.format.codec_name() != self.codec.name() {
            return Err(Error::InvalidConfig(format!(
                "format '{}' cannot be served by the {} codec",
                config.format.codec_name(),
                self.codec.name()
            )));
        }

        let path = config.target(op).to_path_buf();
        self.session = match op {
            OperationKind::Write => Session::Write(WriteSession {
                buffer: ArrayBuffer::new(config.layout()),
                destination: path,
                stats: Stats::default(),
            }),
            OperationKind::Read => Session::Read(ReadSession {
                elements: open_elements(&path)?,
                source: path,
                stats: Stats::default(),
            }),
            OperationKind::Delete => Session::Delete(DeleteSession {
                elements: open_elements(&path)?,
                source: path,
                layout: config.layout(),
                loaded: None,
                stats: Stats::default(),
            }),
        };

        debug!(
            "Opened {} session on {} with {} codec",
            op,
            config.target(op).display(),
            self.codec.name()
        );
        Ok(())
    }

    /// Decode the next record, or `None` at the end of the array.
    ///
    /// A `Decode` error covers only the current element; calling `read`
    /// again continues with the next one.
    pub fn read(&mut self) -> Result<Option<C::Record>> {
        let session = match &mut self.session {
            Session::Read(session) => session,
            _ => return Err(not_open(OperationKind::Read)),
        };

        let Some(raw) = session.elements.next_element()? else {
            debug!(
                "End of stream for {} after {} record(s)",
                session.source.display(),
                session.stats.read
            );
            return Ok(None);
        };

        let index = session.elements.count() - 1;
        match self.codec.decode(&raw) {
            Ok(record) => {
                session.stats.read += 1;
                Ok(Some(record))
            }
            Err(e) => {
                session.stats.decode_errors += 1;
                let e = at_element(index, e);
                warn!("Skipping element in {}: {}", session.source.display(), e);
                Err(e)
            }
        }
    }

    /// Append a record to the output. Nothing is written until `close`.
    pub fn write(&mut self, record: &C::Record) -> Result<()> {
        let session = match &mut self.session {
            Session::Write(session) => session,
            _ => return Err(not_open(OperationKind::Write)),
        };

        let codec = &self.codec;
        session
            .buffer
            .push_with(|layout, out| codec.encode(record, layout, out))?;
        session.stats.written += 1;
        Ok(())
    }

    /// Soft-delete every record whose identifier is `id`.
    ///
    /// The first call loads the whole source. Elements that fail to decode
    /// are reported together as one `DecodeBatch` error after the load and
    /// the marking have both completed; an unknown `id` is not an error,
    /// an empty one is `InvalidArgument`.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        // Records without an identifier decode with an empty one; an empty
        // `id` would mark every one of them.
        if id.is_empty() {
            return Err(Error::InvalidArgument(
                "cannot delete a record without an identifier".to_string(),
            ));
        }
        let session = match &mut self.session {
            Session::Delete(session) => session,
            _ => return Err(not_open(OperationKind::Delete)),
        };

        let mut load_errors = Vec::new();
        if session.loaded.is_none() {
            let (entries, errors) = load_all(&self.codec, &mut session.elements)?;
            debug!(
                "Loaded {} element(s) from {}",
                entries.len(),
                session.source.display()
            );
            session.stats.read += entries.len() - errors.len();
            session.stats.decode_errors += errors.len();
            session.loaded = Some(entries);
            load_errors = errors;
        }

        let now = Utc::now();
        let mut marked = 0;
        for entry in session.loaded.iter_mut().flatten() {
            if let Entry::Decoded(record) = entry {
                if self.codec.identifier(record) == Some(id) {
                    self.codec.mark_deleted(record, now);
                    marked += 1;
                }
            }
        }
        session.stats.deleted += marked;

        if marked == 0 {
            debug!("No record with id {} in {}", id, session.source.display());
        } else {
            debug!("Marked {} deleted in {}", id, session.source.display());
        }

        if load_errors.is_empty() {
            Ok(())
        } else {
            Err(Error::DecodeBatch(load_errors))
        }
    }

    /// End the session, writing the output for write and delete sessions.
    ///
    /// Returns the session statistics for write and delete, `None` for read
    /// or when no session is open.
    ///
    /// # Errors
    /// - `NotFound` / `PermissionDenied` / `Io` if the output cannot be
    ///   written; the previous file content is left in place
    pub fn close(&mut self) -> Result<Option<Stats>> {
        match mem::replace(&mut self.session, Session::Closed) {
            Session::Closed => Ok(None),
            Session::Read(session) => {
                debug!(
                    "Closed read session on {} ({})",
                    session.source.display(),
                    session.stats
                );
                Ok(None)
            }
            Session::Write(session) => {
                let WriteSession {
                    buffer,
                    destination,
                    stats,
                } = session;
                write_atomic(&destination, &buffer.finish())?;
                info!("Wrote {} ({})", destination.display(), stats);
                Ok(Some(stats))
            }
            Session::Delete(session) => {
                let DeleteSession {
                    elements,
                    source,
                    layout,
                    loaded,
                    mut stats,
                } = session;
                drop(elements);

                let Some(entries) = loaded else {
                    debug!("Nothing loaded from {}, leaving it untouched", source.display());
                    return Ok(Some(stats));
                };

                let mut buffer = ArrayBuffer::new(layout);
                for entry in &entries {
                    match entry {
                        Entry::Decoded(record) => {
                            buffer.push_with(|layout, out| self.codec.encode(record, layout, out))?
                        }
                        Entry::Opaque(raw) => buffer.push_raw(raw),
                    }
                }
                stats.written = buffer.len();
                write_atomic(&source, &buffer.finish())?;
                info!("Rewrote {} ({})", source.display(), stats);
                Ok(Some(stats))
            }
        }
    }
}

impl<C: RecordCodec + Default> Default for JsonAdapter<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C: RecordCodec> Drop for JsonAdapter<C> {
    fn drop(&mut self) {
        if let Some(op) = self.operation() {
            warn!("Dropping plugin with an open {} session; pending output is discarded", op);
        }
    }
}

fn open_elements(path: &Path) -> Result<FileElements> {
    let file = File::open(path).map_err(|e| Error::from_io(path, e))?;
    let mut elements = ElementReader::new(BufReader::new(file));
    elements.begin()?;
    Ok(elements)
}

/// Read every remaining element. Decode failures are collected, not fatal.
fn load_all<C: RecordCodec>(
    codec: &C,
    elements: &mut FileElements,
) -> Result<(Vec<Entry<C::Record>>, Vec<Error>)> {
    let mut entries = Vec::new();
    let mut errors = Vec::new();

    while let Some(raw) = elements.next_element()? {
        let index = elements.count() - 1;
        match codec.decode(&raw) {
            Ok(record) => entries.push(Entry::Decoded(record)),
            Err(e) => {
                warn!("Keeping undecodable element {} as-is: {}", index, e);
                errors.push(at_element(index, e));
                entries.push(Entry::Opaque(raw));
            }
        }
    }

    Ok((entries, errors))
}

fn at_element(index: usize, error: Error) -> Error {
    match error {
        Error::Decode(message) => Error::Decode(format!("element {}: {}", index, message)),
        other => other,
    }
}

fn not_open(op: OperationKind) -> Error {
    Error::InvalidArgument(format!("no {} session is open", op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use idpjson_common::ErrorCode;
    use idpjson_records::{RawCodec, User, UserCodec};
    use serde_json::Value;
    use std::fs;
    use tempfile::TempDir;

    const TWO_USERS: &str = r#"[
{"id":"1","display_name":"First","email":"first@example.com"},
{"id":"2","display_name":"Second","email":"second@example.com"}
]
"#;

    fn fixture(temp: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = temp.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn parse(path: &Path) -> Vec<Value> {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_open_write_does_not_touch_filesystem() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.json");
        let mut adapter = JsonAdapter::new(UserCodec);

        adapter
            .open(&PluginConfig::destination(&path), OperationKind::Write)
            .unwrap();

        assert_eq!(adapter.operation(), Some(OperationKind::Write));
        assert!(!path.exists());
        adapter.close().unwrap();
    }

    #[test]
    fn test_open_read_missing_file() {
        let temp = TempDir::new().unwrap();
        let mut adapter = JsonAdapter::new(UserCodec);

        let err = adapter
            .open(
                &PluginConfig::source(temp.path().join("test.json")),
                OperationKind::Read,
            )
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(!adapter.is_open());
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = fixture(&temp, "users.json", TWO_USERS);
        let mut adapter = JsonAdapter::new(UserCodec);
        let config = PluginConfig::source(&path);

        adapter.open(&config, OperationKind::Read).unwrap();
        let err = adapter.open(&config, OperationKind::Read).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_open_rejects_mismatched_format() {
        let temp = TempDir::new().unwrap();
        let path = fixture(&temp, "users.json", TWO_USERS);
        let mut config = PluginConfig::source(&path);
        config.format = crate::config::RecordFormat::Raw;

        let mut adapter = JsonAdapter::new(UserCodec);
        let err = adapter.open(&config, OperationKind::Read).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfig);
    }

    #[test]
    fn test_failed_open_leaves_no_session() {
        let temp = TempDir::new().unwrap();
        let path = fixture(&temp, "users.json", "{\"users\": []}");
        let mut adapter = JsonAdapter::new(UserCodec);

        let err = adapter
            .open(&PluginConfig::source(&path), OperationKind::Read)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Decode);

        assert!(!adapter.is_open());
        assert_eq!(adapter.read().unwrap_err().code(), ErrorCode::InvalidArgument);
        adapter
            .open(&PluginConfig::source(&path), OperationKind::Delete)
            .unwrap_err();
        assert_eq!(adapter.operation(), None);
    }

    #[test]
    fn test_delete_empty_id_is_rejected() {
        let temp = TempDir::new().unwrap();
        let content = "[\n{\"display_name\":\"No Id\"},\n{\"id\":\"2\"}\n]\n";
        let path = fixture(&temp, "users.json", content);
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::source(&path), OperationKind::Delete)
            .unwrap();

        let err = adapter.delete("").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        let stats = adapter.close().unwrap().unwrap();

        assert_eq!(stats.deleted, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_calls_outside_matching_session() {
        let mut adapter = JsonAdapter::new(UserCodec);

        assert_eq!(adapter.read().unwrap_err().code(), ErrorCode::InvalidArgument);
        assert_eq!(
            adapter.write(&User::default()).unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(adapter.delete("1").unwrap_err().code(), ErrorCode::InvalidArgument);
        assert_eq!(adapter.close().unwrap(), None);
    }

    #[test]
    fn test_read_past_end_stays_at_end() {
        let temp = TempDir::new().unwrap();
        let path = fixture(&temp, "users.json", TWO_USERS);
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::source(&path), OperationKind::Read)
            .unwrap();

        assert_eq!(adapter.read().unwrap().unwrap().id, "1");
        assert_eq!(adapter.read().unwrap().unwrap().id, "2");
        assert!(adapter.read().unwrap().is_none());
        assert!(adapter.read().unwrap().is_none());
        assert_eq!(adapter.close().unwrap(), None);
    }

    #[test]
    fn test_write_n_records() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.json");
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::destination(&path), OperationKind::Write)
            .unwrap();

        let users: Vec<User> = (0..5)
            .map(|i| User::new(i.to_string(), format!("User {}", i), ""))
            .collect();
        for user in &users {
            adapter.write(user).unwrap();
        }
        let stats = adapter.close().unwrap().unwrap();

        assert_eq!(stats.written, 5);
        let elements = parse(&path);
        assert_eq!(elements.len(), 5);
        for (element, user) in elements.into_iter().zip(&users) {
            let decoded: User = serde_json::from_value(element).unwrap();
            assert_eq!(&decoded, user);
        }
    }

    #[test]
    fn test_write_nothing_produces_empty_array() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.json");
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::destination(&path), OperationKind::Write)
            .unwrap();

        adapter.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[\n]\n");
    }

    #[test]
    fn test_pretty_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.json");
        let mut config = PluginConfig::destination(&path);
        config.pretty = true;
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter.open(&config, OperationKind::Write).unwrap();

        adapter.write(&User::new("1", "Test Name", "")).unwrap();
        adapter.close().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[\n{\n  \"id\": \"1\",\n  \"display_name\": \"Test Name\"\n}\n]\n"
        );
    }

    #[test]
    fn test_close_write_to_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gone").join("out.json");
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::destination(&path), OperationKind::Write)
            .unwrap();
        adapter.write(&User::new("1", "", "")).unwrap();

        let err = adapter.close().unwrap_err();
        assert!(err.is_fatal());
        assert!(!adapter.is_open());
    }

    #[test]
    fn test_delete_marks_only_matching_record() {
        let temp = TempDir::new().unwrap();
        let path = fixture(&temp, "users.json", TWO_USERS);
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::source(&path), OperationKind::Delete)
            .unwrap();

        adapter.delete("2").unwrap();
        let stats = adapter.close().unwrap().unwrap();

        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.written, 2);
        let users: Vec<User> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(users.len(), 2);
        assert!(!users[0].deleted);
        assert_eq!(users[0].metadata, None);
        assert!(users[1].deleted);
        assert!(users[1].metadata.unwrap().deleted_at.is_some());
        assert!(users.iter().all(User::is_consistent));
    }

    #[test]
    fn test_delete_absent_id_is_noop() {
        let temp = TempDir::new().unwrap();
        let path = fixture(&temp, "users.json", TWO_USERS);
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::source(&path), OperationKind::Delete)
            .unwrap();

        adapter.delete("404").unwrap();
        let stats = adapter.close().unwrap().unwrap();

        assert_eq!(stats.deleted, 0);
        let users: Vec<User> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert!(users.iter().all(|u| !u.deleted));
    }

    #[test]
    fn test_deletes_accumulate() {
        let temp = TempDir::new().unwrap();
        let path = fixture(&temp, "users.json", TWO_USERS);
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::source(&path), OperationKind::Delete)
            .unwrap();

        adapter.delete("1").unwrap();
        adapter.delete("2").unwrap();
        adapter.close().unwrap();

        let users: Vec<User> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert!(users.iter().all(|u| u.deleted));
    }

    #[test]
    fn test_delete_without_calls_leaves_file() {
        let temp = TempDir::new().unwrap();
        let path = fixture(&temp, "users.json", TWO_USERS);
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::source(&path), OperationKind::Delete)
            .unwrap();

        adapter.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), TWO_USERS);
    }

    #[test]
    fn test_delete_keeps_undecodable_elements() {
        let temp = TempDir::new().unwrap();
        let content = r#"[
{"id":"1","identities":{"x":{"kind":99}}},
{"id":"2","display_name":"Second"}
]"#;
        let path = fixture(&temp, "users.json", content);
        let mut adapter = JsonAdapter::new(UserCodec);
        adapter
            .open(&PluginConfig::source(&path), OperationKind::Delete)
            .unwrap();

        let err = adapter.delete("2").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Decode);
        assert!(err.to_string().contains("element 0"));
        adapter.delete("1").unwrap();
        let stats = adapter.close().unwrap().unwrap();

        assert_eq!(stats.decode_errors, 1);
        let elements = parse(&path);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0]["identities"]["x"]["kind"], 99);
        assert!(elements[0].get("deleted").is_none());
        assert_eq!(elements[1]["deleted"], true);
    }

    #[test]
    fn test_raw_codec_session() {
        let temp = TempDir::new().unwrap();
        let content = r#"[{"id":"a","custom":[1,2,3]},{"id":"b","nickname":"bee"}]"#;
        let path = fixture(&temp, "users.json", content);
        let mut config = PluginConfig::source(&path);
        config.format = crate::config::RecordFormat::Raw;

        let mut adapter = JsonAdapter::new(RawCodec);
        adapter.open(&config, OperationKind::Delete).unwrap();
        adapter.delete("b").unwrap();
        adapter.close().unwrap();

        let elements = parse(&path);
        assert_eq!(elements[0]["custom"], serde_json::json!([1, 2, 3]));
        assert_eq!(elements[1]["nickname"], "bee");
        assert_eq!(elements[1]["deleted"], true);
        assert!(elements[1]["metadata"]["deleted_at"].is_string());
    }
}
