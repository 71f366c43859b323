//! In-memory JSON array output.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use idpjson_common::{Error, Result};

const OPEN: &[u8] = b"[\n";
const SEPARATOR: &[u8] = b",\n";

/// How each element is laid out inside the array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    /// One element per line.
    #[default]
    Compact,
    /// Elements indented with two spaces.
    Pretty,
}

/// Encode `value` as JSON in the given layout, appending to `out`.
pub fn write_json<T: Serialize + ?Sized>(value: &T, layout: Layout, out: &mut Vec<u8>) -> Result<()> {
    let result = match layout {
        Layout::Compact => serde_json::to_writer(&mut *out, value),
        Layout::Pretty => {
            let mut serializer =
                Serializer::with_formatter(&mut *out, PrettyFormatter::with_indent(b"  "));
            value.serialize(&mut serializer)
        }
    };
    result.map_err(|e| Error::InvalidArgument(format!("cannot encode record: {}", e)))
}

/// A JSON array built one element at a time.
///
/// The buffer starts with the opening bracket; [`ArrayBuffer::finish`]
/// closes it and adds a trailing newline.
#[derive(Debug)]
pub struct ArrayBuffer {
    bytes: Vec<u8>,
    count: usize,
    layout: Layout,
}

impl ArrayBuffer {
    /// Create an empty array.
    pub fn new(layout: Layout) -> Self {
        Self {
            bytes: OPEN.to_vec(),
            count: 0,
            layout,
        }
    }

    /// Append one element produced by `encode`.
    ///
    /// If `encode` fails the buffer is left as it was before the call.
    pub fn push_with<F>(&mut self, encode: F) -> Result<()>
    where
        F: FnOnce(Layout, &mut Vec<u8>) -> Result<()>,
    {
        let mark = self.bytes.len();
        if self.count > 0 {
            self.bytes.extend_from_slice(SEPARATOR);
        }
        if let Err(e) = encode(self.layout, &mut self.bytes) {
            self.bytes.truncate(mark);
            return Err(e);
        }
        self.count += 1;
        Ok(())
    }

    /// Append an element verbatim.
    pub fn push_raw(&mut self, raw: &[u8]) {
        if self.count > 0 {
            self.bytes.extend_from_slice(SEPARATOR);
        }
        self.bytes.extend_from_slice(raw);
        self.count += 1;
    }

    /// Number of elements written so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Close the array and return the encoded bytes.
    pub fn finish(mut self) -> Vec<u8> {
        if self.count > 0 {
            self.bytes.push(b'\n');
        }
        self.bytes.extend_from_slice(b"]\n");
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_empty_array() {
        let buffer = ArrayBuffer::new(Layout::Compact);
        assert!(buffer.is_empty());
        assert_eq!(buffer.finish(), b"[\n]\n");
    }

    #[test]
    fn test_elements_one_per_line() {
        let mut buffer = ArrayBuffer::new(Layout::Compact);
        buffer
            .push_with(|layout, out| write_json(&json!({"id": "1"}), layout, out))
            .unwrap();
        buffer
            .push_with(|layout, out| write_json(&json!({"id": "2"}), layout, out))
            .unwrap();

        assert_eq!(buffer.len(), 2);
        let text = String::from_utf8(buffer.finish()).unwrap();
        assert_eq!(text, "[\n{\"id\":\"1\"},\n{\"id\":\"2\"}\n]\n");
    }

    #[test]
    fn test_pretty_layout_indents_two_spaces() {
        let mut buffer = ArrayBuffer::new(Layout::Pretty);
        buffer
            .push_with(|layout, out| write_json(&json!({"id": "1"}), layout, out))
            .unwrap();

        let text = String::from_utf8(buffer.finish()).unwrap();
        assert_eq!(text, "[\n{\n  \"id\": \"1\"\n}\n]\n");
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!([{"id": "1"}]));
    }

    #[test]
    fn test_failed_encode_leaves_buffer_unchanged() {
        let mut buffer = ArrayBuffer::new(Layout::Compact);
        buffer.push_raw(b"{\"id\":\"1\"}");

        let err = buffer
            .push_with(|_, out| {
                out.extend_from_slice(b"{\"partial");
                Err(Error::InvalidArgument("boom".to_string()))
            })
            .unwrap_err();

        assert!(err.to_string().contains("boom"));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.finish(), b"[\n{\"id\":\"1\"}\n]\n");
    }
}
