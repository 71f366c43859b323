//! Streaming reader over a top-level JSON array.
//!
//! [`ElementReader`] walks the array token by token and hands out the raw
//! bytes of one element per call, so decoding a file never needs more than
//! one element in memory. Element contents are not validated here: a
//! malformed element still comes back as bytes, and the codec reports it.
//! Damage to the array structure itself (truncation, missing separators) is
//! an `InvalidData` I/O error and ends the stream.

use std::io::{self, BufRead};

use idpjson_common::{Error, Result};

/// Pull-based reader yielding the raw elements of a JSON array.
pub struct ElementReader<R> {
    reader: R,
    started: bool,
    finished: bool,
    count: usize,
}

impl<R: BufRead> ElementReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            started: false,
            finished: false,
            count: 0,
        }
    }

    /// Consume leading whitespace and the opening `[`.
    ///
    /// # Errors
    /// - `Decode` if the input does not start with an array
    /// - `Io` if the underlying reader fails
    pub fn begin(&mut self) -> Result<()> {
        match self.peek_significant()? {
            Some(b'[') => {
                self.reader.consume(1);
                self.started = true;
                Ok(())
            }
            Some(other) => Err(Error::Decode(format!(
                "invalid character '{}' looking for beginning of array",
                char::from(other)
            ))),
            None => Err(Error::Decode(
                "unexpected end of input looking for beginning of array".to_string(),
            )),
        }
    }

    /// Raw bytes of the next element, or `None` once the closing `]` has
    /// been consumed. Calls after the end keep returning `None`.
    pub fn next_element(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            self.begin()?;
        }

        let mut byte = self.require_significant()?;
        if self.count > 0 {
            match byte {
                b',' => {
                    self.reader.consume(1);
                    byte = self.require_significant()?;
                    if byte == b']' {
                        return Err(structural("unexpected ']' after ','".to_string()));
                    }
                }
                b']' => {}
                other => {
                    return Err(structural(format!(
                        "invalid character '{}' after array element {}",
                        char::from(other),
                        self.count
                    )));
                }
            }
        }

        if byte == b']' {
            self.reader.consume(1);
            self.finished = true;
            return Ok(None);
        }

        let element = self.scan_value()?;
        self.count += 1;
        Ok(Some(element))
    }

    /// Number of elements returned so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Copy one JSON value out of the input, tracking strings and nesting
    /// only far enough to find where it ends.
    fn scan_value(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let first = self.take_byte()?;
        out.push(first);

        match first {
            b'{' | b'[' => {
                let mut depth = 1usize;
                let mut in_string = false;
                let mut escaped = false;
                while depth > 0 {
                    let b = self.take_byte()?;
                    out.push(b);
                    if in_string {
                        if escaped {
                            escaped = false;
                        } else if b == b'\\' {
                            escaped = true;
                        } else if b == b'"' {
                            in_string = false;
                        }
                        continue;
                    }
                    match b {
                        b'"' => in_string = true,
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => depth -= 1,
                        _ => {}
                    }
                }
            }
            b'"' => {
                let mut escaped = false;
                loop {
                    let b = self.take_byte()?;
                    out.push(b);
                    if escaped {
                        escaped = false;
                    } else if b == b'\\' {
                        escaped = true;
                    } else if b == b'"' {
                        break;
                    }
                }
            }
            // Scalars run until the next delimiter, which is left unread.
            _ => {
                while let Some(b) = self.peek_byte()? {
                    if is_delimiter(b) {
                        break;
                    }
                    out.push(b);
                    self.reader.consume(1);
                }
            }
        }

        Ok(out)
    }

    fn peek_byte(&mut self) -> Result<Option<u8>> {
        loop {
            match self.reader.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    fn take_byte(&mut self) -> Result<u8> {
        let b = self
            .peek_byte()?
            .ok_or_else(|| structural("unexpected end of JSON input".to_string()))?;
        self.reader.consume(1);
        Ok(b)
    }

    fn peek_significant(&mut self) -> Result<Option<u8>> {
        while let Some(b) = self.peek_byte()? {
            if !b.is_ascii_whitespace() {
                return Ok(Some(b));
            }
            self.reader.consume(1);
        }
        Ok(None)
    }

    fn require_significant(&mut self) -> Result<u8> {
        self.peek_significant()?
            .ok_or_else(|| structural("unexpected end of JSON input".to_string()))
    }
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b',' | b']' | b'}')
}

fn structural(message: String) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, message))
}
