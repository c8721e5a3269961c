//! Record Decoder
//!
//! Turns the body of an open stream connection into a sequence of
//! [`StreamRecord`]s without ever holding more than the record currently
//! being assembled.
//!
//! The body is an unbounded sequence of JSON objects, separated by `\r\n` in
//! practice but accepted with any (or no) whitespace between them. Chunk
//! boundaries are arbitrary: a record may span several chunks and one chunk
//! may hold several records. Bytes are appended to a buffer and scanned once
//! for the end of the value at its front; the complete value is parsed and
//! the read offset moves past exactly the bytes it occupied. Decoded bytes
//! are dropped from the buffer at most once per chunk.
//!
//! `max_record_bytes` bounds every record, complete or still arriving.
//!
//! When the connection is idle the server sends bare `\r\n` heartbeats; a
//! whitespace-only chunk arriving between records is reported as
//! [`Decoded::KeepAlive`] so the caller gets a chance to look at its
//! cancellation state.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::StreamConfig;
use crate::error::DecodeError;
use crate::models::StreamRecord;

/// How many leading bytes of rejected input go into the error
const SNIPPET_LEN: usize = 120;

/// One step of decoding
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// A complete record
    Record(StreamRecord),
    /// A heartbeat with no record
    KeepAlive,
    /// The connection ended cleanly between records
    End,
}

/// Incremental decoder over a byte stream
pub struct RecordDecoder<S> {
    source: S,
    buffer: Vec<u8>,
    /// Start of the undecoded bytes in `buffer`
    start: usize,
    scan: ValueScan,
    exhausted: bool,
    max_record_bytes: usize,
    idle_timeout: Option<Duration>,
}

/// Tracks where the JSON value at the front of the buffer ends
///
/// Bytes are scanned once as they arrive, so a record spread over many
/// chunks is parsed a single time, when its closing brace shows up.
#[derive(Debug, Default)]
struct ValueScan {
    /// Next byte to scan, relative to the decoder's `start`
    offset: usize,
    depth: u32,
    in_string: bool,
    escaped: bool,
}

impl ValueScan {
    /// Advance over `bytes`; returns the length of the first complete value
    fn advance(&mut self, bytes: &[u8]) -> Option<usize> {
        while self.offset < bytes.len() {
            let b = bytes[self.offset];
            self.offset += 1;

            if self.in_string {
                match b {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(self.offset);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl<S> RecordDecoder<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    /// Create a decoder reading from `source`
    pub fn new(source: S, config: &StreamConfig) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            start: 0,
            scan: ValueScan::default(),
            exhausted: false,
            max_record_bytes: config.max_record_bytes,
            idle_timeout: config.idle_timeout(),
        }
    }

    /// Number of bytes read but not yet decoded
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Decode the next unit from the stream
    ///
    /// # Errors
    ///
    /// Any error is fatal: the position inside the byte stream cannot be
    /// recovered, so the caller must stop reading.
    pub async fn next(&mut self) -> Result<Decoded, DecodeError> {
        loop {
            if let Some(record) = self.decode_buffered()? {
                return Ok(Decoded::Record(record));
            }

            if self.exhausted {
                return if self.pending_bytes() == 0 {
                    Ok(Decoded::End)
                } else {
                    Err(self.incomplete_at_end())
                };
            }

            match self.read_chunk().await? {
                Some(chunk) => {
                    if self.pending_bytes() == 0 && chunk.iter().all(u8::is_ascii_whitespace) {
                        if chunk.is_empty() {
                            continue;
                        }
                        return Ok(Decoded::KeepAlive);
                    }
                    self.compact();
                    self.buffer.extend_from_slice(&chunk);
                }
                None => self.exhausted = true,
            }
        }
    }

    async fn read_chunk(&mut self) -> Result<Option<Bytes>, DecodeError> {
        let next = match self.idle_timeout {
            Some(idle) => tokio::time::timeout(idle, self.source.next())
                .await
                .map_err(|_| DecodeError::Stalled(idle))?,
            None => self.source.next().await,
        };
        Ok(next.transpose()?)
    }

    /// Drop decoded bytes from the front of the buffer
    fn compact(&mut self) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
    }

    /// Decode one value off the front of the buffer, if a complete one is there
    fn decode_buffered(&mut self) -> Result<Option<StreamRecord>, DecodeError> {
        if self.scan.offset == 0 {
            let skipped = self.buffer[self.start..]
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            self.start += skipped;
        }

        let pending = &self.buffer[self.start..];
        if pending.is_empty() {
            self.buffer.clear();
            self.start = 0;
            return Ok(None);
        }

        let len = match pending.first() {
            Some(b'{' | b'[') => match self.scan.advance(pending) {
                Some(len) => len,
                None => {
                    return if pending.len() > self.max_record_bytes {
                        Err(self.too_large(pending.len()))
                    } else {
                        Ok(None)
                    };
                }
            },
            // Not an object: let the parser report what it is
            _ => pending.len(),
        };
        if len > self.max_record_bytes {
            return Err(self.too_large(len));
        }

        let value = &pending[..len];
        let record = serde_json::from_slice::<StreamRecord>(value).map_err(|source| {
            DecodeError::Malformed {
                snippet: snippet(value),
                source,
            }
        })?;
        self.start += len;
        self.scan = ValueScan::default();

        if record.is_empty() {
            return Err(DecodeError::EmptyRecord);
        }
        Ok(Some(record))
    }

    /// Classify bytes left over when the source ran out
    fn incomplete_at_end(&self) -> DecodeError {
        let pending = &self.buffer[self.start..];
        match serde_json::from_slice::<serde_json::Value>(pending) {
            Err(source) if !source.is_eof() => DecodeError::Malformed {
                snippet: snippet(pending),
                source,
            },
            _ => DecodeError::Truncated {
                pending: pending.len(),
            },
        }
    }

    fn too_large(&self, size: usize) -> DecodeError {
        DecodeError::RecordTooLarge {
            size,
            limit: self.max_record_bytes,
        }
    }
}

fn snippet(buffer: &[u8]) -> String {
    let end = buffer.len().min(SNIPPET_LEN);
    String::from_utf8_lossy(&buffer[..end]).into_owned()
}
