//! Line-delimited JSON record streams shared by the record and replay drivers.
//!
//! Every stream is a sequence of [`RecordEntry`] lines with strictly
//! increasing sequence numbers. Ordinary outputs are stored in their native
//! JSON encoding; failures are stored as opaque base64 blobs under the
//! [`EXCEPTION_TAG`] type tag.

#[cfg(test)]
#[path = "record_test.rs"]
mod record_test;

use std::cmp::Ordering;
use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Type tag marking an entry whose contents are an opaque serialized failure.
pub const EXCEPTION_TAG: &str = "exception";

/// Errors from reading or writing record streams. All of these are fatal to
/// the run they occur in.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    /// The underlying IO sink or source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// An entry could not be encoded or decoded.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// The stream ended before the requested sequence number.
    #[error("record stream ended before sequence number {0}")]
    UnexpectedEof(u64),
    /// The requested sequence number was skipped in the stream.
    #[error("missed sequence number: wanted {wanted}, found {found}")]
    MissedSequence {
        #[allow(missing_docs)]
        wanted: u64,
        #[allow(missing_docs)]
        found: u64,
    },
    /// An entry carried a different type tag than the reader expected.
    #[error("type tag mismatch at entry {number}: wanted {wanted}, found {found}")]
    TagMismatch {
        #[allow(missing_docs)]
        number: u64,
        #[allow(missing_docs)]
        wanted: String,
        #[allow(missing_docs)]
        found: String,
    },
    /// The entry holds a failure recorded from the original run.
    #[error("entry {number} holds a recorded failure: {message}")]
    RecordedFailure {
        #[allow(missing_docs)]
        number: u64,
        #[allow(missing_docs)]
        message: String,
    },
    /// A failure entry could not be decoded back into a message.
    #[error("entry {number} holds a malformed failure payload")]
    MalformedFailure {
        #[allow(missing_docs)]
        number: u64,
    },
}

/// One line of a record stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    /// Strictly increasing per stream.
    pub number: u64,
    /// Type tag of the contents, or [`EXCEPTION_TAG`].
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Native JSON encoding of the recorded value.
    pub contents: serde_json::Value,
}

impl RecordEntry {
    /// Decode the contents, enforcing the expected type tag. A recorded
    /// failure surfaces as [`RecordError::RecordedFailure`] regardless of the
    /// expected tag.
    pub fn decode<T: DeserializeOwned>(&self, expected_tag: &str) -> Result<T, RecordError> {
        if self.type_tag == EXCEPTION_TAG {
            return Err(self.decode_failure());
        }
        if self.type_tag != expected_tag {
            return Err(RecordError::TagMismatch {
                number: self.number,
                wanted: expected_tag.to_string(),
                found: self.type_tag.clone(),
            });
        }
        Ok(serde_json::from_value(self.contents.clone())?)
    }

    fn decode_failure(&self) -> RecordError {
        let Some(encoded) = self.contents.as_str() else {
            return RecordError::MalformedFailure { number: self.number };
        };
        let Ok(decoded) = base64::decode(encoded) else {
            return RecordError::MalformedFailure { number: self.number };
        };
        match String::from_utf8(decoded) {
            Ok(message) => RecordError::RecordedFailure { number: self.number, message },
            Err(_) => RecordError::MalformedFailure { number: self.number },
        }
    }
}

/// Appends entries to one stream. The sequence counter lives in the writer,
/// so each stream numbers its entries independently.
pub struct RecordWriter<W: Write> {
    io: W,
    number: u64,
}

impl<W: Write> RecordWriter<W> {
    /// A writer starting at sequence number zero.
    pub fn new(io: W) -> Self {
        Self { io, number: 0 }
    }

    /// Record an ordinary value under the given type tag. Returns the
    /// sequence number assigned to the entry.
    pub fn write_value<T: Serialize>(
        &mut self,
        type_tag: &str,
        value: &T,
    ) -> Result<u64, RecordError> {
        let contents = serde_json::to_value(value)?;
        self.write_entry(type_tag.to_string(), contents)
    }

    /// Record a failure as an opaque base64 blob under [`EXCEPTION_TAG`].
    pub fn write_failure(&mut self, message: &str) -> Result<u64, RecordError> {
        let contents = serde_json::Value::String(base64::encode(message));
        self.write_entry(EXCEPTION_TAG.to_string(), contents)
    }

    fn write_entry(
        &mut self,
        type_tag: String,
        contents: serde_json::Value,
    ) -> Result<u64, RecordError> {
        let entry = RecordEntry { number: self.number, type_tag, contents };
        serde_json::to_writer(&mut self.io, &entry)?;
        self.io.write_all(b"\n")?;
        self.io.flush()?;
        self.number += 1;
        Ok(entry.number)
    }
}

/// Reads entries from one stream, front to back. Readers only scan forward;
/// asking for a sequence number that was already passed is an error.
pub struct RecordReader<R: BufRead> {
    io: R,
}

impl<R: BufRead> RecordReader<R> {
    /// A reader positioned at the start of the stream.
    pub fn new(io: R) -> Self {
        Self { io }
    }

    /// The next entry, or `None` at the end of the stream. A blank line
    /// terminates the stream.
    pub fn next_entry(&mut self) -> Result<Option<RecordEntry>, RecordError> {
        let mut line = String::new();
        if self.io.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            return Ok(None);
        }
        let entry: RecordEntry = serde_json::from_str(&line)?;
        Ok(Some(entry))
    }

    /// Scan forward to the entry with the given sequence number.
    pub fn read_at(&mut self, number: u64) -> Result<RecordEntry, RecordError> {
        loop {
            let entry = self.next_entry()?.ok_or(RecordError::UnexpectedEof(number))?;
            match entry.number.cmp(&number) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(entry),
                Ordering::Greater => {
                    return Err(RecordError::MissedSequence {
                        wanted: number,
                        found: entry.number,
                    });
                }
            }
        }
    }
}
