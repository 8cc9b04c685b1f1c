//! Telemetry chunk decoding.
//!
//! A chunk is whatever one stream read returned: zero, one, or several
//! records, possibly cut mid-record at either end. Decoding is pure and
//! total; framing noise and partial records are skipped, individual parse
//! failures are collected instead of aborting the chunk.

use std::fmt;

use crate::pose::TrackingFrame;
use crate::wire::TrackerDataEnvelope;

/// Every telemetry record begins with this literal. Candidates without it
/// are stream framing or mid-record fragments, not errors.
pub const RECORD_PREFIX: &str = "{\"TrackerData\":";

/// Stream framing markers treated as record separators.
const RECORD_SEPARATOR_CRLF: &str = "\r\n";
const RECORD_SEPARATOR_SSE: &str = "data: ";

const ERROR_SNIPPET_CHARS: usize = 48;

// ----------------------------------------------------------------------------
// DecodeError
// ----------------------------------------------------------------------------

/// Parse failure for one record within a chunk. Non-fatal; the rest of the
/// chunk is still decoded.
#[derive(Debug)]
pub struct DecodeError {
    snippet: String,
    source: serde_json::Error,
}

impl DecodeError {
    fn new(record: &str, source: serde_json::Error) -> Self {
        Self {
            snippet: record.chars().take(ERROR_SNIPPET_CHARS).collect(),
            source,
        }
    }

    /// Head of the record that failed to parse, for log lines.
    pub fn record_snippet(&self) -> &str {
        &self.snippet
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed tracker record starting {:?}: {}",
            self.snippet, self.source
        )
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

// ----------------------------------------------------------------------------
// Chunk decoding
// ----------------------------------------------------------------------------

/// Outcome of decoding one chunk: parsed frames in input order plus the
/// per-record failures encountered along the way.
#[derive(Debug, Default)]
pub struct DecodedChunk {
    pub frames: Vec<TrackingFrame>,
    pub errors: Vec<DecodeError>,
}

/// Decode one raw chunk of stream text.
///
/// The chunk is split on the CRLF and SSE `data: ` framing markers, empty
/// candidates are dropped, and only candidates bearing [`RECORD_PREFIX`] are
/// parsed. A record split across two reads fails the prefix or parse check
/// in both halves and is dropped; the stream buffer is sized so that rarely
/// happens.
pub fn decode_chunk(chunk: &str) -> DecodedChunk {
    let mut decoded = DecodedChunk::default();
    for record in split_records(chunk) {
        if !record.starts_with(RECORD_PREFIX) {
            continue;
        }
        match serde_json::from_str::<TrackerDataEnvelope>(record) {
            Ok(envelope) => decoded.frames.push(envelope.into_frame()),
            Err(err) => decoded.errors.push(DecodeError::new(record, err)),
        }
    }
    decoded
}

fn split_records(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split(RECORD_SEPARATOR_CRLF)
        .flat_map(|part| part.split(RECORD_SEPARATOR_SSE))
        .filter(|part| !part.is_empty())
}
