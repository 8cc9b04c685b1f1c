//! Streaming client for an optical motion tracker's REST telemetry API.
//!
//! The tracker exposes a small HTTP control surface and a chunked,
//! record-delimited telemetry stream of JSON pose frames. This crate wraps
//! both: control calls go through [`TrackerClient`], and a background
//! [`StreamPump`] worker consumes the telemetry stream into a concurrently
//! readable pose cache.
//!
//! # Architecture
//!
//! Telemetry flows one way through four stages:
//!
//! 1. **Transport**: `client` opens the stream and issues control calls.
//! 2. **Pump**: `stream` reads fixed-size chunks on a poll interval.
//! 3. **Decode**: `decode` splits chunks into records and parses frames;
//!    a malformed record is skipped, never fatal.
//! 4. **Cache**: the latest pose per target plus a bounded frame history,
//!    readable from any thread while the stream is live.
//!
//! Poses are cached in the device's left-handed frame; conversion to a
//! right-handed frame happens once, at the query boundary.
//!
//! # Module Structure
//!
//! - `client`: REST control surface and the public query API
//! - `config`: file/env configuration with device-recommended defaults
//! - `decode`: chunk splitting and per-record frame parsing
//! - `pose`: pose model and row-major transform math
//! - `stream`: the background read loop and its lifecycle

pub mod client;
pub mod config;
pub mod decode;
pub mod pose;
pub mod stream;

mod cache;
mod history;
mod index;
mod wire;

pub use client::TrackerClient;
pub use config::TrackerConfig;
pub use decode::{decode_chunk, DecodeError, DecodedChunk};
pub use pose::{TargetPose, TrackingFrame};
pub use stream::{ObserverId, PumpConfig, PumpState, StreamPump};
