//! Stream pump: the background telemetry read loop.
//!
//! The pump is responsible for:
//! - Owning the device's continuous response body for one streaming session
//! - Reading fixed-size chunks on a poll interval
//! - Handing chunks to the decoder and applying frames to the shared cache
//! - Notifying raw-chunk observers for diagnostics
//!
//! The pump MUST NOT:
//! - Reconnect on its own after a read failure
//! - Reassemble records split across two reads
//! - Block queries while a read is in flight
//!
//! Lifecycle is `Idle -> Streaming -> Stopped`; a stopped pump restarts only
//! through an explicit `start` with a fresh stream. Stopping is cooperative:
//! the flag is observed between reads, so shutdown can lag by one
//! read-plus-processing cycle, and callers wanting a prompt stop should
//! close the device stream first so a pending read returns.

use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cache::TrackingCache;
use crate::decode::decode_chunk;
use crate::pose::{TargetPose, TrackingFrame};

// ----------------------------------------------------------------------------
// Configuration and state
// ----------------------------------------------------------------------------

/// Read-loop tuning.
#[derive(Clone, Debug)]
pub struct PumpConfig {
    /// Bytes per read. Sized so one read usually contains one whole record;
    /// a record split across reads is dropped, not reassembled.
    pub buffer_size: usize,
    /// Pause between reads.
    pub poll_interval: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            buffer_size: 4096,
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Pump lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpState {
    /// No streaming session has run yet.
    Idle,
    /// The worker is reading the stream.
    Streaming,
    /// The last session ended, by request or read failure.
    Stopped,
}

/// Handle for detaching a previously registered chunk observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserverId(u64);

type ChunkObserver = Box<dyn Fn(&str) + Send>;

#[derive(Default)]
struct ObserverRegistry {
    next_id: u64,
    observers: Vec<(u64, ChunkObserver)>,
}

impl ObserverRegistry {
    fn add(&mut self, observer: ChunkObserver) -> ObserverId {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.push((id, observer));
        ObserverId(id)
    }

    fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id.0);
        self.observers.len() != before
    }

    fn notify(&self, chunk: &str) {
        for (_, observer) in &self.observers {
            observer(chunk);
        }
    }
}

// ----------------------------------------------------------------------------
// StreamPump
// ----------------------------------------------------------------------------

/// Owns the streaming session worker and the shared tracking cache.
///
/// Queries are non-blocking with respect to the read loop and may be called
/// from any thread; they copy values out of the cache under a short lock.
pub struct StreamPump {
    config: PumpConfig,
    cache: Arc<Mutex<TrackingCache>>,
    observers: Arc<Mutex<ObserverRegistry>>,
    state: Arc<Mutex<PumpState>>,
    worker: Option<JoinHandle<()>>,
}

impl StreamPump {
    pub fn new(config: PumpConfig, history_capacity: usize) -> Self {
        Self {
            config,
            cache: Arc::new(Mutex::new(TrackingCache::new(history_capacity))),
            observers: Arc::new(Mutex::new(ObserverRegistry::default())),
            state: Arc::new(Mutex::new(PumpState::Idle)),
            worker: None,
        }
    }

    pub fn state(&self) -> PumpState {
        let Ok(state) = self.state.lock() else {
            log::error!("pump state lock poisoned");
            return PumpState::Stopped;
        };
        *state
    }

    /// Begin a streaming session over `stream`.
    ///
    /// No-op (with a log line) when a session is already streaming. The
    /// worker takes exclusive ownership of the stream and drops it when the
    /// loop exits. The cache persists across sessions, so poses accumulate
    /// over restarts. If a previous session's worker is still finishing its
    /// last read, this blocks until it has exited.
    pub fn start<R: Read + Send + 'static>(&mut self, stream: R) {
        if self.state() == PumpState::Streaming {
            log::info!("tracker data stream is already being processed");
            return;
        }
        // The previous session (if any) sees a non-Streaming state and exits
        // within one cycle; two workers must never run at once.
        self.join_worker();

        if let Ok(mut state) = self.state.lock() {
            *state = PumpState::Streaming;
        }
        let config = self.config.clone();
        let cache = Arc::clone(&self.cache);
        let observers = Arc::clone(&self.observers);
        let state = Arc::clone(&self.state);
        self.worker = Some(thread::spawn(move || {
            run_read_loop(stream, config, cache, observers, state)
        }));
        log::debug!(
            "tracker stream started (buffer {} bytes, poll {:?})",
            self.config.buffer_size,
            self.config.poll_interval
        );
    }

    /// Signal the read loop to exit after its current read. Idempotent; does
    /// not wait for the worker.
    pub fn request_stop(&self) {
        let Ok(mut state) = self.state.lock() else {
            log::error!("pump state lock poisoned");
            return;
        };
        if *state == PumpState::Streaming {
            *state = PumpState::Stopped;
            log::debug!("tracker stream stop requested");
        }
    }

    /// Signal the read loop to exit and wait for the worker to finish.
    pub fn stop(&mut self) {
        self.request_stop();
        self.join_worker();
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("tracker stream worker panicked");
            }
        }
    }

    /// Register a callback invoked on the worker thread with each chunk's
    /// raw text. Callbacks should be quick and must not panic.
    pub fn add_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&str) + Send + 'static,
    {
        // A callback panic poisons this lock but leaves the registry itself
        // consistent, so recover the guard rather than failing registration.
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(Box::new(observer))
    }

    /// Detach an observer. Returns false when the id is unknown.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Latest device-frame pose for an exact target name; the sentinel
    /// default pose when the name is unknown.
    pub fn latest_pose_by_name(&self, name: &str) -> TargetPose {
        let Ok(cache) = self.cache.lock() else {
            log::error!("tracking cache lock poisoned");
            return TargetPose::default();
        };
        cache.pose_by_name(name)
    }

    /// Latest device-frame pose for a target id; the sentinel default pose
    /// when the id is unknown.
    pub fn latest_pose_by_id(&self, id: i32) -> TargetPose {
        let Ok(cache) = self.cache.lock() else {
            log::error!("tracking cache lock poisoned");
            return TargetPose::default();
        };
        cache.pose_by_id(id)
    }

    /// `"name (id)"` per known target. Order unspecified.
    pub fn tracked_targets(&self) -> Vec<String> {
        let Ok(cache) = self.cache.lock() else {
            log::error!("tracking cache lock poisoned");
            return Vec::new();
        };
        cache.tracked_targets()
    }

    pub fn history_len(&self) -> usize {
        let Ok(cache) = self.cache.lock() else {
            log::error!("tracking cache lock poisoned");
            return 0;
        };
        cache.history().len()
    }

    /// Copy of the buffered frames, oldest first.
    pub fn history_snapshot(&self) -> Vec<TrackingFrame> {
        let Ok(cache) = self.cache.lock() else {
            log::error!("tracking cache lock poisoned");
            return Vec::new();
        };
        cache.history().iter().cloned().collect()
    }
}

impl Drop for StreamPump {
    fn drop(&mut self) {
        self.request_stop();
        self.join_worker();
    }
}

// ----------------------------------------------------------------------------
// Read loop
// ----------------------------------------------------------------------------

fn run_read_loop<R: Read>(
    mut stream: R,
    config: PumpConfig,
    cache: Arc<Mutex<TrackingCache>>,
    observers: Arc<Mutex<ObserverRegistry>>,
    state: Arc<Mutex<PumpState>>,
) {
    let mut buffer = vec![0u8; config.buffer_size];
    loop {
        if !is_streaming(&state) {
            break;
        }
        // Stale bytes from a shorter previous read must not leak into this
        // tick's decode.
        buffer.fill(0);
        let read = match stream.read(&mut buffer) {
            Ok(read) => read,
            Err(err) => {
                log::error!("cannot read tracker data stream: {}", err);
                set_stopped(&state);
                break;
            }
        };
        // A zero-length read is an empty tick, not end of session; the
        // device holds the response body open between samples.
        if read > 0 {
            let chunk = String::from_utf8_lossy(&buffer[..read]);
            if let Ok(registry) = observers.lock() {
                registry.notify(&chunk);
            }
            let decoded = decode_chunk(&chunk);
            for err in &decoded.errors {
                log::warn!(
                    "{}; consider adjusting the stream's polling interval or buffer size if this happens more often",
                    err
                );
            }
            if !decoded.frames.is_empty() {
                if let Ok(mut cache) = cache.lock() {
                    for frame in decoded.frames {
                        cache.apply(frame);
                    }
                } else {
                    log::error!(
                        "tracking cache lock poisoned; dropping {} frames",
                        decoded.frames.len()
                    );
                }
            }
        }
        thread::sleep(config.poll_interval);
    }
    // The stream is owned by this function and dropped here, releasing the
    // connection on both the stop and failure paths.
    log::debug!("tracker stream read loop exited");
}

fn is_streaming(state: &Mutex<PumpState>) -> bool {
    match state.lock() {
        Ok(state) => *state == PumpState::Streaming,
        Err(_) => false,
    }
}

fn set_stopped(state: &Mutex<PumpState>) {
    if let Ok(mut state) = state.lock() {
        *state = PumpState::Stopped;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
