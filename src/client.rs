//! HTTP control surface for the tracker device.
//!
//! This module is responsible for:
//! - issuing REST calls against the device's control endpoints
//! - opening the chunked telemetry stream and handing it to the pump
//! - translating poses between the device frame and the caller frame
//!
//! It MUST NOT:
//! - parse telemetry records itself (that is `decode`'s job)
//! - block on the stream worker while a read may still be pending

use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Quat, Vec3};
use serde_json::Value;
use url::Url;

use crate::config::TrackerConfig;
use crate::pose::{
    flip_handedness_position, flip_handedness_rotation, is_valid_trs, mat4_from_row_major,
    mat4_position, mat4_rotation, mat4_to_row_major, TargetPose,
};
use crate::stream::{ObserverId, PumpState, StreamPump};

/// Pose of the device's built-in default reference, one unit out along the
/// tracker's Z axis. Reported by the device as an identity matrix.
const DEFAULT_REFERENCE_OFFSET: Vec3 = Vec3::new(0.0, 0.0, 1.0);

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// Client for one tracker device.
///
/// Wraps the device's REST endpoints and owns the [`StreamPump`] that consumes
/// the telemetry stream. All pose queries answer from the pump's cache; only
/// the control calls touch the network.
pub struct TrackerClient {
    config: TrackerConfig,
    base_url: String,
    pump: StreamPump,
    server_online: bool,
}

impl TrackerClient {
    /// Validates the configured base URL and prepares an idle client. No
    /// network traffic happens until [`start`](Self::start) is called.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let url = Url::parse(&config.base_url).context("parse tracker base url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("unsupported tracker url scheme: {}", url.scheme()));
        }

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let pump = StreamPump::new(config.pump_config(), config.history_capacity);
        if config.log_continuous_responses {
            pump.add_observer(|chunk| log::debug!("{} bytes; {}", chunk.len(), chunk));
        }

        Ok(Self {
            config,
            base_url,
            pump,
            server_online: false,
        })
    }

    /// Whether the last [`start`](Self::start) call reached the device.
    pub fn is_server_online(&self) -> bool {
        self.server_online
    }

    pub fn stream_state(&self) -> PumpState {
        self.pump.state()
    }

    // ------------------------------------------------------------------------
    // Session control
    // ------------------------------------------------------------------------

    /// Tells the device to start tracking. Also serves as the reachability
    /// probe: an unreachable device or an empty response marks the server
    /// offline.
    pub fn start(&mut self) {
        match self.post("Start") {
            Some(_) => self.server_online = true,
            None => {
                log::error!("REST server not running");
                self.server_online = false;
            }
        }
    }

    /// Tells the device to pause tracking and stops the local stream worker.
    ///
    /// The stop request is signalled before the network call so the worker
    /// winds down as soon as the device ends the stream body, and the worker
    /// is only joined afterwards, when no read can block indefinitely.
    pub fn pause(&mut self) {
        self.pump.request_stop();
        let _ = self.post("Pause");
        self.pump.stop();
    }

    /// Tells the device to close all open data streams, then stops the local
    /// stream worker. Same signal/post/join ordering as [`pause`](Self::pause).
    pub fn close_streams(&mut self) {
        self.pump.request_stop();
        let _ = self.post("CloseStreams");
        self.pump.stop();
    }

    /// Opens the telemetry stream and hands its body to the stream pump.
    /// A second call while the stream is live is a logged no-op.
    pub fn start_tracker_data_stream(&mut self) {
        if self.pump.state() == PumpState::Streaming {
            log::info!("tracker data stream is already being processed");
            return;
        }
        let url = self.endpoint_url("StartTrackerDataStream");
        match ureq::post(&url).call() {
            Ok(response) => self.pump.start(response.into_reader()),
            Err(err) => log::error!("cannot open tracker data stream: {err}"),
        }
    }

    // ------------------------------------------------------------------------
    // Pose queries
    // ------------------------------------------------------------------------

    /// Latest pose of the target with the given name, converted to the
    /// caller's right-handed frame. Unknown names yield the default pose.
    pub fn latest_pose_of_name(&self, name: &str) -> TargetPose {
        self.pump.latest_pose_by_name(name).to_right_handed()
    }

    /// Latest pose of the target with the given id, converted to the caller's
    /// right-handed frame. Unknown ids yield the default pose.
    pub fn latest_pose_of_id(&self, id: i32) -> TargetPose {
        self.pump.latest_pose_by_id(id).to_right_handed()
    }

    /// Names and ids of every target seen since the pump was created.
    pub fn tracked_targets(&self) -> Vec<String> {
        self.pump.tracked_targets()
    }

    /// Registers a callback invoked with each raw chunk of stream text.
    pub fn add_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&str) + Send + 'static,
    {
        self.pump.add_observer(observer)
    }

    /// Removes a previously registered chunk observer. Returns whether the
    /// observer was still registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.pump.remove_observer(id)
    }

    /// Number of frames currently held in the history ring.
    pub fn history_len(&self) -> usize {
        self.pump.history_len()
    }

    // ------------------------------------------------------------------------
    // Reference system
    // ------------------------------------------------------------------------

    /// Current reference matrix, in the device's left-handed frame. The
    /// device reports its built-in default reference as an identity matrix;
    /// that is mapped to the actual default pose one unit along Z.
    pub fn reference(&self) -> Option<Mat4> {
        let body = self.get("GetReference")?;
        parse_reference(&body)
    }

    /// Sets the reference to the given matrix. Rejects anything that is not a
    /// valid TRS matrix without touching the network.
    pub fn set_reference(&self, reference: Mat4) {
        if !is_valid_trs(&reference) {
            log::warn!("no valid TRS matrix given; not setting reference");
            return;
        }
        let matrix = mat4_to_row_major(&reference);
        let _ = self.post_json("SetReference", serde_json::json!({ "ReferenceMatrix": matrix }));
    }

    /// Restores the device's built-in default reference.
    pub fn set_default_reference(&self) {
        let _ = self.post("SetDefaultReference");
    }

    /// Position and rotation of the reference, converted to the caller's
    /// right-handed frame.
    pub fn reference_pose(&self) -> Option<(Vec3, Quat)> {
        let matrix = self.reference()?;
        let position = mat4_position(&matrix);
        let rotation = mat4_rotation(&matrix);
        Some((
            flip_handedness_position(position),
            flip_handedness_rotation(rotation),
        ))
    }

    /// Builds a TRS matrix from a caller-frame pose and sets it as the
    /// reference. Position and rotation are converted to the device's
    /// left-handed frame before composition.
    pub fn set_reference_pose(&self, position: Vec3, rotation: Quat, scale: Vec3) {
        let matrix = Mat4::from_scale_rotation_translation(
            scale,
            flip_handedness_rotation(rotation),
            flip_handedness_position(position),
        );
        self.set_reference(matrix);
    }

    // ------------------------------------------------------------------------
    // Device settings
    // ------------------------------------------------------------------------

    /// Raw JSON describing the targets the device is configured to track.
    pub fn target_list(&self) -> Option<String> {
        self.get("GetTargetList")
    }

    pub fn framerate(&self) -> Option<f64> {
        let body = self.get("GetFramerate")?;
        parse_first_number("GetFramerate", &body)
    }

    pub fn set_framerate(&self, framerate: f64) {
        let _ = self.post_json("SetFramerate", serde_json::json!({ "Framerate": framerate }));
    }

    pub fn supported_framerates(&self) -> Option<Vec<f64>> {
        let body = self.get("GetSupportedFramerates")?;
        parse_number_list("GetSupportedFramerates", &body)
    }

    pub fn exposure(&self) -> Option<f64> {
        let body = self.get("GetExposure")?;
        parse_first_number("GetExposure", &body)
    }

    pub fn set_exposure(&self, exposure: f64) {
        let _ = self.post_json("SetExposure", serde_json::json!({ "Exposure": exposure }));
    }

    /// Exposure limits as `(min, max)`, in the device's native unit.
    pub fn exposure_range(&self) -> Option<(f64, f64)> {
        let body = self.get("GetExposureRange")?;
        parse_exposure_range(&body)
    }

    // ------------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------------

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn get(&self, endpoint: &str) -> Option<String> {
        self.handle(endpoint, ureq::get(&self.endpoint_url(endpoint)).call())
    }

    fn post(&self, endpoint: &str) -> Option<String> {
        self.handle(endpoint, ureq::post(&self.endpoint_url(endpoint)).call())
    }

    fn post_json(&self, endpoint: &str, body: Value) -> Option<String> {
        let request = ureq::post(&self.endpoint_url(endpoint))
            .set("Content-Type", "application/json");
        self.handle(endpoint, request.send_string(&body.to_string()))
    }

    /// Collapses transport errors, unreadable bodies and empty bodies into
    /// `None`; each case is logged with the endpoint it came from.
    fn handle(
        &self,
        endpoint: &str,
        result: std::result::Result<ureq::Response, ureq::Error>,
    ) -> Option<String> {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                log::info!("{endpoint} request failed: {err}");
                return None;
            }
        };
        let body = match response.into_string() {
            Ok(body) => body,
            Err(err) => {
                log::info!("{endpoint} response unreadable: {err}");
                return None;
            }
        };
        if body.is_empty() {
            log::info!("{endpoint}: response was empty");
            return None;
        }
        if self.config.log_single_responses {
            log::debug!("{endpoint}: {body}");
        }
        Some(body)
    }
}

// ----------------------------------------------------------------------------
// Response parsing
// ----------------------------------------------------------------------------

fn parse_body(endpoint: &str, body: &str) -> Option<Value> {
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("{endpoint} returned malformed JSON: {err}");
            None
        }
    }
}

fn parse_reference(body: &str) -> Option<Mat4> {
    let value = parse_body("GetReference", body)?;
    let Some(elements) = first_number_array(&value) else {
        log::warn!("GetReference response carries no matrix");
        return None;
    };
    if elements.len() != 16 {
        log::warn!(
            "GetReference returned {} matrix elements; expected 16",
            elements.len()
        );
        return None;
    }
    let mut row_major = [0f32; 16];
    for (slot, element) in row_major.iter_mut().zip(&elements) {
        *slot = *element as f32;
    }
    let matrix = mat4_from_row_major(&row_major);
    if matrix.abs_diff_eq(Mat4::IDENTITY, 1e-5) {
        return Some(Mat4::from_translation(DEFAULT_REFERENCE_OFFSET));
    }
    Some(matrix)
}

fn parse_first_number(endpoint: &str, body: &str) -> Option<f64> {
    let value = parse_body(endpoint, body)?;
    let number = first_number(&value);
    if number.is_none() {
        log::warn!("{endpoint} response carries no numeric field");
    }
    number
}

fn parse_number_list(endpoint: &str, body: &str) -> Option<Vec<f64>> {
    let value = parse_body(endpoint, body)?;
    let list = first_number_array(&value);
    if list.is_none() {
        log::warn!("{endpoint} response carries no numeric list");
    }
    list
}

fn parse_exposure_range(body: &str) -> Option<(f64, f64)> {
    let value = parse_body("GetExposureRange", body)?;
    let min = number_field(&value, "min");
    let max = number_field(&value, "max");
    match (min, max) {
        (Some(min), Some(max)) => Some((min, max)),
        _ => {
            log::warn!("GetExposureRange response is missing min or max");
            None
        }
    }
}

/// First numeric leaf in the value, depth first.
fn first_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Object(map) => map.values().find_map(first_number),
        Value::Array(items) => items.iter().find_map(first_number),
        _ => None,
    }
}

/// First array whose elements are all numbers, depth first.
fn first_number_array(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::Array(items) => {
            let numbers: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
            match numbers {
                Some(numbers) if !numbers.is_empty() => Some(numbers),
                _ => items.iter().find_map(first_number_array),
            }
        }
        Value::Object(map) => map.values().find_map(first_number_array),
        _ => None,
    }
}

/// Numeric value of the first field named `key`, searching nested objects.
fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value {
        Value::Object(map) => {
            if let Some(number) = map.get(key).and_then(Value::as_f64) {
                return Some(number);
            }
            map.values().find_map(|nested| number_field(nested, key))
        }
        Value::Array(items) => items.iter().find_map(|item| number_field(item, key)),
        _ => None,
    }
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_number_descends_into_nested_objects() {
        let value: Value = serde_json::from_str(r#"{"Framerate": {"current": 30.0}}"#)
            .expect("valid json");
        assert_eq!(first_number(&value), Some(30.0));
    }

    #[test]
    fn first_number_ignores_strings_and_bools() {
        let value: Value = serde_json::from_str(r#"{"name": "pst", "ok": true, "n": 2}"#)
            .expect("valid json");
        assert_eq!(first_number(&value), Some(2.0));
    }

    #[test]
    fn first_number_array_skips_mixed_arrays() {
        let value: Value =
            serde_json::from_str(r#"{"tags": ["a", 1], "rates": [30.0, 60.0, 120.0]}"#)
                .expect("valid json");
        assert_eq!(first_number_array(&value), Some(vec![30.0, 60.0, 120.0]));
    }

    #[test]
    fn number_field_finds_nested_keys() {
        let body = r#"{"ExposureRange": {"max": 16.6, "min": 0.1}}"#;
        let value: Value = serde_json::from_str(body).expect("valid json");
        assert_eq!(number_field(&value, "min"), Some(0.1));
        assert_eq!(number_field(&value, "max"), Some(16.6));
    }

    #[test]
    fn exposure_range_is_min_then_max() {
        let body = r#"{"ExposureRange": {"max": 16.6, "min": 0.1}}"#;
        assert_eq!(parse_exposure_range(body), Some((0.1, 16.6)));
    }

    #[test]
    fn exposure_range_without_min_is_rejected() {
        assert_eq!(parse_exposure_range(r#"{"ExposureRange": {"max": 16.6}}"#), None);
    }

    #[test]
    fn reference_parses_row_major_elements() {
        let body = r#"{"ReferenceMatrix": [
            1.0, 0.0, 0.0, 0.5,
            0.0, 1.0, 0.0, 0.25,
            0.0, 0.0, 1.0, 2.0,
            0.0, 0.0, 0.0, 1.0
        ]}"#;
        let matrix = parse_reference(body).expect("matrix");
        assert_eq!(mat4_position(&matrix), Vec3::new(0.5, 0.25, 2.0));
    }

    #[test]
    fn identity_reference_becomes_the_default_offset() {
        let body = r#"{"ReferenceMatrix": [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0
        ]}"#;
        let matrix = parse_reference(body).expect("matrix");
        assert_eq!(mat4_position(&matrix), DEFAULT_REFERENCE_OFFSET);
    }

    #[test]
    fn short_reference_matrix_is_rejected() {
        assert_eq!(parse_reference(r#"{"ReferenceMatrix": [1.0, 2.0, 3.0]}"#), None);
    }

    #[test]
    fn malformed_body_is_rejected() {
        assert_eq!(parse_first_number("GetFramerate", "not json"), None);
        assert_eq!(parse_first_number("GetFramerate", r#"{"Framerate": "fast"}"#), None);
    }
}
