//! Integration tests for the REST control surface against a canned
//! in-process device.
//!
//! These tests verify that:
//! 1. Control calls hit the expected endpoints with the expected verbs
//! 2. Response bodies are parsed into typed values
//! 3. Empty bodies and unreachable devices degrade to `None`, never a fault
//! 4. The telemetry stream feeds the pose cache end to end

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::{Mat4, Quat, Vec3};
use tracker_client::{PumpState, TrackerClient, TrackerConfig};

#[derive(Debug)]
struct Recorded {
    method: String,
    path: String,
    body: String,
}

/// Serves exactly `connections` requests from a canned route table keyed by
/// endpoint name, recording each request. Unknown endpoints get an empty body.
fn canned_device(
    routes: &[(&str, &str)],
    connections: usize,
) -> (String, Arc<Mutex<Vec<Recorded>>>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind device listener");
    let addr = listener.local_addr().expect("device addr");
    let routes: HashMap<String, String> = routes
        .iter()
        .map(|(endpoint, body)| (endpoint.to_string(), body.to_string()))
        .collect();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    let handle = thread::spawn(move || {
        for _ in 0..connections {
            let (mut stream, _) = listener.accept().expect("accept");
            let recorded = read_request(&mut stream);
            let endpoint = recorded.path.rsplit('/').next().unwrap_or_default();
            let body = routes.get(endpoint).cloned().unwrap_or_default();
            log.lock().expect("request log").push(recorded);
            write_response(&mut stream, &body);
        }
    });
    (format!("http://{addr}/PSTapi"), requests, handle)
}

fn read_request(stream: &mut TcpStream) -> Recorded {
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("read timeout");
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let head_end = loop {
        let n = stream.read(&mut buf).expect("read request head");
        if n == 0 {
            break data.len();
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = data[head_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).expect("read request body");
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    Recorded {
        method,
        path,
        body: String::from_utf8_lossy(&body).to_string(),
    }
}

fn write_response(stream: &mut TcpStream, body: &str) {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(header.as_bytes()).expect("write header");
    stream.write_all(body.as_bytes()).expect("write body");
}

fn client_for(base_url: &str) -> TrackerClient {
    let config = TrackerConfig {
        base_url: base_url.to_string(),
        poll_interval: Duration::from_millis(2),
        ..TrackerConfig::default()
    };
    TrackerClient::new(config).expect("client")
}

fn record(seq: i32, id: i32, name: &str, x: f32) -> String {
    format!(
        r#"{{"TrackerData":{{"seqnumber":{seq},"timestamp":0.1,"targetPoses":[{{"targetPose":{{"id":{id},"name":"{name}","uuid":"","transformationMatrix":[1,0,0,{x},0,1,0,0,0,0,1,0,0,0,0,1]}}}}],"points":[]}}}}"#
    )
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn start_marks_the_server_online() {
    let (base_url, requests, handle) = canned_device(&[("Start", r#"{"status":"ok"}"#)], 1);
    let mut client = client_for(&base_url);
    client.start();
    handle.join().expect("device thread");

    assert!(client.is_server_online());
    let log = requests.lock().expect("request log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].method, "POST");
    assert!(log[0].path.ends_with("/PSTapi/Start"));
}

#[test]
fn unreachable_device_is_marked_offline() {
    // Bind then drop to get a local port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut client = client_for(&format!("http://{addr}/PSTapi"));
    client.start();
    assert!(!client.is_server_online());
    assert_eq!(client.framerate(), None);
}

#[test]
fn settings_responses_parse_into_typed_values() {
    let (base_url, requests, handle) = canned_device(
        &[
            ("GetFramerate", r#"{"Framerate":30.0}"#),
            ("GetExposure", r#"{"Exposure":8.25}"#),
            ("GetSupportedFramerates", r#"{"SupportedFramerates":[30.0,60.0,120.0]}"#),
            ("GetExposureRange", r#"{"ExposureRange":{"max":16.5,"min":0.25}}"#),
        ],
        4,
    );
    let client = client_for(&base_url);

    assert_eq!(client.framerate(), Some(30.0));
    assert_eq!(client.exposure(), Some(8.25));
    assert_eq!(client.supported_framerates(), Some(vec![30.0, 60.0, 120.0]));
    assert_eq!(client.exposure_range(), Some((0.25, 16.5)));
    handle.join().expect("device thread");

    let log = requests.lock().expect("request log");
    assert!(log.iter().all(|request| request.method == "GET"));
}

#[test]
fn empty_body_yields_none_without_fault() {
    let (base_url, _requests, handle) = canned_device(&[("GetFramerate", "")], 1);
    let client = client_for(&base_url);
    assert_eq!(client.framerate(), None);
    handle.join().expect("device thread");
}

#[test]
fn identity_reference_reports_the_default_offset() {
    let body = r#"{"ReferenceMatrix":[1,0,0,0,0,1,0,0,0,0,1,0,0,0,0,1]}"#;
    let (base_url, _requests, handle) = canned_device(&[("GetReference", body)], 2);
    let client = client_for(&base_url);

    let matrix = client.reference().expect("reference matrix");
    assert_eq!(matrix.w_axis.truncate(), Vec3::new(0.0, 0.0, 1.0));

    // The pose query flips the offset into the right-handed frame.
    let (position, rotation) = client.reference_pose().expect("reference pose");
    assert_eq!(position, Vec3::new(0.0, 0.0, -1.0));
    assert!(rotation.abs_diff_eq(Quat::IDENTITY, 1e-6));
    handle.join().expect("device thread");
}

#[test]
fn set_reference_posts_the_row_major_matrix() {
    let (base_url, requests, handle) = canned_device(&[("SetReference", r#"{"ok":true}"#)], 1);
    let client = client_for(&base_url);
    client.set_reference(Mat4::from_translation(Vec3::new(0.5, 0.25, 2.0)));
    handle.join().expect("device thread");

    let log = requests.lock().expect("request log");
    assert_eq!(log[0].method, "POST");
    assert!(log[0].path.ends_with("/PSTapi/SetReference"));
    let body: serde_json::Value = serde_json::from_str(&log[0].body).expect("json body");
    let matrix = body["ReferenceMatrix"].as_array().expect("matrix array");
    assert_eq!(matrix.len(), 16);
    // Row-major packing puts the translation at elements 3, 7, 11.
    assert_eq!(matrix[3].as_f64(), Some(0.5));
    assert_eq!(matrix[7].as_f64(), Some(0.25));
    assert_eq!(matrix[11].as_f64(), Some(2.0));
}

#[test]
fn degenerate_reference_matrix_is_never_sent() {
    // One connection only; a rejected SetReference must not consume it.
    let (base_url, requests, handle) =
        canned_device(&[("GetFramerate", r#"{"Framerate":60.0}"#)], 1);
    let client = client_for(&base_url);

    client.set_reference(Mat4::ZERO);
    assert_eq!(client.framerate(), Some(60.0));
    handle.join().expect("device thread");

    let log = requests.lock().expect("request log");
    assert_eq!(log.len(), 1);
    assert!(log[0].path.ends_with("/PSTapi/GetFramerate"));
}

#[test]
fn telemetry_stream_feeds_the_pose_cache() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind device listener");
    let addr = listener.local_addr().expect("device addr");

    let device = thread::spawn(move || {
        // First connection opens the stream: two records, then end of body.
        let (mut stream, _) = listener.accept().expect("accept stream request");
        let opened = read_request(&mut stream);
        assert_eq!(opened.method, "POST");
        assert!(opened.path.ends_with("/PSTapi/StartTrackerDataStream"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n")
            .expect("stream header");
        stream
            .write_all(format!("{}\r\n", record(1, 7, "wand", 0.5)).as_bytes())
            .expect("first record");
        stream.flush().expect("flush first record");
        thread::sleep(Duration::from_millis(20));
        stream
            .write_all(format!("{}\r\n", record(2, 7, "wand", 1.5)).as_bytes())
            .expect("second record");
        drop(stream);

        // Second connection is the close request.
        let (mut control, _) = listener.accept().expect("accept close request");
        let closed = read_request(&mut control);
        assert!(closed.path.ends_with("/PSTapi/CloseStreams"));
        write_response(&mut control, r#"{"ok":true}"#);
    });

    let mut client = client_for(&format!("http://{addr}/PSTapi"));
    client.start_tracker_data_stream();
    assert_eq!(client.stream_state(), PumpState::Streaming);

    assert!(wait_until(Duration::from_secs(2), || {
        client.latest_pose_of_id(7).position.x == 1.5
    }));
    let pose = client.latest_pose_of_name("wand");
    assert_eq!(pose.id, 7);
    assert_eq!(pose.position.x, 1.5);
    assert_eq!(client.tracked_targets(), vec!["wand (7)".to_string()]);

    client.close_streams();
    assert_eq!(client.stream_state(), PumpState::Stopped);
    device.join().expect("device thread");
}
