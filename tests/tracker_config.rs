use std::sync::Mutex;

use tempfile::NamedTempFile;

use tracker_client::TrackerConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "TRACKER_CONFIG",
        "TRACKER_BASE_URL",
        "TRACKER_POLL_INTERVAL_MS",
        "TRACKER_STREAM_BUFFER_BYTES",
        "TRACKER_HISTORY_CAPACITY",
        "TRACKER_LOG_SINGLE_RESPONSES",
        "TRACKER_LOG_CONTINUOUS_RESPONSES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = TrackerConfig::load().expect("load config");

    assert_eq!(cfg.base_url, "http://127.0.0.1:7278/PSTapi");
    assert_eq!(cfg.poll_interval.as_millis(), 10);
    assert_eq!(cfg.stream_buffer_bytes, 4096);
    assert_eq!(cfg.history_capacity, 100);
    assert!(!cfg.log_single_responses);
    assert!(!cfg.log_continuous_responses);

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "base_url": "http://tracker.local:7278/PSTapi",
        "poll_interval_ms": 20,
        "stream_buffer_bytes": 2048,
        "log_single_responses": true
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("TRACKER_CONFIG", file.path());
    std::env::set_var("TRACKER_POLL_INTERVAL_MS", "50");
    std::env::set_var("TRACKER_LOG_CONTINUOUS_RESPONSES", "true");

    let cfg = TrackerConfig::load().expect("load config");

    assert_eq!(cfg.base_url, "http://tracker.local:7278/PSTapi");
    // Environment beats the file; the file beats the defaults.
    assert_eq!(cfg.poll_interval.as_millis(), 50);
    assert_eq!(cfg.stream_buffer_bytes, 2048);
    assert_eq!(cfg.history_capacity, 100);
    assert!(cfg.log_single_responses);
    assert!(cfg.log_continuous_responses);

    clear_env();
}

#[test]
fn rejects_malformed_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TRACKER_POLL_INTERVAL_MS", "fast");
    assert!(TrackerConfig::load().is_err());

    std::env::set_var("TRACKER_POLL_INTERVAL_MS", "10");
    std::env::set_var("TRACKER_LOG_SINGLE_RESPONSES", "yes");
    assert!(TrackerConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_zero_tunables_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TRACKER_POLL_INTERVAL_MS", "0");
    assert!(TrackerConfig::load().is_err());
    clear_env();

    std::env::set_var("TRACKER_STREAM_BUFFER_BYTES", "0");
    assert!(TrackerConfig::load().is_err());
    clear_env();

    std::env::set_var("TRACKER_HISTORY_CAPACITY", "0");
    assert!(TrackerConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_non_http_base_url_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TRACKER_BASE_URL", "ftp://127.0.0.1:7278/PSTapi");
    assert!(TrackerConfig::load().is_err());

    clear_env();
}
