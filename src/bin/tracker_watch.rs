//! tracker_watch - live pose watcher for a motion tracker
//!
//! This tool:
//! 1. Loads configuration (file, then environment, then command line)
//! 2. Starts the device and opens the telemetry stream
//! 3. Periodically prints the watched target's pose, or the target list
//! 4. Closes the device streams on Ctrl-C

use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

use tracker_client::{TrackerClient, TrackerConfig};

#[derive(Parser, Debug)]
#[command(name = "tracker_watch", about = "Watch live poses from a motion tracker")]
struct Args {
    /// Target name to watch; all known targets are listed when omitted
    #[arg(long)]
    target: Option<String>,

    /// Override the configured device base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Override the configured stream poll interval
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Override the configured stream read buffer size
    #[arg(long)]
    buffer_bytes: Option<usize>,

    /// Seconds between printed samples
    #[arg(long, default_value_t = 1)]
    every: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = TrackerConfig::load()?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(ms) = args.poll_interval_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(bytes) = args.buffer_bytes {
        config.stream_buffer_bytes = bytes;
    }

    let mut client = TrackerClient::new(config)?;
    client.start();
    if !client.is_server_online() {
        bail!("tracker REST server is not reachable");
    }
    if let Some(framerate) = client.framerate() {
        log::info!("device framerate: {framerate} Hz");
    }
    client.start_tracker_data_stream();

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("tracker_watch running; Ctrl-C to stop");
    let every = Duration::from_secs(args.every.max(1));
    loop {
        match rx.recv_timeout(every) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            _ => break,
        }
        match &args.target {
            Some(name) => {
                let pose = client.latest_pose_of_name(name);
                println!(
                    "{name}: position ({:.4}, {:.4}, {:.4}) rotation ({:.4}, {:.4}, {:.4}, {:.4})",
                    pose.position.x,
                    pose.position.y,
                    pose.position.z,
                    pose.rotation.x,
                    pose.rotation.y,
                    pose.rotation.z,
                    pose.rotation.w,
                );
            }
            None => {
                let targets = client.tracked_targets();
                if targets.is_empty() {
                    println!(
                        "no targets seen yet ({} frames buffered)",
                        client.history_len()
                    );
                } else {
                    println!("targets: {}", targets.join(", "));
                }
            }
        }
    }

    log::info!("shutdown signal received, closing device streams");
    client.close_streams();
    client.pause();

    Ok(())
}
