//! crowdwatchd - people-counting capture daemon
//!
//! This daemon:
//! 1. Loads configuration (file + environment)
//! 2. Starts the capture/inference loop
//! 3. Serves the count, detections, and live-stream endpoints over HTTP
//! 4. Logs pipeline health periodically
//! 5. Shuts down cleanly on Ctrl+C

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use crowdwatch::api::{ApiConfig, ApiServer};
use crowdwatch::{CrowdMonitor, CrowdwatchConfig};

#[derive(Parser, Debug)]
#[command(name = "crowdwatchd", about = "People-counting capture daemon")]
struct Args {
    /// Force the placeholder source (run without capture hardware).
    #[arg(long)]
    mock: bool,

    /// Camera identifier override (device index or device path).
    #[arg(long)]
    source: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = CrowdwatchConfig::load()?;
    if args.mock {
        config.camera.mock = true;
    }
    if let Some(source) = args.source {
        config.camera.source = source;
    }

    log::info!(
        "crowdwatchd {} starting (source='{}', {}x{} @ {} fps, confidence={}, mock={})",
        env!("CARGO_PKG_VERSION"),
        config.camera.source,
        config.camera.width,
        config.camera.height,
        config.camera.fps,
        config.detection.confidence,
        config.camera.mock
    );

    let monitor = CrowdMonitor::new(config.clone());
    monitor.start();

    let api = ApiServer::new(
        ApiConfig {
            addr: config.api_addr.clone(),
        },
        monitor.clone(),
    )
    .spawn()?;
    log::info!(
        "http endpoints on {}: /health /count /detections /stream",
        api.addr
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_shutdown.store(true, Ordering::SeqCst);
    })?;

    let mut last_health = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));

        if last_health.elapsed() >= Duration::from_secs(5) {
            log::info!(
                "health: running={} people={} detections={}",
                monitor.is_running(),
                monitor.count(),
                monitor.detections().len()
            );
            last_health = Instant::now();
        }
    }

    log::info!("shutting down");
    api.stop()?;
    monitor.stop();
    Ok(())
}
