//! Carlink adapter simulator
//!
//! Runs a full host session against a scripted adapter over an in-memory
//! link. Usage: `adapter-sim [config.json] [seconds]`.

mod adapter;
mod sinks;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use link_protocol::DongleConfig;
use link_session::{SessionController, SessionOptions};
use link_transport::MemoryTransport;
use tracing::info;

use crate::adapter::SimulatedAdapter;
use crate::sinks::{CountingAudio, CountingVideo, Counters, LoggingEvents};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("adapter_sim=info".parse()?)
                .add_directive("link_session=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config {path}"))?;
            serde_json::from_str::<DongleConfig>(&text)
                .with_context(|| format!("invalid config {path}"))?
        }
        None => DongleConfig::default(),
    };
    let seconds: u64 = args
        .next()
        .map(|s| s.parse())
        .transpose()
        .context("duration must be a whole number of seconds")?
        .unwrap_or(5);

    info!(
        "Starting simulation: {}x{}@{} for {}s",
        config.width, config.height, config.fps, seconds
    );

    let (host, device) = MemoryTransport::pair();
    let running = Arc::new(AtomicBool::new(true));
    let adapter = SimulatedAdapter::new(device, running.clone())
        .spawn()
        .context("failed to spawn simulated adapter")?;

    let counters = Arc::new(Counters::default());
    let session = SessionController::new(
        Arc::new(host),
        Arc::new(CountingAudio::new(counters.clone())),
        Arc::new(CountingVideo::new(counters.clone())),
        Arc::new(LoggingEvents::new(counters.clone())),
        SessionOptions::default(),
    );

    session.start(config)?;
    std::thread::sleep(Duration::from_secs(seconds));
    session.stop()?;

    running.store(false, Ordering::SeqCst);
    if adapter.join().is_err() {
        anyhow::bail!("simulated adapter panicked");
    }

    info!(
        video_frames = Counters::get(&counters.video_frames),
        video_bytes = Counters::get(&counters.video_bytes),
        audio_bytes = Counters::get(&counters.audio_bytes),
        messages = Counters::get(&counters.messages),
        errors = Counters::get(&counters.errors),
        "Simulation finished"
    );
    info!(stats = ?session.stats(), "Session counters");
    info!(router = ?session.router_stats(), pool = ?session.pool_stats(), "Ingress counters");

    Ok(())
}
