//! Command-line recorder
//!
//! Records a synthetic stream to disk until the duration elapses or Ctrl-C.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use stream_recorder::recorder::{Recorder, RecorderConfig};
use stream_recorder::stream::synthetic::{spawn_producer, SyntheticConfig};
use stream_recorder::stream::{StreamHandle, StreamInfo};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "stream-recorder", version, about = "Record a live sample stream to a dataset on disk")]
struct Args {
    /// JSON recorder configuration; overrides the naming and rate flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stream name
    #[arg(long, default_value = "synthetic")]
    name: String,

    /// Output base path (relative paths go under the user data directory)
    #[arg(short, long, default_value = "recording")]
    output: String,

    /// Recorder ticks per second
    #[arg(long, default_value_t = 1.0)]
    update_freq: f64,

    /// Seconds to wait before the first tick
    #[arg(long, default_value_t = 0.0)]
    start_delay: f64,

    /// Channel count of the synthetic stream
    #[arg(long, default_value_t = 8)]
    channels: usize,

    /// Sample rate of the synthetic stream in Hz
    #[arg(long, default_value_t = 256.0)]
    srate: f64,

    /// Ring buffer capacity in samples
    #[arg(long, default_value_t = 4096)]
    buffer_len: usize,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    duration: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stream_recorder::init_tracing();
    let args = Args::parse();

    tracing::info!("Starting stream-recorder v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => RecorderConfig::from_file(path)
            .with_context(|| format!("loading config {:?}", path))?,
        None => RecorderConfig {
            source_stream_name: args.name.clone(),
            output_file_path: args.output.clone(),
            update_frequency_hz: args.update_freq,
            start_delay_seconds: args.start_delay,
        },
    };

    let handle = StreamHandle::new(
        config.source_stream_name.clone(),
        StreamInfo {
            nbchan: args.channels,
            srate: args.srate,
            xmin: 0.0,
            buffer_len: args.buffer_len,
        },
    );
    let producer_cancel = CancellationToken::new();
    let producer = spawn_producer(handle.clone(), SyntheticConfig::default(), producer_cancel.clone());

    let mut recorder =
        Recorder::start(handle.as_source(), config).context("starting recorder")?;
    tracing::info!("Recording to {:?}", recorder.header_path());

    match args.duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await,
        None => tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?,
    }

    let summary = recorder.stop().await.context("stopping recorder")?;
    producer_cancel.cancel();
    let _ = producer.await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
