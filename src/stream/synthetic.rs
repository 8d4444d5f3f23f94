//! Synthetic stream producer
//!
//! Feeds a [`StreamHandle`] with sine waves and periodic markers in real time.
//! Used by the command-line recorder when no hardware stream is attached.

use super::handle::{StreamHandle, StreamSource};
use super::ring::{MarkerRecord, PendingMarker};
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Producer settings
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// How many blocks are pushed per second
    pub blocks_per_second: u32,

    /// Emit a marker every this many samples (0 disables markers)
    pub marker_interval: u64,

    /// Base frequency of channel 0 in Hz; channel `c` runs at `(c + 1)` times this
    pub base_frequency: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            blocks_per_second: 10,
            marker_interval: 500,
            base_frequency: 10.0,
        }
    }
}

/// Generate `count` columns starting after absolute sample `smax`
pub fn generate_block(
    nbchan: usize,
    srate: f64,
    smax: u64,
    count: usize,
    config: &SyntheticConfig,
) -> (Vec<f32>, Vec<PendingMarker>) {
    let mut samples = Vec::with_capacity(nbchan * count);
    let mut markers = Vec::new();

    for column in 0..count {
        let index = smax + 1 + column as u64;
        let t = (index - 1) as f64 / srate;
        for channel in 0..nbchan {
            let freq = config.base_frequency * (channel + 1) as f64;
            samples.push((TAU * freq * t).sin() as f32);
        }
        if config.marker_interval > 0 && index % config.marker_interval == 0 {
            markers.push(PendingMarker {
                column,
                channel: 0,
                record: MarkerRecord::new("tick", 0.0),
            });
        }
    }

    (samples, markers)
}

/// Spawn a task that keeps pushing blocks until `cancel` fires
pub fn spawn_producer(
    handle: StreamHandle,
    config: SyntheticConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let info = handle.info();
        let per_block = ((info.srate / config.blocks_per_second.max(1) as f64).round() as usize).max(1);
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(
            1.0 / config.blocks_per_second.max(1) as f64,
        ));

        tracing::info!(
            "Synthetic producer for '{}': {} channels at {} Hz",
            handle.name(),
            info.nbchan,
            info.srate
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let (samples, markers) =
                        generate_block(info.nbchan, info.srate, handle.smax(), per_block, &config);
                    handle.push(&samples, &markers);
                }
            }
        }

        tracing::debug!("Synthetic producer for '{}' stopped", handle.name());
    })
}
