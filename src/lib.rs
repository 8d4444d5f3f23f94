//! Stream Recorder - persist a live multichannel stream to disk.
//!
//! A [`recorder::Recorder`] polls a [`stream::StreamSource`] on a fixed
//! schedule, appends new samples to a binary data file and markers to an
//! event log, and finalizes a self-describing dataset when it stops.

pub mod dataset;
pub mod recorder;
pub mod stream;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
