use std::time::Duration;

use crate::api::AudioParams;
use crate::buffers::DEFAULT_FRAME_BUFFER_COUNT;
use crate::ingest::IngestTesterConfig;

/// Configuration options that govern how a broadcast controller operates
#[derive(Clone, Debug, PartialEq)]
pub struct BroadcastControllerConfig {
    /// Number of frame buffers allocated for a live broadcast
    pub frame_buffer_count: usize,

    /// How long `force_sync_shutdown()` sleeps between updates while waiting on an ingest test
    pub shutdown_poll_interval: Duration,

    pub audio_params: AudioParams,
    pub ingest_test: IngestTesterConfig,
}

impl BroadcastControllerConfig {
    /// Creates a new configuration object with default values
    pub fn new() -> BroadcastControllerConfig {
        BroadcastControllerConfig {
            frame_buffer_count: DEFAULT_FRAME_BUFFER_COUNT,
            shutdown_poll_interval: Duration::from_millis(200),
            audio_params: AudioParams::disabled(),
            ingest_test: IngestTesterConfig::new(),
        }
    }
}

impl Default for BroadcastControllerConfig {
    fn default() -> Self {
        BroadcastControllerConfig::new()
    }
}
