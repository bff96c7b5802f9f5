use crate::api::{MAX_BITRATE_KBPS, MAX_FPS};
use crate::buffers::DEFAULT_FRAME_BUFFER_COUNT;

/// Configuration options that govern how an ingest test is run
#[derive(Clone, Debug, PartialEq)]
pub struct IngestTesterConfig {
    /// How long each server is measured once its session has started
    pub test_duration_ms: u64,
    pub frame_buffer_count: usize,
    pub output_width: u32,
    pub output_height: u32,
    pub target_fps: u32,
    pub max_kbps: u32,

    /// Fill buffers with noise so the encoder cannot compress the test stream down to nothing
    pub randomize_frame_buffers: bool,
}

impl IngestTesterConfig {
    /// Creates a new configuration object with default values
    pub fn new() -> IngestTesterConfig {
        IngestTesterConfig {
            test_duration_ms: 8_000,
            frame_buffer_count: DEFAULT_FRAME_BUFFER_COUNT,
            output_width: 1280,
            output_height: 720,
            target_fps: MAX_FPS,
            max_kbps: MAX_BITRATE_KBPS,
            randomize_frame_buffers: true,
        }
    }
}

impl Default for IngestTesterConfig {
    fn default() -> Self {
        IngestTesterConfig::new()
    }
}
