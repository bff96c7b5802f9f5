/// Highest frame rate the encoder accepts
pub const MAX_FPS: u32 = 60;

/// Lowest bitrate (in kbps) the encoder can be configured with
pub const MIN_BITRATE_KBPS: u32 = 230;

/// Highest bitrate (in kbps) the encoder can be configured with
pub const MAX_BITRATE_KBPS: u32 = 3500;

/// Layout of the raw pixels handed to the encoder
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PixelFormat {
    Bgra,
    Abgr,
    Rgba,
    Argb,
}

/// Settings for the video portion of an encode session
#[derive(PartialEq, Debug, Clone)]
pub struct VideoParams {
    pub output_width: u32,
    pub output_height: u32,
    pub target_fps: u32,
    pub max_kbps: u32,
    pub pixel_format: PixelFormat,
    pub disable_adaptive_bitrate: bool,
    pub vertical_flip: bool,
}

impl VideoParams {
    pub fn new(output_width: u32, output_height: u32, target_fps: u32) -> VideoParams {
        VideoParams {
            output_width,
            output_height,
            target_fps,
            max_kbps: MAX_BITRATE_KBPS,
            pixel_format: PixelFormat::Bgra,
            disable_adaptive_bitrate: false,
            vertical_flip: false,
        }
    }

    /// The number of bytes a single BGRA frame at the output resolution occupies
    pub fn frame_size_bytes(&self) -> usize {
        self.output_width as usize * self.output_height as usize * 4
    }
}

/// Settings for the audio portion of an encode session
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct AudioParams {
    pub audio_enabled: bool,
    pub enable_mic_capture: bool,
    pub enable_playback_capture: bool,
    pub enable_passthrough_audio: bool,
}

impl AudioParams {
    /// Audio parameters that turn every audio source off
    pub fn disabled() -> AudioParams {
        AudioParams::default()
    }
}

/// Flags passed along with a start request telling the transport what the session is for
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct StartFlags {
    pub bandwidth_test: bool,
}

impl StartFlags {
    /// A regular live broadcast
    pub const NONE: StartFlags = StartFlags {
        bandwidth_test: false,
    };

    /// A diagnostic session used to measure throughput; it is never shown to viewers
    pub const BANDWIDTH_TEST: StartFlags = StartFlags {
        bandwidth_test: true,
    };
}
