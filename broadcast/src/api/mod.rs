//! The contract this crate expects from the native encoder/transport layer.
//!
//! The transport itself (RTMP connection handling, video encoding, auth requests against the
//! streaming service) lives outside of this crate.  Everything the controller and the ingest
//! tester need from it is expressed by the `BroadcastApi` trait.  Requests return immediately;
//! their outcome is delivered to whichever `BroadcastApiListener` is installed at the time the
//! transport completes the work, which may be before the request returns or during a later call
//! to `poll_tasks()`.

mod callbacks;
mod errors;
mod params;
mod session_info;
mod stats;

use std::cell::RefCell;
use std::rc::Rc;

use crate::ingest::IngestServer;

pub use self::callbacks::{
    is_installed, ApiCallback, BroadcastApiListener, CallbackQueue, StatsListener,
};
pub use self::errors::BroadcastApiError;
pub use self::params::{
    AudioParams, PixelFormat, StartFlags, VideoParams, MAX_BITRATE_KBPS, MAX_FPS,
    MIN_BITRATE_KBPS,
};
pub use self::session_info::{AuthToken, ChannelInfo};
pub use self::stats::{RtmpState, StatType};

/// Opaque handle to a frame buffer allocated by the transport
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct FrameBufferHandle(u64);

impl FrameBufferHandle {
    pub fn new(id: u64) -> FrameBufferHandle {
        FrameBufferHandle(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// The transport is shared between the controller and the ingest tester it creates, and all
/// work happens on the host's polling thread.
pub type SharedBroadcastApi = Rc<RefCell<dyn BroadcastApi>>;

/// Operations provided by the native broadcast transport
pub trait BroadcastApi {
    fn initialize(&mut self) -> Result<(), BroadcastApiError>;
    fn shutdown(&mut self) -> Result<(), BroadcastApiError>;

    /// The listener that receives request results
    fn listener(&self) -> Option<Rc<dyn BroadcastApiListener>>;
    fn set_listener(&mut self, listener: Option<Rc<dyn BroadcastApiListener>>);

    /// The listener that receives counters during `poll_stats()`
    fn stats_listener(&self) -> Option<Rc<dyn StatsListener>>;
    fn set_stats_listener(&mut self, listener: Option<Rc<dyn StatsListener>>);

    /// Requests an auth token for the given credentials.  Completes with
    /// `request_auth_token_callback`.
    fn request_auth_token(&mut self, username: &str, password: &str)
        -> Result<(), BroadcastApiError>;

    /// Validates the auth token.  Completes with `login_callback`.
    fn login(&mut self, auth_token: &AuthToken) -> Result<(), BroadcastApiError>;

    /// Retrieves the servers the user may broadcast to.  Completes with
    /// `get_ingest_servers_callback`.
    fn get_ingest_servers(&mut self, auth_token: &AuthToken) -> Result<(), BroadcastApiError>;

    /// Fills in encoder settings the caller did not explicitly choose
    fn get_default_params(&self, video_params: &mut VideoParams);

    /// Opens an encode session against the server.  Completes with `start_callback`.
    fn start(
        &mut self,
        video_params: &VideoParams,
        audio_params: &AudioParams,
        server: &IngestServer,
        flags: StartFlags,
        is_async: bool,
    ) -> Result<(), BroadcastApiError>;

    /// Ends the active encode session.  Completes with `stop_callback`.
    fn stop(&mut self, is_async: bool) -> Result<(), BroadcastApiError>;

    /// Replaces the outgoing video with the default pause screen
    fn pause_video(&mut self) -> Result<(), BroadcastApiError>;

    /// Queues a frame for encoding.  The buffer is handed back through
    /// `buffer_unlock_callback` once the encoder is done with it.
    fn submit_video_frame(&mut self, buffer: FrameBufferHandle) -> Result<(), BroadcastApiError>;

    /// Allocates a frame buffer of `size` bytes, returning `None` when the transport is out of
    /// memory.
    fn allocate_frame_buffer(&mut self, size: usize) -> Option<FrameBufferHandle>;
    fn randomize_frame_buffer(&mut self, buffer: FrameBufferHandle);
    fn free_frame_buffer(&mut self, buffer: FrameBufferHandle);

    /// Delivers the results of finished asynchronous requests
    fn poll_tasks(&mut self) -> Result<(), BroadcastApiError>;

    /// Delivers the current counters to the stats listener
    fn poll_stats(&mut self) -> Result<(), BroadcastApiError>;
}
