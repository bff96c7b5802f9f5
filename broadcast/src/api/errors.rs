use thiserror::Error;

/// Failure codes returned by the broadcast transport, either directly from a call or through
/// one of its asynchronous callbacks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BroadcastApiError {
    /// The transport has not been initialized yet (or has already been shut down)
    #[error("The broadcast transport is not initialized")]
    NotInitialized,

    /// The transport was asked to initialize twice
    #[error("The broadcast transport is already initialized")]
    AlreadyInitialized,

    /// A stream operation was attempted while no stream session is active
    #[error("No stream has been started")]
    StreamNotStarted,

    /// A start was requested while a stream session is already active
    #[error("A stream has already been started")]
    StreamAlreadyStarted,

    /// The credentials or auth token were rejected by the service
    #[error("Authentication was rejected: {reason}")]
    AuthenticationFailed { reason: String },

    /// The frame buffer handle passed in was not allocated by this transport
    #[error("Frame buffer {handle_id} is not known to the transport")]
    UnknownFrameBuffer { handle_id: u64 },

    /// The encoder refused a submitted video frame
    #[error("The encoder rejected the submitted video frame: {reason}")]
    FrameSubmissionRejected { reason: String },

    /// Catch all for errors reported by the underlying network or encoder layers
    #[error("Transport error {code}: {description}")]
    Transport { code: i32, description: String },
}
