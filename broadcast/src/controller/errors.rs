use thiserror::Error;

use super::BroadcastState;
use crate::api::BroadcastApiError;
use crate::buffers::FrameBufferError;

/// Reasons a `BroadcastController` operation can be refused or fail
#[derive(Debug, Error)]
pub enum BroadcastControllerError {
    /// The operation is not valid in the controller's current state
    #[error("The request could not be performed while the controller is in the {current_state:?} state")]
    SessionInInvalidState { current_state: BroadcastState },

    #[error("The broadcast controller has not been initialized")]
    NotInitialized,

    #[error("The broadcast controller is already initialized")]
    AlreadyInitialized,

    /// The ingest test owns the transport until it is done
    #[error("The request could not be performed while an ingest test is running")]
    IngestTestInProgress,

    /// An empty username, password or auth token was supplied
    #[error("A username and a non-empty password or auth token are required")]
    InvalidCredentials,

    /// No ingest server has been discovered or selected
    #[error("No ingest server is available")]
    NoIngestServer,

    #[error("No ingest server named '{name}' is known")]
    UnknownIngestServer { name: String },

    #[error("Frame buffers could not be allocated: {0}")]
    FrameBuffers(#[from] FrameBufferError),

    /// The transport rejected the request outright
    #[error("The broadcast transport rejected the request: {0}")]
    Api(#[from] BroadcastApiError),

    /// An asynchronous request completed with an error.  Only ever handed to the error reporter.
    #[error("The {request} request failed: {source}")]
    RequestFailed {
        request: &'static str,
        source: BroadcastApiError,
    },

    /// An event observer returned an error.  Only ever handed to the error reporter.
    #[error("Broadcast event observer failed: {message}")]
    ObserverFailed { message: String },
}
