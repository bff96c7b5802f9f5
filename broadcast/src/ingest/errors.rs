use thiserror::Error;

use super::TestState;
use crate::api::BroadcastApiError;
use crate::buffers::FrameBufferError;

/// Problems encountered while running an ingest test.  These are never returned from the
/// tester's methods, they are handed to the `ErrorReporter` while the run carries on.
#[derive(Debug, Error)]
pub enum IngestTestError {
    /// The test stream's frame buffers could not be allocated, the run cannot continue
    #[error("Ingest test could not allocate its frame buffers: {0}")]
    FrameBuffers(#[from] FrameBufferError),

    /// The transport refused to open a session to the server
    #[error("Failed to start testing server '{server_name}': {source}")]
    StartFailed {
        server_name: String,
        source: BroadcastApiError,
    },

    /// The transport rejected a test frame
    #[error("Failed to submit a test frame to server '{server_name}': {source}")]
    FrameSubmissionFailed {
        server_name: String,
        source: BroadcastApiError,
    },

    /// The session to the server did not shut down cleanly
    #[error("Failed to stop testing server '{server_name}': {source}")]
    StopFailed {
        server_name: String,
        source: BroadcastApiError,
    },

    /// Counters could not be polled from the transport
    #[error("Failed to poll stats while testing server '{server_name}': {source}")]
    StatsUnavailable {
        server_name: String,
        source: BroadcastApiError,
    },

    /// An observer of the tester's state changes returned an error
    #[error("Test state observer failed while handling the {state:?} state: {message}")]
    ObserverFailed { state: TestState, message: String },
}
