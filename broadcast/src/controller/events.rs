use super::BroadcastState;
use crate::api::{AuthToken, BroadcastApiError, ChannelInfo};
use crate::ingest::IngestList;

/// Events raised by the broadcast controller so hosts can react to its progress
#[derive(PartialEq, Debug, Clone)]
pub enum BroadcastControllerEvent {
    /// The auth token request issued by `request_auth_token()` has completed
    AuthTokenRequestCompleted {
        result: Result<AuthToken, BroadcastApiError>,
    },

    /// A login attempt has completed, either successfully or not
    LoginAttemptCompleted {
        result: Result<ChannelInfo, BroadcastApiError>,
    },

    StateChanged {
        previous: BroadcastState,
        current: BroadcastState,
    },

    /// Raised when the user was logged out explicitly, never while shutting down
    LoggedOut,

    /// Ingest discovery completed.  The default server has been selected for live broadcasts.
    IngestListReceived { servers: IngestList },

    /// A submitted frame was rejected and the broadcast is being stopped
    FrameSubmissionIssue { error: BroadcastApiError },

    BroadcastStarted,
    BroadcastStopped,
}
