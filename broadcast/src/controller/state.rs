/// The states a `BroadcastController` moves through
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BroadcastState {
    /// The transport has not been initialized
    Uninitialized,

    /// The transport is initialized but nobody is logged in
    Initialized,

    /// Waiting for the auth token request to complete
    Authenticating,

    /// An auth token is known, a login will be attempted on the next update
    Authenticated,

    /// Waiting for the login to complete
    LoggingIn,

    /// Logged in, ingest discovery will be attempted on the next update
    LoggedIn,

    /// Waiting for ingest discovery to complete
    FindingIngestServer,

    /// The ingest list is known
    ReceivedIngestServers,

    /// Idle and able to start either a broadcast or an ingest test
    ReadyToBroadcast,

    /// Waiting for the broadcast's start callback
    Starting,

    Broadcasting,

    /// Waiting for the broadcast's stop callback
    Stopping,

    /// Broadcasting with the pause screen shown instead of submitted frames
    Paused,

    /// An ingest test owns the transport
    IngestTesting,
}
