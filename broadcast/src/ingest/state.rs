/// The states an `IngestTester` moves through during its single run
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TestState {
    /// `start()` has not been called yet
    Uninitalized,

    /// Buffers are allocated and the first server is about to be tested
    Starting,

    /// A session has been requested for the current server and no video is flowing yet
    ConnectingToServer,

    /// Video is flowing to the current server and its throughput is being measured
    TestingServer,

    /// The current server's measurement is over and its session is being shut down
    DoneTestingServer,

    /// Every server has been tested
    Finished,

    /// The run was cancelled and the last session has been shut down
    Cancelling,

    /// The run was cancelled before every server was tested
    Cancelled,

    /// The run could not start
    Failed,
}

impl TestState {
    /// True for states the tester can never leave
    pub fn is_terminal(self) -> bool {
        match self {
            TestState::Finished | TestState::Cancelled | TestState::Failed => true,
            _ => false,
        }
    }
}
