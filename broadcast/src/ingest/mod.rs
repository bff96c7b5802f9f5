//! Ingest bandwidth testing.
//!
//! An ingest test opens a short, bandwidth-test flagged encode session against every server in
//! an `IngestList`, feeds it synthetic frames, and records the upload throughput the transport
//! reports into each server's `bitrate_kbps` field.

mod config;
mod errors;
mod server;
mod state;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use tracing::{debug, info};

use crate::api::{
    is_installed, ApiCallback, AudioParams, BroadcastApi, BroadcastApiError,
    BroadcastApiListener, CallbackQueue, PixelFormat, RtmpState, SharedBroadcastApi, StartFlags,
    StatType, StatsListener, VideoParams,
};
use crate::buffers::FrameBufferPool;
use crate::reporting::{ErrorReporter, ObserverError};
use crate::time::{Clock, Stopwatch};

pub use self::config::IngestTesterConfig;
pub use self::errors::IngestTestError;
pub use self::server::{IngestList, IngestServer, SharedIngestList};
pub use self::state::TestState;

/// Callback invoked every time an `IngestTester` changes state
pub type TestStateObserver = Box<dyn FnMut(&IngestTester, TestState) -> Result<(), ObserverError>>;

/// Measures the upload bandwidth to each server of an ingest list.
///
/// A tester is single use.  After `start()` the host must call `update()` repeatedly from its
/// polling loop (after letting the transport deliver callbacks via `poll_tasks()`).  Each call
/// advances the test by at most one step, so the measurement resolution depends on how often
/// `update()` is called.
///
/// While running, the tester replaces the transport's listeners with its own and puts the
/// previous ones back once the run is over.  No other code may start or stop transport sessions
/// until `is_done()` returns true.
pub struct IngestTester {
    api: SharedBroadcastApi,
    ingest_list: SharedIngestList,
    reporter: Rc<dyn ErrorReporter>,
    config: IngestTesterConfig,
    timer: Stopwatch,
    callbacks: Rc<CallbackQueue>,
    previous_listener: Option<Rc<dyn BroadcastApiListener>>,
    previous_stats_listener: Option<Rc<dyn StatsListener>>,
    video_params: VideoParams,
    audio_params: AudioParams,
    buffers: Option<FrameBufferPool>,
    state: TestState,
    current_server: Option<usize>,
    server_index: usize,
    total_sent: u64,
    last_total_sent: u64,
    rtmp_state: RtmpState,
    server_test_succeeded: bool,
    skip_requested: bool,
    cancel_requested: bool,
    waiting_for_start_callback: bool,
    waiting_for_stop_callback: bool,
    session_active: bool,
    total_progress: f32,
    server_progress: f32,
    observers: Vec<TestStateObserver>,
}

impl IngestTester {
    pub fn new(
        api: SharedBroadcastApi,
        ingest_list: SharedIngestList,
        clock: Rc<dyn Clock>,
        reporter: Rc<dyn ErrorReporter>,
        config: IngestTesterConfig,
    ) -> IngestTester {
        let mut video_params =
            VideoParams::new(config.output_width, config.output_height, config.target_fps);
        video_params.max_kbps = config.max_kbps;
        video_params.pixel_format = PixelFormat::Bgra;
        video_params.disable_adaptive_bitrate = true;
        video_params.vertical_flip = false;

        IngestTester {
            api,
            ingest_list,
            reporter,
            config,
            timer: Stopwatch::new(clock),
            callbacks: Rc::new(CallbackQueue::new()),
            previous_listener: None,
            previous_stats_listener: None,
            video_params,
            audio_params: AudioParams::disabled(),
            buffers: None,
            state: TestState::Uninitalized,
            current_server: None,
            server_index: 0,
            total_sent: 0,
            last_total_sent: 0,
            rtmp_state: RtmpState::Invalid,
            server_test_succeeded: false,
            skip_requested: false,
            cancel_requested: false,
            waiting_for_start_callback: false,
            waiting_for_stop_callback: false,
            session_active: false,
            total_progress: 0.0,
            server_progress: 0.0,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> TestState {
        self.state
    }

    /// True once the run finished, was cancelled, or failed to start
    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    /// The server currently under test.  `None` before the first server and after the last.
    pub fn current_server(&self) -> Option<IngestServer> {
        let index = self.current_server?;
        self.ingest_list.borrow().servers.get(index).cloned()
    }

    pub fn current_server_index(&self) -> Option<usize> {
        self.current_server
    }

    /// The list being tested.  Measurements are written into it as they are taken.
    pub fn ingest_list(&self) -> SharedIngestList {
        self.ingest_list.clone()
    }

    /// Overall progress of the run in the range [0, 1]
    pub fn total_progress(&self) -> f32 {
        self.total_progress
    }

    /// Progress of the current server's measurement in the range [0, 1]
    pub fn server_progress(&self) -> f32 {
        self.server_progress
    }

    pub fn test_duration_ms(&self) -> u64 {
        self.config.test_duration_ms
    }

    /// How long each server is measured.  Longer durations give more accurate results.
    pub fn set_test_duration_ms(&mut self, duration_ms: u64) {
        self.config.test_duration_ms = duration_ms;
    }

    /// Registers a callback that is invoked from within `start()`/`update()` whenever the state
    /// changes.  Errors returned by the callback are handed to the error reporter.
    pub fn on_test_state_changed<F>(&mut self, observer: F)
    where
        F: FnMut(&IngestTester, TestState) -> Result<(), ObserverError> + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Begins the test run.  Does nothing if the tester has already been started.
    pub fn start(&mut self) {
        if self.state != TestState::Uninitalized {
            return;
        }

        self.server_index = 0;
        self.current_server = None;
        self.skip_requested = false;
        self.session_active = false;
        self.waiting_for_start_callback = false;
        self.waiting_for_stop_callback = false;

        let allocation = {
            let mut api = self.api.borrow_mut();

            let stats_listener: Rc<dyn StatsListener> = self.callbacks.clone();
            self.previous_stats_listener = api.stats_listener();
            api.set_stats_listener(Some(stats_listener));

            let listener: Rc<dyn BroadcastApiListener> = self.callbacks.clone();
            self.previous_listener = api.listener();
            api.set_listener(Some(listener));

            api.get_default_params(&mut self.video_params);

            FrameBufferPool::allocate(
                &mut *api,
                self.config.frame_buffer_count,
                self.video_params.frame_size_bytes(),
                self.config.randomize_frame_buffers,
            )
        };

        match allocation {
            Ok(pool) => self.buffers = Some(pool),
            Err(error) => {
                self.reporter.report_error(&IngestTestError::from(error));
                self.cleanup();
                self.set_state(TestState::Failed);
                self.update_progress();
                return;
            }
        }

        info!(
            server_count = self.server_count(),
            test_duration_ms = self.config.test_duration_ms,
            "Starting ingest test"
        );

        self.timer.reset();
        self.set_state(TestState::Starting);
        self.update_progress();
    }

    /// Advances the test.  Should be called as often as possible.
    pub fn update(&mut self) {
        if self.is_done() || self.state == TestState::Uninitalized {
            return;
        }

        self.process_callbacks();

        // nothing can happen until the transport answers
        if self.waiting_for_start_callback || self.waiting_for_stop_callback {
            return;
        }

        match self.state {
            TestState::Starting | TestState::DoneTestingServer => self.advance_server(),
            TestState::ConnectingToServer | TestState::TestingServer => self.update_server_test(),
            TestState::Cancelling => self.set_state(TestState::Cancelled),
            _ => (),
        }

        self.update_progress();

        if self.state == TestState::Finished || self.state == TestState::Cancelled {
            self.cleanup();
        }
    }

    /// Ends the measurement of the current server early, keeping whatever bitrate was measured
    /// so far.  Only has an effect while a server is being connected to or tested.
    pub fn skip_current_server(&mut self) {
        if self.is_done() {
            return;
        }

        match self.state {
            TestState::ConnectingToServer | TestState::TestingServer => self.skip_requested = true,
            _ => (),
        }
    }

    /// Cancels the remainder of the run.  The server under test is reset to 0 and its session is
    /// shut down before the tester reports `Cancelled`.
    pub fn cancel(&mut self) {
        if self.is_done() {
            return;
        }

        self.cancel_requested = true;

        if let Some(index) = self.current_server {
            self.write_bitrate(index, 0.0);
        }
    }

    fn server_count(&self) -> usize {
        self.ingest_list.borrow().len()
    }

    fn server_name(&self, index: usize) -> String {
        self.ingest_list
            .borrow()
            .servers
            .get(index)
            .map(|server| server.server_name.clone())
            .unwrap_or_default()
    }

    fn write_bitrate(&self, index: usize, bitrate_kbps: f32) {
        if let Some(server) = self.ingest_list.borrow_mut().servers.get_mut(index) {
            server.bitrate_kbps = bitrate_kbps;
        }
    }

    fn advance_server(&mut self) {
        // retire the previous server before moving on
        if let Some(index) = self.current_server {
            if !self.server_test_succeeded || self.cancel_requested {
                self.write_bitrate(index, 0.0);
            }

            self.stop_server_test();
            return;
        }

        if self.cancel_requested {
            self.set_state(TestState::Cancelling);
            return;
        }

        self.timer.reset();
        self.skip_requested = false;
        self.server_test_succeeded = true;

        if self.state != TestState::Starting {
            self.server_index += 1;
        }

        if self.server_index < self.server_count() {
            self.start_server_test(self.server_index);
        } else {
            self.set_state(TestState::Finished);
        }
    }

    fn start_server_test(&mut self, index: usize) {
        let server = match self.ingest_list.borrow().servers.get(index) {
            Some(server) => server.clone(),
            None => return,
        };

        self.server_test_succeeded = true;
        self.total_sent = 0;
        self.last_total_sent = 0;
        self.rtmp_state = RtmpState::Idle;
        self.current_server = Some(index);
        self.write_bitrate(index, 0.0);

        if let Some(pool) = self.buffers.as_mut() {
            pool.reset_cursor();
        }

        debug!(server = %server.server_name, "Starting server test");

        self.waiting_for_start_callback = true;
        self.set_state(TestState::ConnectingToServer);

        let result = self.api.borrow_mut().start(
            &self.video_params,
            &self.audio_params,
            &server,
            StartFlags::BANDWIDTH_TEST,
            true,
        );

        if let Err(source) = result {
            self.waiting_for_start_callback = false;
            self.server_test_succeeded = false;
            self.reporter.report_error(&IngestTestError::StartFailed {
                server_name: server.server_name,
                source,
            });

            self.set_state(TestState::DoneTestingServer);
            return;
        }

        self.last_total_sent = self.total_sent;
        self.process_callbacks();
    }

    fn stop_server_test(&mut self) {
        debug_assert!(!self.waiting_for_start_callback && !self.waiting_for_stop_callback);

        if !self.session_active {
            // nothing was ever started on the transport so there is nothing to wait for
            self.complete_server_stop();
            return;
        }

        self.waiting_for_stop_callback = true;

        let result = self.api.borrow_mut().stop(true);
        if let Err(source) = result {
            self.report_stop_failure(source);
            self.complete_server_stop();
            return;
        }

        self.process_callbacks();
    }

    fn complete_server_stop(&mut self) {
        self.waiting_for_stop_callback = false;
        self.session_active = false;

        self.set_state(TestState::DoneTestingServer);

        if let Some(index) = self.current_server.take() {
            if let Some(server) = self.ingest_list.borrow().servers.get(index) {
                info!(
                    server = %server.server_name,
                    bitrate_kbps = server.bitrate_kbps,
                    "Finished testing server"
                );
            }
        }

        if self.cancel_requested {
            self.set_state(TestState::Cancelling);
        }
    }

    fn update_server_test(&mut self) {
        if self.skip_requested
            || self.cancel_requested
            || self.timer.elapsed_ms() >= self.config.test_duration_ms
        {
            self.set_state(TestState::DoneTestingServer);
            return;
        }

        let index = match self.current_server {
            Some(index) => index,
            None => {
                self.set_state(TestState::DoneTestingServer);
                return;
            }
        };

        let buffer = match self.buffers.as_mut().and_then(|pool| pool.next_round_robin()) {
            Some(buffer) => buffer,
            None => {
                self.server_test_succeeded = false;
                self.set_state(TestState::DoneTestingServer);
                return;
            }
        };

        let submitted = self.api.borrow_mut().submit_video_frame(buffer);
        if let Err(source) = submitted {
            self.server_test_succeeded = false;
            self.reporter.report_error(&IngestTestError::FrameSubmissionFailed {
                server_name: self.server_name(index),
                source,
            });

            self.set_state(TestState::DoneTestingServer);
            return;
        }

        let polled = self.api.borrow_mut().poll_stats();
        if let Err(source) = polled {
            self.reporter.report_warning(&IngestTestError::StatsUnavailable {
                server_name: self.server_name(index),
                source,
            });
        }

        self.process_callbacks();

        if self.rtmp_state == RtmpState::SendVideo {
            self.set_state(TestState::TestingServer);

            let elapsed_ms = self.timer.elapsed_ms();
            if elapsed_ms > 0 && self.total_sent > self.last_total_sent {
                let bitrate_kbps = (self.total_sent * 8) as f32 / elapsed_ms as f32;
                self.write_bitrate(index, bitrate_kbps);
                self.last_total_sent = self.total_sent;
            }
        }
    }

    fn update_progress(&mut self) {
        self.server_progress = match self.state {
            TestState::TestingServer => {
                if self.config.test_duration_ms == 0 {
                    1.0
                } else {
                    let elapsed = self.timer.elapsed_ms() as f32;
                    (elapsed / self.config.test_duration_ms as f32).min(1.0)
                }
            }

            TestState::DoneTestingServer | TestState::Cancelling => 1.0,
            _ => 0.0,
        };

        self.total_progress = if self.state.is_terminal() {
            1.0
        } else {
            let count = self.server_count();
            if count == 0 {
                0.0
            } else {
                let completed = self.server_index as f32 + self.server_progress;
                (completed / count as f32).min(1.0)
            }
        };
    }

    fn process_callbacks(&mut self) {
        let callbacks = self.callbacks.clone();
        while let Some(callback) = callbacks.pop() {
            match callback {
                ApiCallback::Started(result) => self.handle_start_callback(result),
                ApiCallback::Stopped(result) => self.handle_stop_callback(result),
                ApiCallback::Stat { stat, value } => self.handle_stat(stat, value),
                _ => (),
            }
        }
    }

    fn handle_start_callback(&mut self, result: Result<(), BroadcastApiError>) {
        if !self.waiting_for_start_callback {
            debug!("Ignoring start callback that was not requested by the ingest tester");
            return;
        }

        self.waiting_for_start_callback = false;

        match result {
            Ok(()) => {
                self.session_active = true;
                self.timer.restart();
                self.set_state(TestState::ConnectingToServer);
            }

            Err(source) => {
                self.server_test_succeeded = false;
                let server_name = self.current_server.map(|index| self.server_name(index));
                self.reporter.report_error(&IngestTestError::StartFailed {
                    server_name: server_name.unwrap_or_default(),
                    source,
                });

                self.set_state(TestState::DoneTestingServer);
            }
        }
    }

    fn handle_stop_callback(&mut self, result: Result<(), BroadcastApiError>) {
        if !self.waiting_for_stop_callback {
            debug!("Ignoring stop callback that was not requested by the ingest tester");
            return;
        }

        // the transport can't be recovered at this point, carry on as if it stopped
        if let Err(source) = result {
            self.report_stop_failure(source);
        }

        self.complete_server_stop();
    }

    fn handle_stat(&mut self, stat: StatType, value: u64) {
        match stat {
            StatType::RtmpState => self.rtmp_state = RtmpState::from_stat_value(value),
            StatType::RtmpDataSent => self.total_sent = value,
        }
    }

    fn report_stop_failure(&self, source: BroadcastApiError) {
        let server_name = self.current_server.map(|index| self.server_name(index));
        self.reporter.report_warning(&IngestTestError::StopFailed {
            server_name: server_name.unwrap_or_default(),
            source,
        });
    }

    fn cleanup(&mut self) {
        let shared = self.api.clone();
        let mut api = shared.borrow_mut();
        self.release_resources(&mut *api);
    }

    fn release_resources(&mut self, api: &mut dyn BroadcastApi) {
        self.current_server = None;

        if let Some(pool) = self.buffers.take() {
            pool.free_all(api);
        }

        // only restore if nobody replaced our listeners in the meantime
        if is_installed(&api.stats_listener(), &self.callbacks) {
            api.set_stats_listener(self.previous_stats_listener.take());
        }

        if is_installed(&api.listener(), &self.callbacks) {
            api.set_listener(self.previous_listener.take());
        }
    }

    fn set_state(&mut self, state: TestState) {
        if state == self.state {
            return;
        }

        debug!(from = ?self.state, to = ?state, "Ingest test state changed");
        self.state = state;

        let mut observers = std::mem::take(&mut self.observers);
        for observer in observers.iter_mut() {
            if let Err(error) = observer(&*self, state) {
                self.reporter.report_error(&IngestTestError::ObserverFailed {
                    state,
                    message: error.to_string(),
                });
            }
        }

        self.observers = observers;
    }
}

impl Drop for IngestTester {
    fn drop(&mut self) {
        let shared = self.api.clone();
        let mut api = match shared.try_borrow_mut() {
            Ok(api) => api,
            Err(_) => return,
        };

        if self.waiting_for_stop_callback {
            // the transport is already tearing the session down
        } else if self.session_active {
            if let Err(source) = api.stop(false) {
                self.report_stop_failure(source);
            }
        } else if self.waiting_for_start_callback {
            // the start may already have produced a session even though we never heard back
            if let Err(source) = api.stop(false) {
                debug!(%source, "No session to stop for the unanswered start request");
            }
        }

        self.session_active = false;
        self.waiting_for_start_callback = false;
        self.waiting_for_stop_callback = false;
        self.release_resources(&mut *api);
    }
}
