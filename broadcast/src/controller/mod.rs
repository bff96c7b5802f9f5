//! The broadcast session state machine.
//!
//! A `BroadcastController` walks the user through authentication, login and ingest discovery, and
//! then either runs a live broadcast or an ingest test.  It never blocks: requests are issued to
//! the transport and their results are picked up by `update()`, which the host is expected to
//! call at least as often as it submits frames.

mod config;
mod errors;
mod events;
mod state;


use std::mem;
use std::rc::Rc;
use std::thread;

use tracing::{debug, info};

use crate::api::{
    is_installed, ApiCallback, AuthToken, BroadcastApiError, BroadcastApiListener, CallbackQueue,
    ChannelInfo, FrameBufferHandle, SharedBroadcastApi, StartFlags, VideoParams,
};
use crate::buffers::FrameBufferPool;
use crate::ingest::{IngestList, IngestServer, IngestTester, SharedIngestList};
use crate::reporting::{ErrorReporter, ObserverError};
use crate::time::Clock;

pub use self::config::BroadcastControllerConfig;
pub use self::errors::BroadcastControllerError;
pub use self::events::BroadcastControllerEvent;
pub use self::state::BroadcastState;

/// Callback invoked for every event the controller raises
pub type BroadcastEventObserver =
    Box<dyn FnMut(&BroadcastControllerEvent) -> Result<(), ObserverError>>;

/// Drives a broadcast session against a `BroadcastApi`.
///
/// All transport callbacks are received by a queue owned by the controller and are only acted
/// upon from within the controller's own methods, so observers are always invoked from the host's
/// thread.  While an ingest test is running the tester owns the transport's listeners, and most
/// session operations are refused until it is done.
pub struct BroadcastController {
    api: SharedBroadcastApi,
    clock: Rc<dyn Clock>,
    reporter: Rc<dyn ErrorReporter>,
    config: BroadcastControllerConfig,
    callbacks: Rc<CallbackQueue>,
    state: BroadcastState,
    logged_in: bool,
    shutting_down: bool,
    username: String,
    auth_token: AuthToken,
    channel_info: Option<ChannelInfo>,
    ingest_list: Option<SharedIngestList>,
    ingest_server: Option<IngestServer>,
    video_params: Option<VideoParams>,
    frame_buffers: Option<FrameBufferPool>,
    ingest_tester: Option<IngestTester>,
    observers: Vec<BroadcastEventObserver>,
}

impl BroadcastController {
    pub fn new(
        api: SharedBroadcastApi,
        clock: Rc<dyn Clock>,
        reporter: Rc<dyn ErrorReporter>,
        config: BroadcastControllerConfig,
    ) -> BroadcastController {
        BroadcastController {
            api,
            clock,
            reporter,
            config,
            callbacks: Rc::new(CallbackQueue::new()),
            state: BroadcastState::Uninitialized,
            logged_in: false,
            shutting_down: false,
            username: String::new(),
            auth_token: AuthToken::default(),
            channel_info: None,
            ingest_list: None,
            ingest_server: None,
            video_params: None,
            frame_buffers: None,
            ingest_tester: None,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> BroadcastState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state != BroadcastState::Uninitialized
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn is_ready_to_broadcast(&self) -> bool {
        self.state == BroadcastState::ReadyToBroadcast
    }

    /// True while a live broadcast is running, paused or not
    pub fn is_broadcasting(&self) -> bool {
        self.state == BroadcastState::Broadcasting || self.state == BroadcastState::Paused
    }

    pub fn is_paused(&self) -> bool {
        self.state == BroadcastState::Paused
    }

    pub fn is_ingest_testing(&self) -> bool {
        self.state == BroadcastState::IngestTesting
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn auth_token(&self) -> &AuthToken {
        &self.auth_token
    }

    pub fn channel_info(&self) -> Option<&ChannelInfo> {
        self.channel_info.as_ref()
    }

    /// The servers returned by the last ingest discovery
    pub fn ingest_list(&self) -> Option<SharedIngestList> {
        self.ingest_list.clone()
    }

    /// The server live broadcasts are sent to
    pub fn ingest_server(&self) -> Option<&IngestServer> {
        self.ingest_server.as_ref()
    }

    /// The parameters of the running broadcast
    pub fn video_params(&self) -> Option<&VideoParams> {
        self.video_params.as_ref()
    }

    pub fn ingest_tester(&self) -> Option<&IngestTester> {
        self.ingest_tester.as_ref()
    }

    pub fn ingest_tester_mut(&mut self) -> Option<&mut IngestTester> {
        self.ingest_tester.as_mut()
    }

    /// Registers a callback for every event the controller raises.  Errors returned by the
    /// callback are handed to the error reporter.
    pub fn on_event<F>(&mut self, observer: F)
    where
        F: FnMut(&BroadcastControllerEvent) -> Result<(), ObserverError> + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Video parameters for the given resolution and frame rate, with everything else filled in
    /// by the transport
    pub fn recommended_video_params(
        &self,
        output_width: u32,
        output_height: u32,
        target_fps: u32,
    ) -> VideoParams {
        let mut params = VideoParams::new(output_width, output_height, target_fps);
        self.api.borrow().get_default_params(&mut params);
        params
    }

    /// Initializes the transport and starts listening to its callbacks
    pub fn initialize(&mut self) -> Result<(), BroadcastControllerError> {
        if self.state != BroadcastState::Uninitialized {
            return Err(BroadcastControllerError::AlreadyInitialized);
        }

        {
            let listener: Rc<dyn BroadcastApiListener> = self.callbacks.clone();
            let mut api = self.api.borrow_mut();
            api.set_listener(Some(listener));

            if let Err(error) = api.initialize() {
                api.set_listener(None);
                return Err(error.into());
            }
        }

        info!("Broadcast controller initialized");
        self.set_state(BroadcastState::Initialized);
        Ok(())
    }

    /// Logs out (ending any broadcast) and shuts the transport down.  Refused while an ingest
    /// test is running, see `force_sync_shutdown()`.
    pub fn shutdown(&mut self) -> Result<(), BroadcastControllerError> {
        if self.state == BroadcastState::Uninitialized {
            return Ok(());
        }

        if self.is_ingest_testing() {
            return Err(BroadcastControllerError::IngestTestInProgress);
        }

        self.shutting_down = true;
        self.logout()?;
        self.release_frame_buffers();

        let result = {
            let mut api = self.api.borrow_mut();
            let result = api.shutdown();
            if is_installed(&api.listener(), &self.callbacks) {
                api.set_listener(None);
            }

            result
        };

        self.shutting_down = false;
        self.set_state(BroadcastState::Uninitialized);
        info!("Broadcast controller shut down");

        result.map_err(BroadcastControllerError::from)
    }

    /// Cancels any running ingest test, blocks until it has finished, then shuts down
    pub fn force_sync_shutdown(&mut self) -> Result<(), BroadcastControllerError> {
        if self.state == BroadcastState::Uninitialized {
            return Ok(());
        }

        self.cancel_ingest_test();
        while self.ingest_tester.is_some() {
            thread::sleep(self.config.shutdown_poll_interval);
            self.update();
        }

        self.shutdown()
    }

    /// Requests an auth token for the credentials.  Once it arrives the controller logs in and
    /// discovers ingest servers on its own.
    pub fn request_auth_token(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(), BroadcastControllerError> {
        if !self.is_initialized() {
            return Err(BroadcastControllerError::NotInitialized);
        }

        if self.is_ingest_testing() {
            return Err(BroadcastControllerError::IngestTestInProgress);
        }

        if self.state == BroadcastState::Authenticating {
            return Err(BroadcastControllerError::SessionInInvalidState {
                current_state: self.state,
            });
        }

        if username.is_empty() || password.is_empty() {
            return Err(BroadcastControllerError::InvalidCredentials);
        }

        self.logout()?;
        self.username = username.to_string();

        self.api.borrow_mut().request_auth_token(username, password)?;
        self.set_state(BroadcastState::Authenticating);
        self.process_callbacks();

        Ok(())
    }

    /// Uses an auth token saved from a previous session.  The login is attempted on the next
    /// update.
    pub fn set_auth_token(
        &mut self,
        username: &str,
        auth_token: AuthToken,
    ) -> Result<(), BroadcastControllerError> {
        if self.is_ingest_testing() {
            return Err(BroadcastControllerError::IngestTestInProgress);
        }

        self.logout()?;

        if username.is_empty() || auth_token.is_empty() {
            return Err(BroadcastControllerError::InvalidCredentials);
        }

        self.username = username.to_string();
        self.auth_token = auth_token;

        if self.is_initialized() {
            self.set_state(BroadcastState::Authenticated);
        }

        Ok(())
    }

    /// Clears the credentials, ending the broadcast first if one is running.  Returns whether a
    /// logged in user was actually logged out.
    pub fn logout(&mut self) -> Result<bool, BroadcastControllerError> {
        if self.is_ingest_testing() {
            return Err(BroadcastControllerError::IngestTestInProgress);
        }

        match self.state {
            BroadcastState::Starting | BroadcastState::Broadcasting | BroadcastState::Paused => {
                // stop synchronously so the session is gone before the credentials are
                let result = self.api.borrow_mut().stop(false);
                match result {
                    Ok(()) => self.process_callbacks(),
                    Err(source) => self.report_request_failure("stop", source),
                }
            }

            _ => (),
        }

        self.release_frame_buffers();
        self.video_params = None;
        self.username.clear();
        self.auth_token = AuthToken::default();

        let was_logged_in = mem::replace(&mut self.logged_in, false);
        self.channel_info = None;
        self.ingest_list = None;
        self.ingest_server = None;

        if was_logged_in && !self.shutting_down {
            self.raise_event(BroadcastControllerEvent::LoggedOut);
        }

        if self.is_initialized() {
            self.set_state(BroadcastState::Initialized);
        }

        if was_logged_in {
            info!("Logged out");
        }

        Ok(was_logged_in)
    }

    /// Delivers transport callbacks and advances the session.  Must be called regularly.
    pub fn update(&mut self) {
        if self.state == BroadcastState::Uninitialized {
            return;
        }

        let polled = self.api.borrow_mut().poll_tasks();
        if let Err(source) = polled {
            self.report_request_failure("poll tasks", source);
        }

        self.process_callbacks();

        if let Some(tester) = self.ingest_tester.as_mut() {
            tester.update();

            if tester.is_done() {
                info!(state = ?tester.state(), "Ingest test completed");
                self.ingest_tester = None;
                self.set_state(BroadcastState::ReadyToBroadcast);
            }
        }

        match self.state {
            BroadcastState::Authenticated => self.begin_login(),
            BroadcastState::LoggedIn => self.begin_ingest_discovery(),
            BroadcastState::ReceivedIngestServers => {
                self.set_state(BroadcastState::ReadyToBroadcast)
            }

            _ => (),
        }
    }

    /// Starts a live broadcast to the selected ingest server
    pub fn start_broadcasting(
        &mut self,
        video_params: VideoParams,
    ) -> Result<(), BroadcastControllerError> {
        if self.is_ingest_testing() {
            return Err(BroadcastControllerError::IngestTestInProgress);
        }

        if self.state != BroadcastState::ReadyToBroadcast {
            return Err(BroadcastControllerError::SessionInInvalidState {
                current_state: self.state,
            });
        }

        let server = self
            .ingest_server
            .clone()
            .ok_or(BroadcastControllerError::NoIngestServer)?;

        let pool = FrameBufferPool::allocate(
            &mut *self.api.borrow_mut(),
            self.config.frame_buffer_count,
            video_params.frame_size_bytes(),
            false,
        )?;

        let result = self.api.borrow_mut().start(
            &video_params,
            &self.config.audio_params,
            &server,
            StartFlags::NONE,
            true,
        );

        if let Err(source) = result {
            pool.free_all(&mut *self.api.borrow_mut());
            return Err(source.into());
        }

        info!(server = %server.server_name, "Starting broadcast");

        self.frame_buffers = Some(pool);
        self.video_params = Some(video_params);
        self.set_state(BroadcastState::Starting);
        self.process_callbacks();

        Ok(())
    }

    pub fn stop_broadcasting(&mut self) -> Result<(), BroadcastControllerError> {
        if !self.is_broadcasting() {
            return Err(BroadcastControllerError::SessionInInvalidState {
                current_state: self.state,
            });
        }

        self.api.borrow_mut().stop(true)?;
        self.set_state(BroadcastState::Stopping);
        self.process_callbacks();

        Ok(())
    }

    /// Replaces the outgoing video with the pause screen until the next frame is submitted.  If
    /// the transport cannot pause, the broadcast is stopped.
    pub fn pause_broadcasting(&mut self) -> Result<(), BroadcastControllerError> {
        if self.state != BroadcastState::Broadcasting {
            return Err(BroadcastControllerError::SessionInInvalidState {
                current_state: self.state,
            });
        }

        let result = self.api.borrow_mut().pause_video();
        match result {
            Ok(()) => {
                self.set_state(BroadcastState::Paused);
                Ok(())
            }

            Err(source) => {
                if let Err(error) = self.stop_broadcasting() {
                    self.reporter.report_error(&error);
                }

                Err(source.into())
            }
        }
    }

    pub fn resume_broadcasting(&mut self) -> Result<(), BroadcastControllerError> {
        if self.state != BroadcastState::Paused {
            return Err(BroadcastControllerError::SessionInInvalidState {
                current_state: self.state,
            });
        }

        self.set_state(BroadcastState::Broadcasting);
        Ok(())
    }

    /// Takes a frame buffer the host can render into.  `None` when not broadcasting or when every
    /// buffer is still held by the encoder.
    pub fn next_free_buffer(&mut self) -> Option<FrameBufferHandle> {
        if !self.is_broadcasting() {
            return None;
        }

        self.frame_buffers.as_mut()?.acquire()
    }

    /// Hands a frame to the encoder.  A paused broadcast is resumed.  If the encoder rejects the
    /// frame the broadcast is stopped and `FrameSubmissionIssue` is raised.
    pub fn submit_frame(&mut self, buffer: FrameBufferHandle) -> Result<(), BroadcastControllerError> {
        if self.state == BroadcastState::Paused {
            self.resume_broadcasting()?;
        } else if self.state != BroadcastState::Broadcasting {
            return Err(BroadcastControllerError::SessionInInvalidState {
                current_state: self.state,
            });
        }

        let result = self.api.borrow_mut().submit_video_frame(buffer);
        if let Err(source) = result {
            self.report_request_failure("frame submission", source.clone());

            if let Some(pool) = self.frame_buffers.as_mut() {
                pool.release(buffer);
            }

            if let Err(error) = self.stop_broadcasting() {
                self.reporter.report_error(&error);
            }

            self.raise_event(BroadcastControllerEvent::FrameSubmissionIssue {
                error: source.clone(),
            });

            return Err(source.into());
        }

        Ok(())
    }

    /// Chooses the discovered server that live broadcasts are sent to
    pub fn select_ingest_server(&mut self, server_name: &str) -> Result<(), BroadcastControllerError> {
        let list = self
            .ingest_list
            .as_ref()
            .ok_or(BroadcastControllerError::NoIngestServer)?;

        let server = list
            .borrow()
            .server_by_name(server_name)
            .cloned()
            .ok_or_else(|| BroadcastControllerError::UnknownIngestServer {
                name: server_name.to_string(),
            })?;

        debug!(server = %server.server_name, "Ingest server selected");
        self.ingest_server = Some(server);
        Ok(())
    }

    /// Starts measuring every discovered ingest server.  Returns `None` without changing anything
    /// unless the controller is ready to broadcast and has an ingest list.  The controller returns
    /// to `ReadyToBroadcast` on the update after the test is done.
    pub fn start_ingest_test(&mut self) -> Option<&mut IngestTester> {
        if self.state != BroadcastState::ReadyToBroadcast || self.ingest_tester.is_some() {
            return None;
        }

        let ingest_list = self.ingest_list.clone()?;

        let mut tester = IngestTester::new(
            self.api.clone(),
            ingest_list,
            self.clock.clone(),
            self.reporter.clone(),
            self.config.ingest_test.clone(),
        );

        tester.start();
        self.ingest_tester = Some(tester);
        self.set_state(BroadcastState::IngestTesting);

        self.ingest_tester.as_mut()
    }

    /// Asks the running ingest test to cancel.  The controller leaves `IngestTesting` once the
    /// tester reports that it is done.
    pub fn cancel_ingest_test(&mut self) {
        if !self.is_ingest_testing() {
            return;
        }

        if let Some(tester) = self.ingest_tester.as_mut() {
            tester.cancel();
        }
    }

    fn begin_login(&mut self) {
        self.set_state(BroadcastState::LoggingIn);

        let result = self.api.borrow_mut().login(&self.auth_token);
        if let Err(source) = result {
            self.report_request_failure("login", source.clone());
            self.set_state(BroadcastState::Initialized);
            self.raise_event(BroadcastControllerEvent::LoginAttemptCompleted {
                result: Err(source),
            });

            return;
        }

        self.process_callbacks();
    }

    fn begin_ingest_discovery(&mut self) {
        self.set_state(BroadcastState::FindingIngestServer);

        let result = self.api.borrow_mut().get_ingest_servers(&self.auth_token);
        if let Err(source) = result {
            // retried on the next update
            self.report_request_failure("ingest discovery", source);
            self.set_state(BroadcastState::LoggedIn);
            return;
        }

        self.process_callbacks();
    }

    fn process_callbacks(&mut self) {
        let callbacks = self.callbacks.clone();
        while let Some(callback) = callbacks.pop() {
            match callback {
                ApiCallback::AuthTokenReceived(result) => self.handle_auth_token(result),
                ApiCallback::LoginCompleted(result) => self.handle_login(result),
                ApiCallback::IngestServersReceived(result) => self.handle_ingest_servers(result),
                ApiCallback::Started(result) => self.handle_start(result),
                ApiCallback::Stopped(result) => self.handle_stop(result),
                ApiCallback::BufferUnlocked(buffer) => {
                    if let Some(pool) = self.frame_buffers.as_mut() {
                        pool.release(buffer);
                    }
                }

                ApiCallback::Stat { .. } => (),
            }
        }
    }

    fn handle_auth_token(&mut self, result: Result<AuthToken, BroadcastApiError>) {
        if self.state != BroadcastState::Authenticating {
            debug!(state = ?self.state, "Ignoring auth token callback");
            return;
        }

        match &result {
            Ok(auth_token) => {
                self.auth_token = auth_token.clone();
                self.set_state(BroadcastState::Authenticated);
            }

            Err(source) => {
                self.auth_token = AuthToken::default();
                self.set_state(BroadcastState::Initialized);
                self.report_request_failure("auth token", source.clone());
            }
        }

        self.raise_event(BroadcastControllerEvent::AuthTokenRequestCompleted { result });
    }

    fn handle_login(&mut self, result: Result<ChannelInfo, BroadcastApiError>) {
        if self.state != BroadcastState::LoggingIn {
            debug!(state = ?self.state, "Ignoring login callback");
            return;
        }

        match &result {
            Ok(channel_info) => {
                info!(channel = %channel_info.name, "Logged in");
                self.channel_info = Some(channel_info.clone());
                self.logged_in = true;
                self.set_state(BroadcastState::LoggedIn);
            }

            Err(source) => {
                self.logged_in = false;
                self.set_state(BroadcastState::Initialized);
                self.report_request_failure("login", source.clone());
            }
        }

        self.raise_event(BroadcastControllerEvent::LoginAttemptCompleted { result });
    }

    fn handle_ingest_servers(&mut self, result: Result<IngestList, BroadcastApiError>) {
        if self.state != BroadcastState::FindingIngestServer {
            debug!(state = ?self.state, "Ignoring ingest server callback");
            return;
        }

        match result {
            Ok(list) => {
                // use the default server unless the host picks another one
                self.ingest_server = list.default_server().or_else(|| list.servers.first()).cloned();
                self.ingest_list = Some(list.clone().into_shared());

                info!(server_count = list.len(), "Received ingest servers");
                self.set_state(BroadcastState::ReceivedIngestServers);
                self.raise_event(BroadcastControllerEvent::IngestListReceived { servers: list });
            }

            Err(source) => {
                self.report_request_failure("ingest discovery", source);
                self.set_state(BroadcastState::LoggedIn);
            }
        }
    }

    fn handle_start(&mut self, result: Result<(), BroadcastApiError>) {
        if self.state != BroadcastState::Starting {
            debug!(state = ?self.state, "Ignoring start callback");
            return;
        }

        match result {
            Ok(()) => {
                info!("Broadcast started");
                self.raise_event(BroadcastControllerEvent::BroadcastStarted);
                self.set_state(BroadcastState::Broadcasting);
            }

            Err(source) => {
                self.video_params = None;
                self.release_frame_buffers();
                self.set_state(BroadcastState::ReadyToBroadcast);
                self.report_request_failure("start", source);
            }
        }
    }

    fn handle_stop(&mut self, result: Result<(), BroadcastApiError>) {
        match self.state {
            BroadcastState::Starting
            | BroadcastState::Broadcasting
            | BroadcastState::Paused
            | BroadcastState::Stopping => (),

            _ => {
                debug!(state = ?self.state, "Ignoring stop callback");
                return;
            }
        }

        self.video_params = None;
        self.release_frame_buffers();

        match result {
            Ok(()) => {
                info!("Broadcast stopped");
                self.raise_event(BroadcastControllerEvent::BroadcastStopped);

                if self.logged_in {
                    self.set_state(BroadcastState::ReadyToBroadcast);
                } else {
                    self.set_state(BroadcastState::Initialized);
                }
            }

            Err(source) => {
                self.set_state(BroadcastState::ReadyToBroadcast);
                self.report_request_failure("stop", source);
            }
        }
    }

    fn release_frame_buffers(&mut self) {
        if let Some(pool) = self.frame_buffers.take() {
            pool.free_all(&mut *self.api.borrow_mut());
        }
    }

    fn report_request_failure(&self, request: &'static str, source: BroadcastApiError) {
        self.reporter
            .report_error(&BroadcastControllerError::RequestFailed { request, source });
    }

    fn set_state(&mut self, state: BroadcastState) {
        if state == self.state {
            return;
        }

        let previous = mem::replace(&mut self.state, state);
        debug!(from = ?previous, to = ?state, "Broadcast state changed");

        self.raise_event(BroadcastControllerEvent::StateChanged {
            previous,
            current: state,
        });
    }

    fn raise_event(&mut self, event: BroadcastControllerEvent) {
        let mut observers = mem::take(&mut self.observers);
        for observer in observers.iter_mut() {
            if let Err(error) = observer(&event) {
                self.reporter.report_error(&BroadcastControllerError::ObserverFailed {
                    message: error.to_string(),
                });
            }
        }

        self.observers = observers;
    }
}

impl Drop for BroadcastController {
    fn drop(&mut self) {
        // the tester restores our listener when dropped, so it has to go first
        self.ingest_tester = None;

        let shared = self.api.clone();
        let mut api = match shared.try_borrow_mut() {
            Ok(api) => api,
            Err(_) => return,
        };

        if let Some(pool) = self.frame_buffers.take() {
            pool.free_all(&mut *api);
        }

        if is_installed(&api.listener(), &self.callbacks) {
            api.set_listener(None);
        }
    }
}
