//! An in-memory `BroadcastApi` that never touches the network.
//!
//! Every server the simulator knows about can be given its own behavior (rejecting the start
//! request, failing the start callback, taking a few stat polls to connect, rejecting frames,
//! failing to stop).  Callbacks are delivered either before the originating call returns or on the
//! next `poll_tasks()`, which lets hosts and tests exercise both delivery paths the real
//! transport uses.

use std::collections::{HashMap, VecDeque};
use std::mem;
use std::rc::Rc;

use bytes::BytesMut;
use rand::{thread_rng, RngCore};
use tracing::trace;

use crate::api::{
    ApiCallback, AudioParams, AuthToken, BroadcastApi, BroadcastApiError, BroadcastApiListener,
    ChannelInfo, FrameBufferHandle, RtmpState, StartFlags, StatType, StatsListener, VideoParams,
    MAX_BITRATE_KBPS, MAX_FPS, MIN_BITRATE_KBPS,
};
use crate::ingest::{IngestList, IngestServer};

/// When the simulator hands results of asynchronous requests to the listener
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum CallbackDelivery {
    /// Before the originating call returns
    Immediate,

    /// During the next call to `poll_tasks()`
    NextPoll,
}

/// A server known to the simulator along with how it behaves
#[derive(PartialEq, Debug, Clone)]
pub struct SimulatedServer {
    pub server: IngestServer,

    /// `start()` itself returns an error
    pub rejects_start: bool,

    /// `start()` succeeds but the start callback reports an error
    pub fails_to_start: bool,

    /// Number of stat polls after the start before the connection reports `SendVideo`
    pub connect_polls: u32,

    /// Bytes counted as sent for every frame submitted while sending video
    pub bytes_per_frame: u64,

    /// Frames are rejected once this many have been accepted
    pub rejects_frames_after: Option<u32>,

    /// The stop callback reports an error
    pub fails_to_stop: bool,
}

impl SimulatedServer {
    pub fn new(server: IngestServer) -> SimulatedServer {
        SimulatedServer {
            server,
            rejects_start: false,
            fails_to_start: false,
            connect_polls: 1,
            bytes_per_frame: 10_000,
            rejects_frames_after: None,
            fails_to_stop: false,
        }
    }
}

/// Requests received by the simulator, recorded in call order
#[derive(PartialEq, Debug, Clone)]
pub enum SimulatedCall {
    Initialize,
    Shutdown,
    RequestAuthToken { username: String },
    Login { auth_token: AuthToken },
    GetIngestServers,
    Start {
        server_url: String,
        flags: StartFlags,
        is_async: bool,
    },
    Stop { is_async: bool },
    PauseVideo,
    SubmitVideoFrame(FrameBufferHandle),
    AllocateFrameBuffer { size: usize },
    FreeFrameBuffer(FrameBufferHandle),
}

struct ActiveStream {
    server: usize,
    frames_accepted: u32,
    stat_polls: u32,
    bytes_sent: u64,
}

impl ActiveStream {
    fn is_sending_video(&self, server: &SimulatedServer) -> bool {
        self.stat_polls >= server.connect_polls
    }
}

pub struct SimulatedBroadcastApi {
    /// How results of asynchronous requests are delivered
    pub delivery: CallbackDelivery,

    /// Every auth token request is answered with an authentication failure
    pub rejects_credentials: bool,

    /// Every login is answered with an authentication failure
    pub rejects_login: bool,

    /// Ingest discovery is answered with a transport error
    pub fails_ingest_discovery: bool,

    servers: Vec<SimulatedServer>,
    channel: ChannelInfo,
    listener: Option<Rc<dyn BroadcastApiListener>>,
    stats_listener: Option<Rc<dyn StatsListener>>,
    initialized: bool,
    stream: Option<ActiveStream>,
    pending: VecDeque<ApiCallback>,
    locked_buffers: Vec<FrameBufferHandle>,
    frame_buffers: HashMap<FrameBufferHandle, BytesMut>,
    frame_buffer_limit: Option<usize>,
    next_buffer_id: u64,
    calls: Vec<SimulatedCall>,
}

impl SimulatedBroadcastApi {
    pub fn new(servers: Vec<IngestServer>) -> SimulatedBroadcastApi {
        SimulatedBroadcastApi {
            delivery: CallbackDelivery::Immediate,
            rejects_credentials: false,
            rejects_login: false,
            fails_ingest_discovery: false,
            servers: servers.into_iter().map(SimulatedServer::new).collect(),
            channel: ChannelInfo {
                name: "simulated".to_string(),
                display_name: "Simulated Channel".to_string(),
                channel_url: "https://example.invalid/simulated".to_string(),
            },
            listener: None,
            stats_listener: None,
            initialized: false,
            stream: None,
            pending: VecDeque::new(),
            locked_buffers: Vec::new(),
            frame_buffers: HashMap::new(),
            frame_buffer_limit: None,
            next_buffer_id: 1,
            calls: Vec::new(),
        }
    }

    /// The behavior of the server with the given name
    pub fn server_mut(&mut self, server_name: &str) -> Option<&mut SimulatedServer> {
        self.servers
            .iter_mut()
            .find(|server| server.server.server_name == server_name)
    }

    /// Caps the number of frame buffers that may be alive at the same time
    pub fn set_frame_buffer_limit(&mut self, limit: Option<usize>) {
        self.frame_buffer_limit = limit;
    }

    pub fn live_frame_buffers(&self) -> usize {
        self.frame_buffers.len()
    }

    pub fn frame_buffer_contents(&self, buffer: FrameBufferHandle) -> Option<&[u8]> {
        self.frame_buffers.get(&buffer).map(|data| &data[..])
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Number of callbacks waiting for the next `poll_tasks()`
    pub fn pending_callbacks(&self) -> usize {
        self.pending.len()
    }

    pub fn calls(&self) -> &[SimulatedCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn dispatch(&mut self, callback: ApiCallback, is_async: bool) {
        if is_async && self.delivery == CallbackDelivery::NextPoll {
            self.pending.push_back(callback);
        } else {
            self.deliver(callback);
        }
    }

    fn deliver(&self, callback: ApiCallback) {
        trace!(?callback, "Delivering simulated callback");

        if let ApiCallback::Stat { stat, value } = callback {
            if let Some(listener) = &self.stats_listener {
                listener.stat_callback(stat, value);
            }

            return;
        }

        let listener = match &self.listener {
            Some(listener) => listener,
            None => return,
        };

        match callback {
            ApiCallback::AuthTokenReceived(result) => listener.request_auth_token_callback(result),
            ApiCallback::LoginCompleted(result) => listener.login_callback(result),
            ApiCallback::IngestServersReceived(result) => {
                listener.get_ingest_servers_callback(result)
            }
            ApiCallback::Started(result) => listener.start_callback(result),
            ApiCallback::Stopped(result) => listener.stop_callback(result),
            ApiCallback::BufferUnlocked(buffer) => listener.buffer_unlock_callback(buffer),
            ApiCallback::Stat { .. } => (),
        }
    }

    fn ensure_initialized(&self) -> Result<(), BroadcastApiError> {
        if self.initialized {
            Ok(())
        } else {
            Err(BroadcastApiError::NotInitialized)
        }
    }
}

impl BroadcastApi for SimulatedBroadcastApi {
    fn initialize(&mut self) -> Result<(), BroadcastApiError> {
        self.calls.push(SimulatedCall::Initialize);
        if self.initialized {
            return Err(BroadcastApiError::AlreadyInitialized);
        }

        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), BroadcastApiError> {
        self.calls.push(SimulatedCall::Shutdown);
        self.ensure_initialized()?;

        self.initialized = false;
        self.stream = None;
        self.pending.clear();
        self.locked_buffers.clear();
        Ok(())
    }

    fn listener(&self) -> Option<Rc<dyn BroadcastApiListener>> {
        self.listener.clone()
    }

    fn set_listener(&mut self, listener: Option<Rc<dyn BroadcastApiListener>>) {
        self.listener = listener;
    }

    fn stats_listener(&self) -> Option<Rc<dyn StatsListener>> {
        self.stats_listener.clone()
    }

    fn set_stats_listener(&mut self, listener: Option<Rc<dyn StatsListener>>) {
        self.stats_listener = listener;
    }

    fn request_auth_token(
        &mut self,
        username: &str,
        _password: &str,
    ) -> Result<(), BroadcastApiError> {
        self.calls.push(SimulatedCall::RequestAuthToken {
            username: username.to_string(),
        });
        self.ensure_initialized()?;

        let result = if self.rejects_credentials {
            Err(BroadcastApiError::AuthenticationFailed {
                reason: "invalid username or password".to_string(),
            })
        } else {
            Ok(AuthToken::new(format!("token-{}", username)))
        };

        self.dispatch(ApiCallback::AuthTokenReceived(result), true);
        Ok(())
    }

    fn login(&mut self, auth_token: &AuthToken) -> Result<(), BroadcastApiError> {
        self.calls.push(SimulatedCall::Login {
            auth_token: auth_token.clone(),
        });
        self.ensure_initialized()?;

        let result = if self.rejects_login || auth_token.is_empty() {
            Err(BroadcastApiError::AuthenticationFailed {
                reason: "auth token was rejected".to_string(),
            })
        } else {
            Ok(self.channel.clone())
        };

        self.dispatch(ApiCallback::LoginCompleted(result), true);
        Ok(())
    }

    fn get_ingest_servers(&mut self, _auth_token: &AuthToken) -> Result<(), BroadcastApiError> {
        self.calls.push(SimulatedCall::GetIngestServers);
        self.ensure_initialized()?;

        let result = if self.fails_ingest_discovery {
            Err(BroadcastApiError::Transport {
                code: 503,
                description: "ingest discovery unavailable".to_string(),
            })
        } else {
            let servers = self.servers.iter().map(|s| s.server.clone()).collect();
            Ok(IngestList::new(servers))
        };

        self.dispatch(ApiCallback::IngestServersReceived(result), true);
        Ok(())
    }

    fn get_default_params(&self, video_params: &mut VideoParams) {
        if video_params.target_fps == 0 || video_params.target_fps > MAX_FPS {
            video_params.target_fps = MAX_FPS;
        }

        if video_params.max_kbps < MIN_BITRATE_KBPS {
            video_params.max_kbps = MIN_BITRATE_KBPS;
        } else if video_params.max_kbps > MAX_BITRATE_KBPS {
            video_params.max_kbps = MAX_BITRATE_KBPS;
        }
    }

    fn start(
        &mut self,
        _video_params: &VideoParams,
        _audio_params: &AudioParams,
        server: &IngestServer,
        flags: StartFlags,
        is_async: bool,
    ) -> Result<(), BroadcastApiError> {
        self.calls.push(SimulatedCall::Start {
            server_url: server.server_url.clone(),
            flags,
            is_async,
        });
        self.ensure_initialized()?;

        if self.stream.is_some() {
            return Err(BroadcastApiError::StreamAlreadyStarted);
        }

        let index = self
            .servers
            .iter()
            .position(|s| s.server.server_url == server.server_url)
            .ok_or_else(|| BroadcastApiError::Transport {
                code: 404,
                description: format!("unknown ingest server {}", server.server_url),
            })?;

        let behavior = &self.servers[index];
        if behavior.rejects_start {
            return Err(BroadcastApiError::Transport {
                code: -1,
                description: "connection refused".to_string(),
            });
        }

        let result = if behavior.fails_to_start {
            Err(BroadcastApiError::Transport {
                code: -2,
                description: "handshake failed".to_string(),
            })
        } else {
            self.stream = Some(ActiveStream {
                server: index,
                frames_accepted: 0,
                stat_polls: 0,
                bytes_sent: 0,
            });

            Ok(())
        };

        self.dispatch(ApiCallback::Started(result), is_async);
        Ok(())
    }

    fn stop(&mut self, is_async: bool) -> Result<(), BroadcastApiError> {
        self.calls.push(SimulatedCall::Stop { is_async });
        self.ensure_initialized()?;

        let stream = self
            .stream
            .take()
            .ok_or(BroadcastApiError::StreamNotStarted)?;

        let result = match self.servers.get(stream.server) {
            Some(server) if server.fails_to_stop => Err(BroadcastApiError::Transport {
                code: -3,
                description: "connection dropped during shutdown".to_string(),
            }),

            _ => Ok(()),
        };

        self.dispatch(ApiCallback::Stopped(result), is_async);
        Ok(())
    }

    fn pause_video(&mut self) -> Result<(), BroadcastApiError> {
        self.calls.push(SimulatedCall::PauseVideo);
        self.ensure_initialized()?;

        match self.stream {
            Some(_) => Ok(()),
            None => Err(BroadcastApiError::StreamNotStarted),
        }
    }

    fn submit_video_frame(&mut self, buffer: FrameBufferHandle) -> Result<(), BroadcastApiError> {
        self.calls.push(SimulatedCall::SubmitVideoFrame(buffer));
        self.ensure_initialized()?;

        if !self.frame_buffers.contains_key(&buffer) {
            return Err(BroadcastApiError::UnknownFrameBuffer {
                handle_id: buffer.id(),
            });
        }

        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(BroadcastApiError::StreamNotStarted),
        };

        let server = match self.servers.get(stream.server) {
            Some(server) => server,
            None => return Err(BroadcastApiError::StreamNotStarted),
        };

        if let Some(limit) = server.rejects_frames_after {
            if stream.frames_accepted >= limit {
                return Err(BroadcastApiError::FrameSubmissionRejected {
                    reason: "encoder queue is full".to_string(),
                });
            }
        }

        stream.frames_accepted += 1;
        if stream.is_sending_video(server) {
            stream.bytes_sent += server.bytes_per_frame;
        }

        self.locked_buffers.push(buffer);
        Ok(())
    }

    fn allocate_frame_buffer(&mut self, size: usize) -> Option<FrameBufferHandle> {
        self.calls.push(SimulatedCall::AllocateFrameBuffer { size });

        if let Some(limit) = self.frame_buffer_limit {
            if self.frame_buffers.len() >= limit {
                return None;
            }
        }

        let handle = FrameBufferHandle::new(self.next_buffer_id);
        self.next_buffer_id += 1;

        let mut data = BytesMut::with_capacity(size);
        data.resize(size, 0);
        self.frame_buffers.insert(handle, data);

        Some(handle)
    }

    fn randomize_frame_buffer(&mut self, buffer: FrameBufferHandle) {
        if let Some(data) = self.frame_buffers.get_mut(&buffer) {
            thread_rng().fill_bytes(&mut data[..]);
        }
    }

    fn free_frame_buffer(&mut self, buffer: FrameBufferHandle) {
        self.calls.push(SimulatedCall::FreeFrameBuffer(buffer));
        self.frame_buffers.remove(&buffer);
        self.locked_buffers.retain(|locked| *locked != buffer);
    }

    fn poll_tasks(&mut self) -> Result<(), BroadcastApiError> {
        self.ensure_initialized()?;

        let pending = mem::take(&mut self.pending);
        for callback in pending {
            self.deliver(callback);
        }

        let unlocked = mem::take(&mut self.locked_buffers);
        for buffer in unlocked {
            self.deliver(ApiCallback::BufferUnlocked(buffer));
        }

        Ok(())
    }

    fn poll_stats(&mut self) -> Result<(), BroadcastApiError> {
        self.ensure_initialized()?;

        let (state, bytes_sent) = match self.stream.as_mut() {
            Some(stream) => {
                stream.stat_polls = stream.stat_polls.saturating_add(1);
                let sending = self
                    .servers
                    .get(stream.server)
                    .map(|server| stream.is_sending_video(server))
                    .unwrap_or(false);

                let state = if sending {
                    RtmpState::SendVideo
                } else {
                    RtmpState::Connect
                };

                (state, stream.bytes_sent)
            }

            None => (RtmpState::Idle, 0),
        };

        self.deliver(ApiCallback::Stat {
            stat: StatType::RtmpState,
            value: state.as_stat_value(),
        });

        self.deliver(ApiCallback::Stat {
            stat: StatType::RtmpDataSent,
            value: bytes_sent,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CallbackQueue;

    fn servers() -> Vec<IngestServer> {
        vec![IngestServer::new("east", "rtmp://east/app")]
    }

    fn install_queue(api: &mut SimulatedBroadcastApi) -> Rc<CallbackQueue> {
        let queue = Rc::new(CallbackQueue::new());
        api.set_listener(Some(queue.clone()));
        api.set_stats_listener(Some(queue.clone()));
        queue
    }

    #[test]
    fn deferred_callbacks_wait_for_poll() {
        let mut api = SimulatedBroadcastApi::new(servers());
        api.delivery = CallbackDelivery::NextPoll;
        api.initialize().unwrap();
        let queue = install_queue(&mut api);

        let server = IngestServer::new("east", "rtmp://east/app");
        let video = VideoParams::new(640, 360, 30);
        api.start(&video, &AudioParams::disabled(), &server, StartFlags::NONE, true)
            .unwrap();

        assert!(queue.is_empty(), "Callback was delivered before polling");
        assert_eq!(api.pending_callbacks(), 1);

        api.poll_tasks().unwrap();
        assert_eq!(queue.pop(), Some(ApiCallback::Started(Ok(()))));
    }

    #[test]
    fn synchronous_requests_ignore_deferred_delivery() {
        let mut api = SimulatedBroadcastApi::new(servers());
        api.delivery = CallbackDelivery::NextPoll;
        api.initialize().unwrap();
        let queue = install_queue(&mut api);

        let server = IngestServer::new("east", "rtmp://east/app");
        let video = VideoParams::new(640, 360, 30);
        api.start(&video, &AudioParams::disabled(), &server, StartFlags::NONE, false)
            .unwrap();
        api.stop(false).unwrap();

        assert_eq!(queue.pop(), Some(ApiCallback::Started(Ok(()))));
        assert_eq!(queue.pop(), Some(ApiCallback::Stopped(Ok(()))));
    }

    #[test]
    fn stats_report_sending_video_after_connect_polls() {
        let mut api = SimulatedBroadcastApi::new(servers());
        api.initialize().unwrap();
        api.server_mut("east").unwrap().connect_polls = 2;
        let queue = install_queue(&mut api);

        let server = IngestServer::new("east", "rtmp://east/app");
        let video = VideoParams::new(640, 360, 30);
        api.start(&video, &AudioParams::disabled(), &server, StartFlags::BANDWIDTH_TEST, true)
            .unwrap();
        queue.pop();

        api.poll_stats().unwrap();
        assert_eq!(
            queue.pop(),
            Some(ApiCallback::Stat {
                stat: StatType::RtmpState,
                value: RtmpState::Connect.as_stat_value()
            })
        );
        queue.pop();

        api.poll_stats().unwrap();
        assert_eq!(
            queue.pop(),
            Some(ApiCallback::Stat {
                stat: StatType::RtmpState,
                value: RtmpState::SendVideo.as_stat_value()
            })
        );
    }

    #[test]
    fn bytes_are_only_counted_while_sending_video() {
        let mut api = SimulatedBroadcastApi::new(servers());
        api.initialize().unwrap();
        api.server_mut("east").unwrap().bytes_per_frame = 500;
        let queue = install_queue(&mut api);
        let buffer = api.allocate_frame_buffer(16).unwrap();

        let server = IngestServer::new("east", "rtmp://east/app");
        let video = VideoParams::new(640, 360, 30);
        api.start(&video, &AudioParams::disabled(), &server, StartFlags::NONE, true)
            .unwrap();

        api.submit_video_frame(buffer).unwrap();
        api.poll_stats().unwrap();
        api.submit_video_frame(buffer).unwrap();
        api.submit_video_frame(buffer).unwrap();
        api.poll_stats().unwrap();

        let mut sent = Vec::new();
        while let Some(callback) = queue.pop() {
            if let ApiCallback::Stat {
                stat: StatType::RtmpDataSent,
                value,
            } = callback
            {
                sent.push(value);
            }
        }

        assert_eq!(sent, vec![0, 1000]);
    }

    #[test]
    fn submitted_buffers_are_unlocked_on_poll() {
        let mut api = SimulatedBroadcastApi::new(servers());
        api.initialize().unwrap();
        let queue = install_queue(&mut api);
        let buffer = api.allocate_frame_buffer(16).unwrap();

        let server = IngestServer::new("east", "rtmp://east/app");
        let video = VideoParams::new(640, 360, 30);
        api.start(&video, &AudioParams::disabled(), &server, StartFlags::NONE, true)
            .unwrap();
        queue.pop();

        api.submit_video_frame(buffer).unwrap();
        assert!(queue.is_empty(), "Buffer unlocked before polling");

        api.poll_tasks().unwrap();
        assert_eq!(queue.pop(), Some(ApiCallback::BufferUnlocked(buffer)));
    }

    #[test]
    fn randomized_buffers_are_not_blank() {
        let mut api = SimulatedBroadcastApi::new(Vec::new());
        let buffer = api.allocate_frame_buffer(4096).unwrap();
        assert!(api.frame_buffer_contents(buffer).unwrap().iter().all(|b| *b == 0));

        api.randomize_frame_buffer(buffer);

        let contents = api.frame_buffer_contents(buffer).unwrap();
        assert_eq!(contents.len(), 4096);
        assert!(contents.iter().any(|b| *b != 0), "Buffer contents were not randomized");
    }

    #[test]
    fn rejected_start_returns_error_without_callback() {
        let mut api = SimulatedBroadcastApi::new(servers());
        api.initialize().unwrap();
        api.server_mut("east").unwrap().rejects_start = true;
        let queue = install_queue(&mut api);

        let server = IngestServer::new("east", "rtmp://east/app");
        let video = VideoParams::new(640, 360, 30);
        let result = api.start(&video, &AudioParams::disabled(), &server, StartFlags::NONE, true);

        assert!(result.is_err(), "Start was not rejected");
        assert!(queue.is_empty(), "Rejected start produced a callback");
        assert!(!api.is_streaming());
    }

    #[test]
    fn calls_fail_before_initialization() {
        let mut api = SimulatedBroadcastApi::new(servers());

        assert_eq!(api.pause_video(), Err(BroadcastApiError::NotInitialized));
        assert_eq!(api.poll_tasks(), Err(BroadcastApiError::NotInitialized));
        assert_eq!(api.stop(true), Err(BroadcastApiError::NotInitialized));
    }
}
