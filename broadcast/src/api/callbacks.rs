use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::{AuthToken, BroadcastApiError, ChannelInfo, FrameBufferHandle, StatType};
use crate::ingest::IngestList;

/// Receiver for the results of asynchronous `BroadcastApi` requests.
///
/// The transport holds exactly one listener at a time.  Every method has an empty default so
/// implementors only need to handle the callbacks they care about.
pub trait BroadcastApiListener {
    fn request_auth_token_callback(&self, _result: Result<AuthToken, BroadcastApiError>) {}
    fn login_callback(&self, _result: Result<ChannelInfo, BroadcastApiError>) {}
    fn get_ingest_servers_callback(&self, _result: Result<IngestList, BroadcastApiError>) {}
    fn start_callback(&self, _result: Result<(), BroadcastApiError>) {}
    fn stop_callback(&self, _result: Result<(), BroadcastApiError>) {}
    fn buffer_unlock_callback(&self, _buffer: FrameBufferHandle) {}
}

/// Receiver for counters delivered by `BroadcastApi::poll_stats()`
pub trait StatsListener {
    fn stat_callback(&self, stat: StatType, value: u64);
}

/// A single callback delivered by the transport
#[derive(PartialEq, Debug, Clone)]
pub enum ApiCallback {
    AuthTokenReceived(Result<AuthToken, BroadcastApiError>),
    LoginCompleted(Result<ChannelInfo, BroadcastApiError>),
    IngestServersReceived(Result<IngestList, BroadcastApiError>),
    Started(Result<(), BroadcastApiError>),
    Stopped(Result<(), BroadcastApiError>),
    BufferUnlocked(FrameBufferHandle),
    Stat { stat: StatType, value: u64 },
}

/// Listener that stores every callback it receives in arrival order.
///
/// The state machines in this crate install a `CallbackQueue` as the transport's listener and
/// drain it whenever they are ready to react.  This way it does not matter whether the transport
/// invokes a callback before the originating call returns or during a later poll.
#[derive(Default)]
pub struct CallbackQueue {
    pending: RefCell<VecDeque<ApiCallback>>,
}

impl CallbackQueue {
    pub fn new() -> CallbackQueue {
        CallbackQueue {
            pending: RefCell::new(VecDeque::new()),
        }
    }

    /// Removes the oldest callback that has not been handled yet
    pub fn pop(&self) -> Option<ApiCallback> {
        self.pending.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    fn push(&self, callback: ApiCallback) {
        self.pending.borrow_mut().push_back(callback);
    }
}

impl BroadcastApiListener for CallbackQueue {
    fn request_auth_token_callback(&self, result: Result<AuthToken, BroadcastApiError>) {
        self.push(ApiCallback::AuthTokenReceived(result));
    }

    fn login_callback(&self, result: Result<ChannelInfo, BroadcastApiError>) {
        self.push(ApiCallback::LoginCompleted(result));
    }

    fn get_ingest_servers_callback(&self, result: Result<IngestList, BroadcastApiError>) {
        self.push(ApiCallback::IngestServersReceived(result));
    }

    fn start_callback(&self, result: Result<(), BroadcastApiError>) {
        self.push(ApiCallback::Started(result));
    }

    fn stop_callback(&self, result: Result<(), BroadcastApiError>) {
        self.push(ApiCallback::Stopped(result));
    }

    fn buffer_unlock_callback(&self, buffer: FrameBufferHandle) {
        self.push(ApiCallback::BufferUnlocked(buffer));
    }
}

impl StatsListener for CallbackQueue {
    fn stat_callback(&self, stat: StatType, value: u64) {
        self.push(ApiCallback::Stat { stat, value });
    }
}

/// Returns true if the listener currently installed in a transport slot is the given queue
pub fn is_installed<T: ?Sized>(installed: &Option<Rc<T>>, queue: &Rc<CallbackQueue>) -> bool {
    match installed {
        Some(listener) => Rc::as_ptr(listener) as *const () == Rc::as_ptr(queue) as *const (),
        None => false,
    }
}
