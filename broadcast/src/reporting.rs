use std::error::Error;

use tracing::{error, warn};

/// Hook the host supplies to learn about problems that do not surface as return values.
///
/// Both state machines in this crate are driven from the host's polling loop and never hand
/// errors back out of `update()`.  Failures of asynchronous requests, rejected frames and
/// failing event observers are routed here instead.
pub trait ErrorReporter {
    fn report_error(&self, error: &dyn Error);
    fn report_warning(&self, warning: &dyn Error);
}

/// Reporter that writes everything to `tracing`
#[derive(Default, Debug, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report_error(&self, error: &dyn Error) {
        error!(%error, "Broadcast error");
    }

    fn report_warning(&self, warning: &dyn Error) {
        warn!(%warning, "Broadcast warning");
    }
}

/// Boxed error returned by event observers
pub type ObserverError = Box<dyn Error>;
