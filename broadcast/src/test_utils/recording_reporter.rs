use std::cell::RefCell;
use std::error::Error;

use crate::reporting::ErrorReporter;

/// Reporter that keeps the text of everything it was handed
#[derive(Default)]
pub struct RecordingReporter {
    pub errors: RefCell<Vec<String>>,
    pub warnings: RefCell<Vec<String>>,
}

impl ErrorReporter for RecordingReporter {
    fn report_error(&self, error: &dyn Error) {
        self.errors.borrow_mut().push(error.to_string());
    }

    fn report_warning(&self, warning: &dyn Error) {
        self.warnings.borrow_mut().push(warning.to_string());
    }
}
