#[macro_use]
mod assert_vec_contains_macro;
#[macro_use]
mod assert_vec_match_macro;
mod recording_reporter;

pub use self::recording_reporter::RecordingReporter;
