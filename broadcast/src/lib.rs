//! This crate provides the session side of a native live-broadcasting SDK: a state machine that
//! logs a user in and discovers ingest servers, runs live broadcasts, and measures the upload
//! bandwidth to every ingest server so the best one can be picked.
//!
//! The encoder and RTMP transport are not part of this crate.  They are reached through the
//! `api::BroadcastApi` trait, and `simulation::SimulatedBroadcastApi` provides an in-memory
//! implementation for tests and tooling.
//!
//! # Examples
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use rml_broadcast::api::SharedBroadcastApi;
//! use rml_broadcast::controller::{BroadcastController, BroadcastControllerConfig, BroadcastState};
//! use rml_broadcast::ingest::IngestServer;
//! use rml_broadcast::reporting::TracingReporter;
//! use rml_broadcast::simulation::SimulatedBroadcastApi;
//! use rml_broadcast::time::ManualClock;
//!
//! let servers = vec![IngestServer::new("east", "rtmp://east.example/app")];
//! let api: SharedBroadcastApi = Rc::new(RefCell::new(SimulatedBroadcastApi::new(servers)));
//! let clock = Rc::new(ManualClock::new());
//!
//! let mut config = BroadcastControllerConfig::new();
//! config.ingest_test.test_duration_ms = 500;
//! config.ingest_test.output_width = 64;
//! config.ingest_test.output_height = 36;
//!
//! let mut controller =
//!     BroadcastController::new(api, clock.clone(), Rc::new(TracingReporter), config);
//!
//! controller.initialize().unwrap();
//! controller.request_auth_token("user", "password").unwrap();
//! while controller.state() != BroadcastState::ReadyToBroadcast {
//!     controller.update();
//! }
//!
//! // Measure every server, polling the controller like a host's frame loop would
//! controller.start_ingest_test().unwrap();
//! while controller.state() == BroadcastState::IngestTesting {
//!     clock.advance_ms(100);
//!     controller.update();
//! }
//!
//! let list = controller.ingest_list().unwrap();
//! assert!(list.borrow().servers[0].bitrate_kbps > 0.0);
//! ```

#[cfg(test)]
#[macro_use]
mod test_utils;

pub mod api;
pub mod buffers;
pub mod controller;
pub mod ingest;
pub mod reporting;
pub mod simulation;
pub mod time;
