use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::api::{BroadcastApi, SharedBroadcastApi};
use crate::simulation::{CallbackDelivery, SimulatedBroadcastApi, SimulatedCall};
use crate::test_utils::RecordingReporter;
use crate::time::ManualClock;

const TEST_DURATION_MS: u64 = 1000;
const TICK_MS: u64 = 100;

#[test]
fn tests_every_server_and_finishes() {
    let mut harness = create_harness(&["east", "west"], |_| ());

    harness.tester.start();
    let progress = harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Finished);
    assert_vec_match!(
        *harness.states.borrow(),
        [
            TestState::Starting,
            TestState::ConnectingToServer,
            TestState::TestingServer,
            TestState::DoneTestingServer,
            TestState::ConnectingToServer,
            TestState::TestingServer,
            TestState::DoneTestingServer,
            TestState::Finished,
        ]
    );

    assert_eq!(progress.last(), Some(&1.0), "Total progress did not end at 1.0");
    assert_eq!(harness.tester.total_progress(), 1.0);
    assert!(harness.bitrates().iter().all(|b| *b > 0.0), "Unexpected bitrates: {:?}", harness.bitrates());
    assert!(harness.reporter.errors.borrow().is_empty(), "Unexpected errors reported");
}

#[test]
fn deferred_callbacks_produce_same_outcome() {
    let mut harness = create_harness(&["east", "west"], |api| {
        api.delivery = CallbackDelivery::NextPoll
    });

    harness.tester.start();
    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Finished);
    assert!(harness.bitrates().iter().all(|b| *b > 0.0), "Unexpected bitrates: {:?}", harness.bitrates());
    assert_eq!(harness.state_count(TestState::DoneTestingServer), 2);
}

#[test]
fn total_progress_never_decreases() {
    let mut harness = create_harness(&["east", "west", "north"], |api| {
        api.delivery = CallbackDelivery::NextPoll
    });

    harness.tester.start();
    let progress = harness.run_until_done(TICK_MS / 2, 200);

    for window in progress.windows(2) {
        assert!(window[0] <= window[1], "Progress went from {} to {}", window[0], window[1]);
    }

    assert_eq!(progress.last(), Some(&1.0));
}

#[test]
fn measured_bitrate_matches_bytes_sent_over_elapsed_time() {
    let mut harness = create_harness(&["east"], |api| {
        api.server_mut("east").unwrap().bytes_per_frame = 1_000;
    });

    harness.tester.start();
    harness.tick(TICK_MS); // start issued and acknowledged, timer restarted
    harness.tick(TICK_MS); // first frame while connecting, no bytes counted
    harness.tick(TICK_MS); // second frame counted

    assert_eq!(harness.tester.state(), TestState::TestingServer);
    assert_eq!(harness.bitrates(), vec![1_000.0 * 8.0 / 200.0]);
}

#[test]
fn start_is_only_honored_once() {
    let mut harness = create_harness(&["east"], |_| ());

    harness.tester.start();
    harness.tester.start();

    assert_eq!(*harness.states.borrow(), vec![TestState::Starting]);
    let allocations = harness
        .api
        .borrow()
        .calls()
        .iter()
        .filter(|call| matches!(call, SimulatedCall::AllocateFrameBuffer { .. }))
        .count();

    assert_eq!(allocations, 3, "Buffers were allocated more than once");
}

#[test]
fn start_callback_failure_zeroes_server_and_moves_on() {
    let mut harness = create_harness(&["east", "west"], |api| {
        api.server_mut("east").unwrap().fails_to_start = true;
    });

    harness.tester.start();
    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Finished);
    let bitrates = harness.bitrates();
    assert_eq!(bitrates[0], 0.0, "Failed server should have no bitrate");
    assert!(bitrates[1] > 0.0, "Second server should have been measured");
    assert_eq!(harness.reporter.errors.borrow().len(), 1, "Start failure was not reported");
}

#[test]
fn rejected_start_call_completes_without_stop() {
    let mut harness = create_harness(&["east", "west"], |api| {
        api.server_mut("east").unwrap().rejects_start = true;
    });

    harness.tester.start();
    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Finished);
    assert_eq!(harness.bitrates()[0], 0.0);

    let stops = harness
        .api
        .borrow()
        .calls()
        .iter()
        .filter(|call| matches!(call, SimulatedCall::Stop { .. }))
        .count();

    assert_eq!(stops, 1, "Only the server that started should have been stopped");
}

#[test]
fn mixed_outcomes_across_three_servers() {
    let mut harness = create_harness(&["east", "west", "north"], |api| {
        api.server_mut("east").unwrap().fails_to_start = true;
    });

    harness.tester.start();

    // run until the third server has a partial measurement, then skip it
    let mut ticks = 0;
    while !(harness.tester.current_server_index() == Some(2)
        && harness.tester.state() == TestState::TestingServer
        && harness.bitrates()[2] > 0.0)
    {
        harness.tick(TICK_MS);
        ticks += 1;
        assert!(ticks < 100, "Third server never started sending video");
    }

    harness.tester.skip_current_server();
    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Finished);
    let bitrates = harness.bitrates();
    assert_eq!(bitrates[0], 0.0);
    assert!(bitrates[1] > 0.0);
    assert!(bitrates[2] > 0.0, "Skip should keep the partial measurement");
}

#[test]
fn skip_ends_the_server_test_early() {
    let mut harness = create_harness(&["east", "west"], |_| ());

    harness.tester.start();
    harness.tick(TICK_MS);
    harness.tick(TICK_MS);
    harness.tick(TICK_MS);
    assert_eq!(harness.tester.current_server_index(), Some(0));

    harness.tester.skip_current_server();
    harness.tick(TICK_MS);
    assert_eq!(harness.tester.state(), TestState::DoneTestingServer);

    harness.tick(TICK_MS);
    harness.tick(TICK_MS);
    assert_eq!(harness.tester.current_server_index(), Some(1), "Did not move to the next server");
}

#[test]
fn cancel_while_testing_passes_through_done_before_cancelled() {
    let mut harness = create_harness(&["east", "west"], |_| ());

    harness.tester.start();
    for _ in 0..4 {
        harness.tick(TICK_MS);
    }

    assert_eq!(harness.tester.state(), TestState::TestingServer);
    assert!(harness.bitrates()[0] > 0.0);

    harness.tester.cancel();
    assert_eq!(harness.bitrates()[0], 0.0, "Cancel should zero the server under test");

    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Cancelled);
    let states = harness.states.borrow();
    let tail = &states[states.len() - 4..];
    assert_eq!(
        tail,
        &[
            TestState::TestingServer,
            TestState::DoneTestingServer,
            TestState::Cancelling,
            TestState::Cancelled,
        ]
    );

    assert_eq!(harness.bitrates(), vec![0.0, 0.0]);
    assert!(!harness.api.borrow().is_streaming(), "Stream was left running");
}

#[test]
fn cancel_while_waiting_for_start_callback_stops_the_session() {
    let mut harness = create_harness(&["east"], |api| {
        api.delivery = CallbackDelivery::NextPoll
    });

    harness.tester.start();
    harness.tick(TICK_MS);
    assert_eq!(harness.tester.state(), TestState::ConnectingToServer);

    harness.tester.cancel();
    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Cancelled);
    assert!(!harness.api.borrow().is_streaming(), "Stream was left running");
    assert_eq!(harness.bitrates(), vec![0.0]);
}

#[test]
fn cancel_before_first_server_skips_every_server() {
    let mut harness = create_harness(&["east"], |_| ());

    harness.tester.start();
    harness.tester.cancel();
    harness.run_until_done(TICK_MS, 10);

    assert_eq!(
        *harness.states.borrow(),
        vec![TestState::Starting, TestState::Cancelling, TestState::Cancelled]
    );

    let starts = harness
        .api
        .borrow()
        .calls()
        .iter()
        .filter(|call| matches!(call, SimulatedCall::Start { .. }))
        .count();

    assert_eq!(starts, 0, "No server should have been started");
}

#[test]
fn skip_and_cancel_after_done_have_no_effect() {
    let mut harness = create_harness(&["east"], |_| ());

    harness.tester.start();
    harness.run_until_done(TICK_MS, 100);
    let bitrates = harness.bitrates();
    let state_changes = harness.states.borrow().len();

    harness.tester.skip_current_server();
    harness.tester.cancel();
    harness.tick(TICK_MS);

    assert_eq!(harness.tester.state(), TestState::Finished);
    assert_eq!(harness.states.borrow().len(), state_changes, "Unexpected state change events");
    assert_eq!(harness.bitrates(), bitrates);
}

#[test]
fn frame_rejection_fails_only_that_server() {
    let mut harness = create_harness(&["east", "west"], |api| {
        api.server_mut("east").unwrap().rejects_frames_after = Some(2);
    });

    harness.tester.start();
    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Finished);
    let bitrates = harness.bitrates();
    assert_eq!(bitrates[0], 0.0, "Server that rejected frames should have no bitrate");
    assert!(bitrates[1] > 0.0);
    assert_eq!(harness.reporter.errors.borrow().len(), 1);
}

#[test]
fn stop_failure_is_only_a_warning() {
    let mut harness = create_harness(&["east", "west"], |api| {
        api.server_mut("east").unwrap().fails_to_stop = true;
    });

    harness.tester.start();
    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Finished);
    assert!(harness.bitrates().iter().all(|b| *b > 0.0));
    assert!(harness.reporter.errors.borrow().is_empty());
    assert_eq!(harness.reporter.warnings.borrow().len(), 1, "Stop failure was not reported");
}

#[test]
fn frames_are_only_submitted_after_start_callback() {
    let mut harness = create_harness(&["east"], |api| {
        api.delivery = CallbackDelivery::NextPoll
    });

    harness.tester.start();
    harness.tick(TICK_MS);

    {
        let api = harness.api.borrow();
        assert_vec_contains!(api.calls(), SimulatedCall::Start { .. });
        assert!(
            !api.calls().iter().any(|call| matches!(call, SimulatedCall::SubmitVideoFrame(_))),
            "Frame submitted before the start callback arrived"
        );
    }

    harness.tick(TICK_MS);
    let api = harness.api.borrow();
    assert_vec_contains!(api.calls(), SimulatedCall::SubmitVideoFrame(_));
}

#[test]
fn sessions_never_overlap() {
    let mut harness = create_harness(&["east", "west", "north"], |api| {
        api.delivery = CallbackDelivery::NextPoll
    });

    harness.tester.start();
    harness.run_until_done(TICK_MS, 200);

    let sessions = harness
        .api
        .borrow()
        .calls()
        .iter()
        .filter_map(|call| match call {
            SimulatedCall::Start { flags, .. } => {
                assert!(flags.bandwidth_test, "Test stream was not flagged as a bandwidth test");
                Some(true)
            }

            SimulatedCall::Stop { .. } => Some(false),
            _ => None,
        })
        .collect::<Vec<_>>();

    assert_eq!(sessions, vec![true, false, true, false, true, false]);
}

#[test]
fn listeners_are_restored_after_run() {
    let mut harness = create_harness(&["east"], |_| ());
    let host_listener = Rc::new(CallbackQueue::new());
    {
        let mut api = harness.api.borrow_mut();
        api.set_listener(Some(host_listener.clone()));
        api.set_stats_listener(Some(host_listener.clone()));
    }

    harness.tester.start();
    assert!(!is_installed(&harness.api.borrow().listener(), &host_listener));

    harness.run_until_done(TICK_MS, 100);

    let api = harness.api.borrow();
    assert!(is_installed(&api.listener(), &host_listener), "Listener was not restored");
    assert!(is_installed(&api.stats_listener(), &host_listener), "Stats listener was not restored");
    assert_eq!(api.live_frame_buffers(), 0, "Frame buffers were not freed");
}

#[test]
fn listener_replaced_during_run_is_not_overwritten() {
    let mut harness = create_harness(&["east"], |_| ());

    harness.tester.start();
    let replacement = Rc::new(CallbackQueue::new());
    harness.api.borrow_mut().set_stats_listener(Some(replacement.clone()));

    harness.run_until_done(TICK_MS, 100);

    assert!(
        is_installed(&harness.api.borrow().stats_listener(), &replacement),
        "Listener installed by someone else was overwritten"
    );
}

#[test]
fn buffers_are_freed_exactly_once() {
    let mut harness = create_harness(&["east", "west"], |_| ());

    harness.tester.start();
    harness.run_until_done(TICK_MS, 100);
    drop(harness.tester);

    let frees = harness
        .api
        .borrow()
        .calls()
        .iter()
        .filter(|call| matches!(call, SimulatedCall::FreeFrameBuffer(_)))
        .count();

    assert_eq!(frees, 3);
}

#[test]
fn allocation_failure_fails_the_run() {
    let mut harness = create_harness(&["east"], |api| api.set_frame_buffer_limit(Some(1)));

    harness.tester.start();

    assert_eq!(harness.tester.state(), TestState::Failed);
    assert!(harness.tester.is_done());
    assert_eq!(harness.tester.total_progress(), 1.0);
    assert_eq!(*harness.states.borrow(), vec![TestState::Failed]);
    assert_eq!(harness.reporter.errors.borrow().len(), 1);

    let api = harness.api.borrow();
    assert_eq!(api.live_frame_buffers(), 0);
    assert!(api.listener().is_none(), "Listener was not restored after failing");
}

#[test]
fn empty_list_finishes_on_first_update() {
    let mut harness = create_harness(&[], |_| ());

    harness.tester.start();
    assert_eq!(harness.tester.total_progress(), 0.0);

    harness.tick(TICK_MS);

    assert_eq!(harness.tester.state(), TestState::Finished);
    assert_eq!(harness.tester.total_progress(), 1.0);
    assert_eq!(harness.api.borrow().live_frame_buffers(), 0);
}

#[test]
fn update_before_start_does_nothing() {
    let mut harness = create_harness(&["east"], |_| ());

    harness.tick(TICK_MS);

    assert_eq!(harness.tester.state(), TestState::Uninitalized);
    assert!(harness.api.borrow().calls().is_empty());
}

#[test]
fn failing_observer_is_reported_and_ignored() {
    let mut harness = create_harness(&["east"], |_| ());
    harness.tester.on_test_state_changed(|_, state| {
        if state == TestState::TestingServer {
            Err("observer exploded".into())
        } else {
            Ok(())
        }
    });

    harness.tester.start();
    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Finished);
    let errors = harness.reporter.errors.borrow();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("observer exploded"), "Unexpected error: {}", errors[0]);
}

#[test]
fn observers_see_current_server_while_connecting() {
    let mut harness = create_harness(&["east", "west"], |_| ());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let recorded = seen.clone();
    harness.tester.on_test_state_changed(move |tester, state| {
        if state == TestState::ConnectingToServer {
            let name = tester.current_server().map(|server| server.server_name);
            recorded.borrow_mut().push(name);
        }

        Ok(())
    });

    harness.tester.start();
    harness.run_until_done(TICK_MS, 100);

    assert_eq!(
        *seen.borrow(),
        vec![Some("east".to_string()), Some("west".to_string())]
    );
}

#[test]
fn server_progress_follows_elapsed_time() {
    let mut harness = create_harness(&["east", "west"], |_| ());

    harness.tester.start();

    let mut server_progress = Vec::new();
    let mut total_progress = Vec::new();
    for _ in 0..24 {
        harness.tick(TICK_MS);
        server_progress.push(harness.tester.server_progress());
        total_progress.push(harness.tester.total_progress());
    }

    // connect tick, 100..900 ms of video, then done and stopped
    let mut expected = Vec::new();
    for _ in 0..2 {
        expected.push(0.0);
        for tenths in 1..10 {
            expected.push(tenths as f32 / 10.0);
        }

        expected.extend_from_slice(&[1.0, 1.0]);
    }

    assert_eq!(server_progress, expected);
    assert_eq!(total_progress[11], 0.5, "First server did not count as half the run");
    assert_eq!(total_progress[12], 0.5, "Progress moved back when the second server started");

    harness.tick(TICK_MS);
    assert_eq!(harness.tester.state(), TestState::Finished);
    assert_eq!(harness.tester.total_progress(), 1.0);
}

#[test]
fn skip_while_start_callback_pending_waits_for_session_before_stopping() {
    let mut harness = create_harness(&["east", "west"], |api| {
        api.delivery = CallbackDelivery::NextPoll
    });

    harness.tester.start();
    harness.tick(TICK_MS);
    assert_eq!(harness.tester.state(), TestState::ConnectingToServer);

    harness.tester.skip_current_server();
    harness.tick(TICK_MS); // start callback arrives, skip is honored
    assert_eq!(harness.tester.state(), TestState::DoneTestingServer);
    assert_eq!(harness.stop_count(), 0, "Stop requested before the start callback arrived");

    harness.run_until_done(TICK_MS, 100);

    assert_eq!(harness.tester.state(), TestState::Finished);
    assert_vec_match!(
        *harness.states.borrow(),
        [
            TestState::Starting,
            TestState::ConnectingToServer,
            TestState::DoneTestingServer,
            TestState::ConnectingToServer,
            TestState::TestingServer,
            TestState::DoneTestingServer,
            TestState::Finished,
        ]
    );

    let sequence = harness
        .api
        .borrow()
        .calls()
        .iter()
        .filter(|call| {
            matches!(
                call,
                SimulatedCall::Start { .. } | SimulatedCall::Stop { .. } | SimulatedCall::SubmitVideoFrame(_)
            )
        })
        .take(3)
        .cloned()
        .collect::<Vec<_>>();

    assert_vec_match!(
        sequence,
        [
            SimulatedCall::Start { .. },
            SimulatedCall::Stop { is_async: true },
            SimulatedCall::Start { .. },
        ]
    );

    let bitrates = harness.bitrates();
    assert_eq!(bitrates[0], 0.0, "Skipped server sent no video");
    assert!(bitrates[1] > 0.0, "Second server should have been measured");
}

#[test]
fn dropping_a_running_tester_releases_everything() {
    let mut harness = create_harness(&["east"], |_| ());

    harness.tester.start();
    harness.tick(TICK_MS);
    harness.tick(TICK_MS);
    assert!(harness.api.borrow().is_streaming());

    let Harness { api, tester, .. } = harness;
    drop(tester);

    let api = api.borrow();
    assert!(!api.is_streaming(), "Stream was not stopped");
    assert_eq!(api.live_frame_buffers(), 0, "Frame buffers were leaked");
    assert!(api.listener().is_none());
    assert!(api.stats_listener().is_none());
}

#[test]
fn test_duration_can_be_changed() {
    let mut harness = create_harness(&["east"], |_| ());

    harness.tester.set_test_duration_ms(300);
    assert_eq!(harness.tester.test_duration_ms(), 300);

    harness.tester.start();
    let progress = harness.run_until_done(TICK_MS, 100);

    assert!(progress.len() < 10, "Test took {} ticks", progress.len());
}

#[test]
fn dropping_while_stop_pending_does_not_stop_again() {
    let mut harness = create_harness(&["east"], |api| {
        api.delivery = CallbackDelivery::NextPoll
    });

    harness.tester.start();
    for _ in 0..100 {
        harness.tick(TICK_MS);
        if harness.stop_count() > 0 {
            break;
        }
    }

    assert_eq!(harness.tester.state(), TestState::DoneTestingServer);
    assert_eq!(harness.stop_count(), 1);

    let Harness { api, tester, reporter, .. } = harness;
    drop(tester);

    let api = api.borrow();
    let stops = api.calls().iter().filter(|call| matches!(call, SimulatedCall::Stop { .. })).count();
    assert_eq!(stops, 1, "Stop was requested a second time");
    assert!(reporter.warnings.borrow().is_empty(), "Unexpected warnings: {:?}", reporter.warnings.borrow());
    assert!(!api.is_streaming());
    assert_eq!(api.live_frame_buffers(), 0, "Frame buffers were leaked");
    assert!(api.listener().is_none());
}

#[test]
fn dropping_while_start_pending_stops_the_session() {
    let mut harness = create_harness(&["east"], |api| {
        api.delivery = CallbackDelivery::NextPoll
    });

    harness.tester.start();
    harness.tick(TICK_MS);
    assert_eq!(harness.tester.state(), TestState::ConnectingToServer);
    assert!(harness.api.borrow().is_streaming());

    let Harness { api, tester, reporter, .. } = harness;
    drop(tester);

    let api = api.borrow();
    assert_vec_contains!(api.calls(), SimulatedCall::Stop { is_async: false });
    assert!(!api.is_streaming(), "Stream was left running");
    assert_eq!(api.live_frame_buffers(), 0, "Frame buffers were leaked");
    assert!(api.listener().is_none());
    assert!(api.stats_listener().is_none());
    assert!(reporter.warnings.borrow().is_empty());
}

#[test]
fn dropping_while_failing_start_pending_reports_nothing() {
    let mut harness = create_harness(&["east"], |api| {
        api.delivery = CallbackDelivery::NextPoll;
        api.server_mut("east").unwrap().fails_to_start = true;
    });

    harness.tester.start();
    harness.tick(TICK_MS);
    assert!(!harness.api.borrow().is_streaming());

    let Harness { api, tester, reporter, .. } = harness;
    drop(tester);

    assert!(reporter.warnings.borrow().is_empty());
    assert!(reporter.errors.borrow().is_empty());
    assert_eq!(api.borrow().live_frame_buffers(), 0);
}

struct Harness {
    api: Rc<RefCell<SimulatedBroadcastApi>>,
    clock: Rc<ManualClock>,
    reporter: Rc<RecordingReporter>,
    states: Rc<RefCell<Vec<TestState>>>,
    tester: IngestTester,
}

impl Harness {
    fn tick(&mut self, milliseconds: u64) {
        self.clock.advance_ms(milliseconds);
        self.api.borrow_mut().poll_tasks().unwrap();
        self.tester.update();
    }

    /// Returns the total progress observed after every tick
    fn run_until_done(&mut self, milliseconds: u64, max_ticks: usize) -> Vec<f32> {
        let mut progress = Vec::new();
        for _ in 0..max_ticks {
            if self.tester.is_done() {
                return progress;
            }

            self.tick(milliseconds);
            progress.push(self.tester.total_progress());
        }

        panic!("Ingest test did not finish within {} ticks", max_ticks);
    }

    fn bitrates(&self) -> Vec<f32> {
        self.tester
            .ingest_list()
            .borrow()
            .servers
            .iter()
            .map(|server| server.bitrate_kbps)
            .collect()
    }

    fn stop_count(&self) -> usize {
        self.api
            .borrow()
            .calls()
            .iter()
            .filter(|call| matches!(call, SimulatedCall::Stop { .. }))
            .count()
    }

    fn state_count(&self, state: TestState) -> usize {
        self.states.borrow().iter().filter(|s| **s == state).count()
    }
}

fn create_harness<F>(server_names: &[&str], configure: F) -> Harness
where
    F: FnOnce(&mut SimulatedBroadcastApi),
{
    let servers = server_names
        .iter()
        .map(|name| IngestServer::new(*name, format!("rtmp://{}/app", name)))
        .collect::<Vec<_>>();

    let mut api = SimulatedBroadcastApi::new(servers.clone());
    api.initialize().unwrap();
    configure(&mut api);
    api.clear_calls();

    let api = Rc::new(RefCell::new(api));
    let shared: SharedBroadcastApi = api.clone();
    let clock = Rc::new(ManualClock::new());
    let reporter = Rc::new(RecordingReporter::default());

    let mut config = IngestTesterConfig::new();
    config.test_duration_ms = TEST_DURATION_MS;
    config.output_width = 64;
    config.output_height = 36;

    let mut tester = IngestTester::new(
        shared,
        IngestList::new(servers).into_shared(),
        clock.clone(),
        reporter.clone(),
        config,
    );

    let states = Rc::new(RefCell::new(Vec::new()));
    let recorded = states.clone();
    tester.on_test_state_changed(move |_, state| {
        recorded.borrow_mut().push(state);
        Ok(())
    });

    Harness {
        api,
        clock,
        reporter,
        states,
        tester,
    }
}
