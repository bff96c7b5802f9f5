use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use rml_broadcast::api::SharedBroadcastApi;
use rml_broadcast::controller::{
    BroadcastController, BroadcastControllerConfig, BroadcastControllerEvent, BroadcastState,
};
use rml_broadcast::ingest::IngestServer;
use rml_broadcast::reporting::TracingReporter;
use rml_broadcast::simulation::{CallbackDelivery, SimulatedBroadcastApi};
use rml_broadcast::time::{Clock, ManualClock, SystemClock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Runs an ingest bandwidth test against simulated ingest servers
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of ingest servers to simulate
    #[arg(short, long, default_value_t = 3)]
    servers: usize,

    /// How long each server is measured, in milliseconds
    #[arg(short, long, default_value_t = 2_000)]
    duration_ms: u64,

    /// Time between controller updates, in milliseconds
    #[arg(short, long, default_value_t = 33)]
    tick_ms: u64,

    /// Name of a server that refuses to start a session (servers are named server-0, server-1, ...)
    #[arg(long)]
    failing_server: Option<String>,

    /// Deliver asynchronous results on the next poll instead of immediately
    #[arg(long)]
    deferred_callbacks: bool,

    /// Sleep between ticks and use the system clock instead of a simulated one
    #[arg(long)]
    realtime: bool,

    /// Cancel the test after this many ticks
    #[arg(long)]
    cancel_after: Option<u64>,
}

/// Where time comes from for the run
enum TimeSource {
    Simulated(Rc<ManualClock>),
    Realtime,
}

impl TimeSource {
    fn clock(&self) -> Rc<dyn Clock> {
        match self {
            TimeSource::Simulated(clock) => clock.clone(),
            TimeSource::Realtime => Rc::new(SystemClock::new()),
        }
    }

    fn tick(&self, tick_ms: u64) {
        match self {
            TimeSource::Simulated(clock) => clock.advance_ms(tick_ms),
            TimeSource::Realtime => thread::sleep(Duration::from_millis(tick_ms)),
        }
    }
}

const MAX_LOGIN_UPDATES: u32 = 100;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(error) = run(args) {
        eprintln!("Ingest test failed: {}", error);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let api = create_api(&args);
    let time = if args.realtime {
        TimeSource::Realtime
    } else {
        TimeSource::Simulated(Rc::new(ManualClock::new()))
    };

    let mut config = BroadcastControllerConfig::new();
    config.ingest_test.test_duration_ms = args.duration_ms;
    config.ingest_test.output_width = 320;
    config.ingest_test.output_height = 180;

    let mut controller =
        BroadcastController::new(api, time.clock(), Rc::new(TracingReporter), config);

    controller.on_event(|event| {
        match event {
            BroadcastControllerEvent::StateChanged { previous, current } => {
                info!(?previous, ?current, "Controller state changed")
            }

            BroadcastControllerEvent::IngestListReceived { servers } => {
                info!(count = servers.len(), "Ingest servers received")
            }

            other => info!(event = ?other, "Controller event"),
        }

        Ok(())
    });

    controller.initialize()?;
    controller.request_auth_token("ingest-sim", "password")?;

    let mut updates = 0;
    while controller.state() != BroadcastState::ReadyToBroadcast {
        if updates >= MAX_LOGIN_UPDATES {
            return Err(format!("login did not finish, stuck in {:?}", controller.state()).into());
        }

        time.tick(args.tick_ms);
        controller.update();
        updates += 1;
    }

    match controller.start_ingest_test() {
        Some(tester) => tester.on_test_state_changed(|tester, state| {
            if let Some(server) = tester.current_server() {
                info!(?state, server = %server.server_name, "Ingest test state changed");
            } else {
                info!(?state, "Ingest test state changed");
            }

            Ok(())
        }),

        None => return Err("ingest test could not be started".into()),
    }

    let mut ticks = 0;
    let mut last_reported = -1;
    while controller.state() == BroadcastState::IngestTesting {
        if Some(ticks) == args.cancel_after {
            warn!("Cancelling ingest test");
            controller.cancel_ingest_test();
        }

        time.tick(args.tick_ms);
        controller.update();
        ticks += 1;

        if let Some(tester) = controller.ingest_tester() {
            let percent = (tester.total_progress() * 100.0) as i32;
            if percent / 10 != last_reported / 10 {
                println!("Progress: {}%", percent);
                last_reported = percent;
            }
        }
    }

    print_results(&controller);
    controller.shutdown()?;

    Ok(())
}

fn create_api(args: &Args) -> SharedBroadcastApi {
    let mut servers = Vec::new();
    for index in 0..args.servers {
        let name = format!("server-{}", index);
        let mut server = IngestServer::new(name.clone(), format!("rtmp://{}.example/app", name));
        server.is_default = index == 0;
        servers.push(server);
    }

    let mut api = SimulatedBroadcastApi::new(servers);
    if args.deferred_callbacks {
        api.delivery = CallbackDelivery::NextPoll;
    }

    // Servers further down the list accept fewer bytes per frame so the results differ
    for index in 0..args.servers {
        let name = format!("server-{}", index);
        if let Some(server) = api.server_mut(&name) {
            server.bytes_per_frame = 10_000 / (index as u64 + 1);
            server.rejects_start = args.failing_server.as_deref() == Some(name.as_str());
        }
    }

    Rc::new(RefCell::new(api))
}

fn print_results(controller: &BroadcastController) {
    let list = match controller.ingest_list() {
        Some(list) => list,
        None => {
            println!("No ingest servers");
            return;
        }
    };

    let list = list.borrow();
    println!();
    println!("{:<12} {:>14}", "Server", "Bitrate (kbps)");
    for server in &list.servers {
        println!("{:<12} {:>14.1}", server.server_name, server.bitrate_kbps);
    }

    match list.best_server() {
        Some(best) => println!("\nBest server: {}", best.server_name),
        None => println!("\nNo server was measured"),
    }
}
