//! # Control Executable
//!
//! This executable drives the simulated vehicle:
//! - Receives telemetry frames from the simulator bridge
//! - Runs the steering and throttle PID loops
//! - Optionally tunes the steering gains with twiddle
//! - Replies to each frame with the steering and throttle demands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{thread, time::{Duration, Instant}};
use color_eyre::{Report, eyre::WrapErr};
use log::{debug, info, trace, warn};
use structopt::StructOpt;

// Internal
use comms_if::{
    eqpt::sim::{SimEvent, SimReply},
    net::NetParams,
};
use ctrl_lib::{
    drive_ctrl::{self, DriveCtrl},
    sim_server::SimServer,
};
use util::{
    host,
    module::State,
    logger::{logger_init, LevelFilter},
    session::Session,
    archive::Archived,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Pause after a socket error so a broken socket doesn't spin the loop.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Command line arguments of the control executable.
#[derive(Debug, StructOpt)]
#[structopt(name = "ctrl_exec", about = "PID drive controller for the driving simulator")]
struct Args {
    /// Tune the steering gains with twiddle, overriding the parameter file
    #[structopt(long)]
    tune: bool,

    /// Minimum level of log messages to record, must be at least info
    #[structopt(long, default_value = "trace")]
    log_level: LevelFilter,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<(), Report> {

    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "ctrl_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(args.log_level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("PID Drive Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", args);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams = util::params::load("net.toml")
        .wrap_err("Could not load net params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut drive_ctrl = DriveCtrl::default();
    drive_ctrl.init("drive_ctrl.toml", &session)
        .wrap_err("Failed to initialise DriveCtrl")?;

    if args.tune {
        drive_ctrl.set_tuning(true);
    }

    info!("DriveCtrl init complete (tuning: {})", drive_ctrl.is_tuning());

    // ---- SERVER INITIALISATION ----

    let mut server = SimServer::new(&net_params)
        .wrap_err("Failed to initialise the simulator server")?;

    info!("Server listening on {}", net_params.sim_endpoint);

    // ---- MAIN LOOP ----

    info!("Initialisation complete, entering main loop");

    let mut last_telemetry = Instant::now();
    let mut connected = false;

    loop {
        if server.connected() != connected {
            connected = !connected;
            match connected {
                true => info!("Simulator bridge connected"),
                false => warn!("Simulator bridge disconnected"),
            }
        }

        // Get the next frame from the bridge
        let event = match server.get_event() {
            Ok(Some(e)) => e,
            Ok(None) => continue,
            Err(e) if e.needs_reply() => {
                warn!("{}", e);
                SimEvent::Ignored
            },
            Err(e) => {
                warn!("{}", e);
                thread::sleep(RECV_ERROR_BACKOFF);
                continue
            }
        };

        let reply = match event {
            SimEvent::Telemetry(telemetry) => {
                let now = Instant::now();
                let dt_s = now.duration_since(last_telemetry).as_secs_f64();
                last_telemetry = now;

                let input = drive_ctrl::InputData { telemetry, dt_s };

                match drive_ctrl.proc(&input) {
                    Ok((output, _)) => SimReply::Steer(output.into()),
                    Err(e) => {
                        warn!("Error during DriveCtrl processing: {}", e);
                        SimReply::None
                    }
                }
            },
            SimEvent::Manual => {
                trace!("Simulator in manual mode");
                SimReply::Manual
            },
            SimEvent::Other(name) => {
                debug!("Ignoring \"{}\" event", name);
                SimReply::None
            },
            SimEvent::Ignored => SimReply::None,
        };

        // Every frame must be answered before the next can be received
        if let Err(e) = server.send_reply(&reply) {
            warn!("Could not reply to the simulator: {}", e);
        }

        // Archive the status of this cycle
        if let SimReply::Steer(_) = reply {
            if let Err(e) = drive_ctrl.write() {
                warn!("Could not archive DriveCtrl status: {}", e);
            }
        }
    }
}
