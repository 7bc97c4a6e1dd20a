//! Main car-side executable entry point.
//!
//! # Architecture
//!
//! The car is driven by two tasks sharing the [`Vehicle`]:
//!
//!     - Lane following, on the main thread, once per camera frame
//!     - Sign detection, on its own thread, once per detection period, executing the maneuver
//!       for any signal it finds
//!
//! Operator commands are applied from a third thread, reading either the keyboard or a script.
//!
//! Frames and model outputs are replayed from a recorded drive.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use color_eyre::{Report, eyre::{WrapErr, eyre}};
use log::{error, info, warn};
use structopt::StructOpt;

// Internal
use car_lib::{
    clock::{Clock, SystemClock},
    frame_slot::FrameSlot,
    lane_follow::{LaneFollower, SessionFrameSink},
    mech::LogMech,
    params::CarParams,
    replay::{InferenceLog, ReplayCamera, ReplayDetector, ReplaySteering},
    sign_detect::{LabelMap, SignDetector},
    user_cmd,
    vehicle::{ShutdownOnExit, Vehicle},
};
use util::{
    logger::{logger_init, LevelFilter},
    script_interpreter::ScriptInterpreter,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drive the car autonomously over a recorded drive.
#[derive(Debug, StructOpt)]
#[structopt(name = "car_exec")]
struct Opt {
    /// Parameter file, relative to the params directory
    #[structopt(long, default_value = "car_exec.toml")]
    params: String,

    /// User command script, if not given commands are read from the keyboard
    #[structopt(long, parse(from_os_str))]
    script: Option<PathBuf>,

    /// Minimum log level (info, debug or trace)
    #[structopt(long, default_value = "debug")]
    log_level: LevelFilter,

    /// Directory of recorded camera frames
    #[structopt(parse(from_os_str))]
    frames_dir: PathBuf,

    /// JSON log of the model outputs for the recorded frames
    #[structopt(parse(from_os_str))]
    inference_log: PathBuf,

    /// Simulate a car with no indicator light strip
    #[structopt(long)]
    no_indicators: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "car_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(opt.log_level, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Smart Car Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: CarParams = util::params::load(&opt.params)
        .wrap_err("Could not load car params")?;

    let labelmap_path = util::params::resolve(&params.labelmap_path)
        .wrap_err("Could not locate the labelmap")?;
    let labels = LabelMap::load(&labelmap_path)
        .wrap_err("Could not load the labelmap")?;

    info!("Parameters loaded, {} detector labels", labels.len());

    // ---- INITIALISE COLLABORATORS ----

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let mut cam = ReplayCamera::open(
        &opt.frames_dir,
        params.camera_width_px,
        params.camera_height_px,
        params.camera_frame_rate_hz,
        clock.clone()
    ).wrap_err("Failed to open the camera")?;

    let inference_log = Arc::new(
        InferenceLog::load(&opt.inference_log)
            .wrap_err("Failed to load the inference log")?
    );
    info!("Inference log holds {} frames", inference_log.len());

    let script = match opt.script {
        Some(ref path) => {
            let si = ScriptInterpreter::new(path)
                .wrap_err("Failed to load the user command script")?;
            info!(
                "Loaded script lasts {:.02} s and contains {} commands\n",
                si.get_duration(),
                si.get_num_cmds()
            );
            Some(si)
        },
        None => None
    };

    // ---- INITIALISE VEHICLE ----

    let vehicle = Arc::new(Vehicle::new(
        Box::new(LogMech::new(!opt.no_indicators)),
        params.lane.straight_angle_deg
    ));
    let frames = Arc::new(FrameSlot::new());

    let mut lane_follower = LaneFollower::new(
        Box::new(ReplaySteering(inference_log.clone())),
        vehicle.clone(),
        params.lane.clone()
    );
    let mut sink = SessionFrameSink::new(params.lane.save_every_n_frames);

    let mut sign_detector = SignDetector::new(
        Box::new(ReplayDetector(inference_log)),
        labels,
        params.clone(),
        vehicle.clone(),
        frames.clone(),
        clock.clone()
    );

    // ---- START TASKS ----

    // The car only moves once every task is running
    let detect_handle = {
        let vehicle = vehicle.clone();
        thread::Builder::new()
            .name("sign_detect".into())
            .spawn(move || {
                // The lane task must not keep driving without sign detection
                let _exit = ShutdownOnExit::new(vehicle, "sign detection");
                sign_detector.run()
            })
            .wrap_err("Failed to spawn the sign detection task")?
    };

    let cmd_spawn = match script {
        Some(si) => user_cmd::spawn_script(vehicle.clone(), si, clock.clone())
            .map(Some)
            .wrap_err("Failed to spawn the script task"),
        None => user_cmd::spawn_keyboard(vehicle.clone())
            .map(|_| None)
            .wrap_err("Failed to spawn the keyboard task")
    };

    let started = cmd_spawn.and_then(|h| {
        vehicle.start(params.cruise_speed)
            .wrap_err("Failed to start the vehicle")
            .map(|_| h)
    });

    let script_handle = match started {
        Ok(h) => h,
        Err(e) => {
            vehicle.shutdown();
            if detect_handle.join().is_err() {
                warn!("Sign detection task panicked");
            }
            session.exit();
            return Err(e)
        }
    };

    // ---- MAIN LOOP ----

    info!("Beginning lane following\n");

    let lane_result = lane_follower.run(&mut cam, &frames, &mut sink);

    // ---- SHUTDOWN ----

    if let Err(ref e) = lane_result {
        error!("Lane following failed: {}", e);
    }
    vehicle.shutdown();

    let detect_result = match detect_handle.join() {
        Ok(r) => r.wrap_err("Sign detection stopped on a fatal error"),
        Err(_) => Err(eyre!("Sign detection task panicked"))
    };

    if let Some(h) = script_handle {
        if h.join().is_err() {
            warn!("Script task panicked");
        }
    }

    info!("End of session");
    session.exit();

    lane_result.wrap_err("Lane following stopped on a fatal error")?;
    detect_result?;

    if frames.latest().is_none() {
        return Err(eyre!("No frames were acquired"))
    }

    Ok(())
}
