//! kioskd - attendance kiosk daemon
//!
//! This daemon:
//! 1. Acquires the camera and loads the face detector
//! 2. Samples one frame per tick and gates it on face count and size
//! 3. Uploads accepted stills to the recognition backend
//! 4. Shows check-in / check-out results and enforces the rate-limit lockout
//! 5. Serves the local status API (unless `--no-api`)

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use attendance_kiosk::{
    api::{ApiConfig, StatusApi},
    ui, AttendanceLoop, CameraSource, DetectorRegistry, HttpBackend, KioskConfig, LoopParts,
    ReportSource, StatusBoard, StatusFanout,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Face detector backend (overrides KIOSK_DETECTOR / config file).
    #[arg(long)]
    detector: Option<String>,
    /// List available detector backends and exit.
    #[arg(long)]
    list_detectors: bool,
    /// Do not start the local status API.
    #[arg(long)]
    no_api: bool,
    /// UI mode for stderr status (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let registry = DetectorRegistry::with_builtin();
    if args.list_detectors {
        for name in registry.list() {
            println!("{}", name);
        }
        return Ok(());
    }

    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, false);

    let mut config = {
        let _stage = ui.stage("Load configuration");
        KioskConfig::load()?
    };
    if let Some(name) = args.detector {
        config.select_detector(&name)?;
    }
    log::info!(
        "backend={} camera={} detector={}",
        config.backend_url,
        config.camera.url,
        config.detector.name
    );

    let detector = {
        let _stage = ui.stage("Build face detector");
        registry.build(&config.detector.name, &config.detector_settings())?
    };
    let source = CameraSource::new(config.camera_config())?;
    let backend = Arc::new(HttpBackend::new(&config.backend_url, config.http_timeout)?);

    let board = StatusBoard::new();
    let api_handle = if args.no_api {
        None
    } else {
        let api_config = ApiConfig {
            addr: config.api_addr.clone(),
        };
        let reports: Arc<dyn ReportSource> = backend.clone();
        Some(StatusApi::new(api_config, board.clone(), reports).spawn()?)
    };

    let sink = StatusFanout::new()
        .with(ui.status_line())
        .with(board.clone());
    let mut kiosk = AttendanceLoop::new(
        LoopParts {
            source: Box::new(source),
            detector,
            client: backend,
            sink: Box::new(sink),
        },
        config.loop_settings()?,
    );
    {
        let _stage = ui.stage("Acquire camera and load detector");
        kiosk.start()?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("kioskd running. press Ctrl-C to stop");
    let stats = kiosk.run(&shutdown);
    log::info!(
        "shutdown: ticks={} submissions={} lockouts={} dropped_slots={}",
        stats.ticks,
        stats.submissions,
        stats.lockouts,
        stats.dropped_slots
    );

    if let Some(handle) = api_handle {
        handle.stop()?;
    }
    Ok(())
}
