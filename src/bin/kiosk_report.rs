//! kiosk_report - download an attendance report from the backend

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use attendance_kiosk::{api, ui, HttpBackend, KioskConfig, ReportDownloader, ReportKind};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Report kind (semanal|mensal).
    #[arg(long)]
    kind: ReportKind,
    /// Output directory (defaults to KIOSK_REPORT_DIR or the current directory).
    #[arg(long)]
    out: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let config = KioskConfig::load()?;
    let out_dir = args.out.unwrap_or_else(|| config.report_dir.clone());
    let backend = HttpBackend::new(&config.backend_url, config.http_timeout)?;
    let downloader = ReportDownloader::new(&backend, &out_dir);
    let enabled = match api::daemon_report_actions(&config.api_addr, config.http_timeout)? {
        Some(enabled) => enabled,
        None => {
            log::info!("no kiosk daemon at {}; downloading without lockout check", config.api_addr);
            true
        }
    };

    let mut status = ui.status_line();
    let file = {
        let _stage = ui.stage(&format!("Download relatório {}", args.kind));
        downloader.download(args.kind, enabled, &mut status)?
    };
    println!("{}", file.path.display());
    Ok(())
}
