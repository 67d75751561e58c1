use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::status::{KioskStatus, StatusKind, StatusSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = new_spinner();
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Status sink that keeps the current kiosk message on screen.
    pub fn status_line(&self) -> ConsoleStatus {
        let spinner = self.use_pretty().then(new_spinner);
        ConsoleStatus {
            spinner,
            last: None,
            shown: None,
            reports_enabled: true,
        }
    }
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Terminal rendering of kiosk status.
///
/// Plain mode prints one line per change; pretty mode rewrites a spinner line.
pub struct ConsoleStatus {
    spinner: Option<ProgressBar>,
    last: Option<KioskStatus>,
    shown: Option<String>,
    reports_enabled: bool,
}

impl ConsoleStatus {
    fn render(&self, status: &KioskStatus) -> String {
        let marker = match status.kind() {
            StatusKind::Success => "✔",
            StatusKind::Failure => "✖",
            StatusKind::Locked => "⏸",
            StatusKind::Guidance => "!",
            StatusKind::Waiting | StatusKind::Verifying => "·",
        };
        if self.reports_enabled {
            format!("{} {}", marker, status)
        } else {
            format!("{} {} [relatórios desativados]", marker, status)
        }
    }

    fn show(&mut self, status: &KioskStatus) {
        let line = self.render(status);
        match &self.spinner {
            Some(spinner) => spinner.set_message(line.clone()),
            None => eprintln!("{line}"),
        }
        self.shown = Some(line);
    }
}

impl StatusSink for ConsoleStatus {
    fn publish(&mut self, status: &KioskStatus) {
        if self.last.as_ref() == Some(status) {
            return;
        }
        self.show(status);
        self.last = Some(status.clone());
    }

    fn set_report_actions(&mut self, enabled: bool) {
        if self.reports_enabled == enabled {
            return;
        }
        self.reports_enabled = enabled;
        if let Some(status) = self.last.clone() {
            self.show(&status);
        }
    }
}

impl Drop for ConsoleStatus {
    fn drop(&mut self) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_and_clear();
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
