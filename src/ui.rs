use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::error::ClientError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

/// Terminal feedback: the loading indicator and user-facing alerts.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    fn pretty(&self) -> bool {
        match self.mode {
            UiMode::Pretty => true,
            UiMode::Auto => self.is_tty,
            UiMode::Plain => false,
        }
    }

    /// Shows the loading indicator until the returned guard is finished or dropped.
    pub fn loading(&self, what: &str) -> LoadingIndicator {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("detecting defects in {what}…"));
            LoadingIndicator::new(what.to_string(), Some(spinner))
        } else {
            eprintln!("==> detecting defects in {}", what);
            LoadingIndicator::new(what.to_string(), None)
        }
    }

    /// Reports a failed cycle on stderr.
    pub fn alert(&self, err: &ClientError) {
        eprintln!("{}", alert_message(err));
    }
}

/// Text shown to the user for `err`.
pub fn alert_message(err: &ClientError) -> String {
    match err {
        ClientError::InvalidType { .. } => "Please select an image file".to_string(),
        ClientError::TooLarge { limit, .. } => {
            format!("File size must be less than {}", format_limit(*limit))
        }
        other => format!("Error: {}", other),
    }
}

fn format_limit(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

pub struct LoadingIndicator {
    what: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    finished: bool,
}

impl LoadingIndicator {
    fn new(what: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            what,
            start: Instant::now(),
            spinner,
            finished: false,
        }
    }

    pub fn succeed(mut self, detail: &str) {
        self.finish(format!("✔ {} {}", self.what, detail));
    }

    pub fn fail(mut self) {
        self.finish(format!("✘ {}", self.what));
    }

    fn finish(&mut self, message: String) {
        self.finished = true;
        let message = format!("{} ({})", message, format_duration(self.start.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

impl Drop for LoadingIndicator {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
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
