//! Run status and progress reporting.
//!
//! Stages report coarse status lines and a completion fraction in `[0, 1]`
//! through a [`StatusSink`]. Output goes to **stderr** so stdout stays
//! parseable for scripts. Sinks are fire-and-forget.

use std::io::Write;

/// Receives status text and progress fractions from the pipeline.
pub trait StatusSink: Send + Sync {
    fn status(&self, text: &str);

    /// Overall completion in `[0, 1]`; values outside are clamped.
    fn progress(&self, fraction: f64);
}

/// Human-friendly stderr output: `[ 40%] Uploading content...`.
pub struct StderrStatus;

impl StatusSink for StderrStatus {
    fn status(&self, text: &str) {
        let _ = writeln!(std::io::stderr().lock(), "{}", text);
    }

    fn progress(&self, fraction: f64) {
        let line = format!("[{:>3}%]\n", percent(fraction));
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable output: one JSON object per line on stderr.
pub struct JsonStatus;

impl StatusSink for JsonStatus {
    fn status(&self, text: &str) {
        let obj = serde_json::json!({ "event": "status", "text": text });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }

    fn progress(&self, fraction: f64) {
        let obj = serde_json::json!({
            "event": "progress",
            "fraction": fraction.clamp(0.0, 1.0),
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op sink when progress is disabled.
pub struct NoStatus;

impl StatusSink for NoStatus {
    fn status(&self, _text: &str) {}
    fn progress(&self, _fraction: f64) {}
}

fn percent(fraction: f64) -> u32 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// A slice of the overall progress bar owned by one stage.
///
/// A stage that does `total` units of work reports `start` before the first
/// unit and `end` after the last.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSpan {
    pub start: f64,
    pub end: f64,
}

impl ProgressSpan {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Fraction after `done` of `total` units.
    pub fn at(&self, done: usize, total: usize) -> f64 {
        if total == 0 {
            return self.end;
        }
        let ratio = (done.min(total) as f64) / (total as f64);
        self.start + (self.end - self.start) * ratio
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn sink(&self) -> Box<dyn StatusSink> {
        match self {
            ProgressMode::Off => Box::new(NoStatus),
            ProgressMode::Human => Box::new(StderrStatus),
            ProgressMode::Json => Box::new(JsonStatus),
        }
    }
}
