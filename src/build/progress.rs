//! Build progress reporting.
//!
//! Every stage of a cache build reports `(event, current, total, message)`
//! tuples through a [`ProgressReporter`]. Reporting is observational only:
//! [`notify`] discards whatever a reporter does wrong, whether it returns an
//! error or panics, so a broken sink can never abort or corrupt a build.
//!
//! # Example
//!
//! ```ignore
//! use galframe::build::progress::{FnProgress, ProgressEvent, ProgressKind};
//!
//! let reporter = FnProgress::new(|name, current, total, message| {
//!     println!("{name} {current}/{total} {message}");
//!     Ok(())
//! });
//! notify(&reporter, ProgressEvent::new(ProgressKind::Start, 0, 0, "rin"));
//! ```

use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Error type a reporter may return; it is always discarded.
pub type ReportError = Box<dyn std::error::Error + Send + Sync>;

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// A build call started
    Start,
    /// A background was prepared
    PrepareBg,
    /// A pair was composited
    Composite,
    /// The cache was already complete
    Skip,
    /// The build aborted
    Error,
    /// The build finished
    Done,
}

impl ProgressKind {
    /// Event name as exposed to callbacks.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Start => "start",
            ProgressKind::PrepareBg => "prepare_bg",
            ProgressKind::Composite => "composite",
            ProgressKind::Skip => "skip",
            ProgressKind::Error => "error",
            ProgressKind::Done => "done",
        }
    }
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(kind: ProgressKind, current: usize, total: usize, message: impl Into<String>) -> Self {
        Self { kind, current, total, message: message.into() }
    }
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: &ProgressEvent) -> Result<(), ReportError>;
}

/// Deliver `event` to `reporter`, discarding any error or panic it raises.
pub fn notify(reporter: &dyn ProgressReporter, event: ProgressEvent) {
    match catch_unwind(AssertUnwindSafe(|| reporter.report(&event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::trace!(event = event.kind.as_str(), error = %e, "progress reporter failed")
        }
        Err(_) => tracing::trace!(event = event.kind.as_str(), "progress reporter panicked"),
    }
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: &ProgressEvent) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Adapts a `(name, current, total, message)` closure into a reporter.
pub struct FnProgress<F> {
    callback: F,
}

impl<F> FnProgress<F>
where
    F: Fn(&str, usize, usize, &str) -> Result<(), ReportError> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for FnProgress<F>
where
    F: Fn(&str, usize, usize, &str) -> Result<(), ReportError> + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) -> Result<(), ReportError> {
        (self.callback)(event.kind.as_str(), event.current, event.total, &event.message)
    }
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    /// Whether to use colors
    use_colors: bool,
    /// Print every composite event instead of a sparse subset
    verbose: bool,
    /// Output writer (for testing)
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a reporter writing to stderr, colored when stderr is a terminal.
    pub fn new() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stderr),
            verbose: false,
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { use_colors: false, verbose: false, output: Mutex::new(Box::new(output)) }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn writeln(&self, line: &str) -> Result<(), ReportError> {
        let mut output = self.output.lock().map_err(|_| "progress output poisoned")?;
        writeln!(output, "{}", line)?;
        Ok(())
    }

    /// Sparse composite output: first, last and every tenth of the way.
    fn should_print_composite(&self, current: usize, total: usize) -> bool {
        if self.verbose || current == 0 || current >= total {
            return true;
        }
        let step = (total / 10).max(1);
        current % step == 0
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: &ProgressEvent) -> Result<(), ReportError> {
        let ProgressEvent { kind, current, total, message } = event;
        match kind {
            ProgressKind::Start => self.writeln(&format!("{} {}", self.cyan("[start]"), message)),
            ProgressKind::PrepareBg => self.writeln(&format!(
                "{} [{}/{}] {}",
                self.cyan("[prepare]"),
                current,
                total,
                message
            )),
            ProgressKind::Composite => {
                if self.should_print_composite(*current, *total) {
                    self.writeln(&format!(
                        "{} [{}/{}] {}",
                        self.cyan("[composite]"),
                        current,
                        total,
                        message
                    ))
                } else {
                    Ok(())
                }
            }
            ProgressKind::Skip => self.writeln(&format!("{} {}", self.yellow("[skip]"), message)),
            ProgressKind::Error => self.writeln(&format!("{} {}", self.red("[error]"), message)),
            ProgressKind::Done => self.writeln(&format!("{} {}", self.green("[done]"), message)),
        }
    }
}

/// JSON progress reporter for machine-readable output (one object per line).
pub struct JsonProgress {
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProgress").finish()
    }
}

impl JsonProgress {
    /// Create a new JSON progress reporter writing to stderr.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a JSON progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &ProgressEvent) -> Result<(), ReportError> {
        let json = serde_json::json!({
            "event": event.kind.as_str(),
            "current": event.current,
            "total": event.total,
            "message": event.message,
        });
        let mut output = self.output.lock().map_err(|_| "progress output poisoned")?;
        writeln!(output, "{}", json)?;
        Ok(())
    }
}
