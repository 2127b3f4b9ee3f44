//! Watch mode for automatic cache rebuilds on asset changes
//!
//! Provides file system watching with debouncing for the `galframe watch`
//! command. Every debounced batch of relevant changes triggers a
//! non-forced rebuild, which is skipped when the signature still matches.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

use crate::build::{is_image_file, BuildReport, CacheBuilder};
use crate::config::schema::WatchConfig;

/// Error during watch mode
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(notify::Error),
    /// Channel receive error
    #[error("Watch channel error: {0}")]
    ChannelError(String),
    /// Character folder not found
    #[error("Character directory not found: {}", .0.display())]
    CharacterNotFound(PathBuf),
}

/// Options for watch mode
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Character to keep up to date
    pub character: String,
    /// Watch configuration (debounce, clear screen)
    pub config: WatchConfig,
}

impl WatchOptions {
    pub fn new(character: impl Into<String>, config: WatchConfig) -> Self {
        Self { character: character.into(), config }
    }
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

/// Format duration for display
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Get current timestamp for logging
fn timestamp() -> String {
    use std::time::SystemTime;

    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs() % 86400;
    let hours = (secs / 3600) % 24;
    let minutes = (secs / 60) % 60;
    let seconds = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Directories whose changes can affect the cache of `character`.
///
/// The character folder covers its layout document, dialog box, portraits
/// and own backgrounds; the shared background folder is added when present.
pub fn watch_paths(builder: &CacheBuilder, character: &str) -> Vec<PathBuf> {
    let paths = builder.paths();
    let mut dirs = vec![paths.character_root(character)];
    let common = paths.common_background_dir();
    if common.is_dir() {
        dirs.push(common);
    }
    dirs
}

/// Check if a file change is relevant for rebuilding
fn is_relevant_file(path: &Path) -> bool {
    if is_image_file(path) {
        return true;
    }
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| matches!(ext.as_str(), "yaml" | "yml" | "json"))
}

/// Run one non-forced rebuild and print its outcome.
fn rebuild(builder: &CacheBuilder, character: &str) {
    println!("[{}] Checking {}...", timestamp(), character);
    match builder.rebuild_cache(character, false) {
        Ok(report) => print_report(&report),
        Err(e) => eprintln!("[{}] Build failed: {}", timestamp(), e),
    }
}

fn print_report(report: &BuildReport) {
    if report.is_skipped() {
        println!("[{}] Up to date ({} composites)", timestamp(), report.expected_items());
    } else {
        println!(
            "[{}] Build complete ({}) - Composites: {}",
            timestamp(),
            format_duration(report.duration),
            report.composites
        );
    }
}

/// Watch a character's assets and rebuild its cache on changes.
///
/// This function blocks and runs until interrupted (Ctrl+C).
///
/// # Example
/// ```ignore
/// let builder = CacheBuilder::new(settings.clone());
/// watch_and_rebuild(&builder, WatchOptions::new("rin", settings.watch))?;
/// ```
pub fn watch_and_rebuild(builder: &CacheBuilder, options: WatchOptions) -> Result<(), WatchError> {
    let character = options.character.as_str();
    let root = builder.paths().character_root(character);
    if !root.is_dir() {
        return Err(WatchError::CharacterNotFound(root));
    }

    let (tx, rx) = channel();
    let debounce_duration = Duration::from_millis(u64::from(options.config.debounce_ms));
    let mut debouncer = new_debouncer(debounce_duration, tx).map_err(WatchError::WatcherInit)?;

    let dirs = watch_paths(builder, character);
    for dir in &dirs {
        debouncer.watcher().watch(dir, RecursiveMode::Recursive).map_err(WatchError::WatchPath)?;
        tracing::debug!(dir = %dir.display(), "watching");
    }

    if options.config.clear_screen {
        clear_screen();
    }
    rebuild(builder, character);
    println!("[{}] Watching {} for changes...", timestamp(), root.display());

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let relevant: Vec<_> = events
                    .iter()
                    .filter(|e| {
                        matches!(e.kind, DebouncedEventKind::Any) && is_relevant_file(&e.path)
                    })
                    .collect();

                if relevant.is_empty() {
                    continue;
                }
                for event in &relevant {
                    if let Some(name) = event.path.file_name() {
                        println!("[{}] Changed: {}", timestamp(), name.to_string_lossy());
                    }
                }

                if options.config.clear_screen {
                    clear_screen();
                }
                rebuild(builder, character);
                println!("[{}] Watching {} for changes...", timestamp(), root.display());
            }
            Ok(Err(error)) => {
                tracing::warn!(error = ?error, "watch error, continuing");
            }
            Err(e) => {
                return Err(WatchError::ChannelError(e.to_string()));
            }
        }
    }
}
