//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod status;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::build::{ConsoleProgress, JsonProgress, NullProgress, ProgressReporter};
use crate::config::loader::{load_settings, merge_cli_overrides, CliOverrides};
use crate::config::{CacheFormat, Settings};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// galframe - Precompute portrait × background composites for visual novels
#[derive(Parser)]
#[command(name = "galframe")]
#[command(about = "galframe - Precompute portrait x background frame caches for visual novels")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Settings file (default: search for galframe.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override asset root
    #[arg(long, global = true)]
    pub base: Option<PathBuf>,

    /// Override cache root
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,

    /// Output format: jpeg, png
    #[arg(long, global = true, value_parser = parse_format)]
    pub format: Option<CacheFormat>,

    /// JPEG quality (1-100)
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Worker threads (0 = available cores)
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Progress output
    #[arg(long, global = true, value_enum, default_value = "console")]
    pub progress: ProgressMode,

    /// Verbose output (debug logging, every progress event)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Progress reporter selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProgressMode {
    /// Human-readable lines on stderr
    #[default]
    Console,
    /// One JSON object per event on stderr
    Json,
    /// No progress output
    None,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Make sure a character's cache is complete, rebuilding only if needed
    Ensure {
        /// Character id (folder name under characters/)
        character: String,
    },

    /// Rebuild one or more character caches
    Rebuild {
        /// Character ids
        characters: Vec<String>,

        /// Rebuild every character under characters/
        #[arg(long)]
        all: bool,

        /// Rebuild even when the cache is complete
        #[arg(short, long)]
        force: bool,
    },

    /// Show whether a character's cache is complete
    Status {
        /// Character id
        character: String,
    },

    /// List characters with their asset counts
    List,

    /// Watch a character's assets and rebuild on changes
    Watch {
        /// Character id
        character: String,
    },
}

fn parse_format(value: &str) -> Result<CacheFormat, String> {
    CacheFormat::parse(value).ok_or_else(|| format!("unknown format '{}' (expected jpeg or png)", value))
}

/// Install the tracing subscriber. `RUST_LOG` wins over the default level.
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

impl GlobalArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            base: self.base.clone(),
            cache: self.cache.clone(),
            format: self.format,
            quality: self.quality,
            jobs: self.jobs,
        }
    }

    /// Load settings and apply command-line overrides.
    pub(crate) fn settings(&self) -> Result<Settings, ExitCode> {
        let mut settings = match load_settings(self.config.as_deref()) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error loading settings: {}", e);
                return Err(ExitCode::from(EXIT_INVALID_ARGS));
            }
        };
        merge_cli_overrides(&mut settings, &self.overrides());
        Ok(settings)
    }

    /// Progress reporter for the selected mode.
    pub(crate) fn reporter(&self) -> Arc<dyn ProgressReporter> {
        match self.progress {
            ProgressMode::Console => Arc::new(ConsoleProgress::new().with_verbose(self.verbose)),
            ProgressMode::Json => Arc::new(JsonProgress::new()),
            ProgressMode::None => Arc::new(NullProgress::new()),
        }
    }
}

/// Parse arguments and run the selected command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let global = cli.global;
    match cli.command {
        Commands::Ensure { character } => build::run_ensure(&global, &character),
        Commands::Rebuild { characters, all, force } => {
            build::run_rebuild(&global, &characters, all, force)
        }
        Commands::Status { character } => status::run_status(&global, &character),
        Commands::List => status::run_list(&global),
        Commands::Watch { character } => build::run_watch(&global, &character),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_progress_modes_document_stderr() {
        for mode in [ProgressMode::Console, ProgressMode::Json] {
            let value = mode.to_possible_value().unwrap();
            let help = value.get_help().unwrap().to_string();
            assert!(help.contains("stderr"), "{}: {}", value.get_name(), help);
        }
    }

    #[test]
    fn test_parse_rebuild_with_globals() {
        let cli = Cli::try_parse_from([
            "galframe", "rebuild", "rin", "aoi", "--force", "--format", "png", "-j", "4",
        ])
        .unwrap();

        assert_eq!(cli.global.format, Some(CacheFormat::Png));
        assert_eq!(cli.global.jobs, Some(4));
        assert_eq!(cli.global.progress, ProgressMode::Console);
        match cli.command {
            Commands::Rebuild { characters, all, force } => {
                assert_eq!(characters, vec!["rin".to_string(), "aoi".to_string()]);
                assert!(!all);
                assert!(force);
            }
            _ => panic!("expected rebuild"),
        }
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(Cli::try_parse_from(["galframe", "ensure", "rin", "--format", "webp"]).is_err());
    }

    #[test]
    fn test_quality_range() {
        assert!(Cli::try_parse_from(["galframe", "ensure", "rin", "--quality", "0"]).is_err());
        assert!(Cli::try_parse_from(["galframe", "ensure", "rin", "--quality", "85"]).is_ok());
    }

    #[test]
    fn test_overrides_from_globals() {
        let cli = Cli::try_parse_from([
            "galframe", "--base", "art", "--quality", "70", "status", "rin",
        ])
        .unwrap();
        let overrides = cli.global.overrides();
        assert_eq!(overrides.base, Some(PathBuf::from("art")));
        assert_eq!(overrides.quality, Some(70));
        assert_eq!(overrides.cache, None);
    }
}
