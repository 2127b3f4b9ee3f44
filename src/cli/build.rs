//! Build command implementations (ensure, rebuild, watch)

use std::process::ExitCode;

use super::{GlobalArgs, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::build::{list_characters, BuildError, CacheBuilder};

fn builder(global: &GlobalArgs) -> Result<CacheBuilder, ExitCode> {
    let settings = global.settings()?;
    Ok(CacheBuilder::new(settings).with_progress(global.reporter()))
}

fn print_error(character: &str, error: &BuildError) {
    eprintln!("Error building '{}': {}", character, error);
    match error {
        BuildError::ConfigMissing { .. } => {
            eprintln!("Create config.yaml in the character folder or check --base");
        }
        BuildError::DialogBoxMissing(_) => {
            eprintln!("Set assets.dialog_box in the character config to an existing image");
        }
        _ => {}
    }
}

/// Run the ensure command
pub fn run_ensure(global: &GlobalArgs, character: &str) -> ExitCode {
    let builder = match builder(global) {
        Ok(builder) => builder,
        Err(code) => return code,
    };

    match builder.ensure_cache(character) {
        Ok(report) => {
            println!("{}", report.summary());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            print_error(character, &e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the rebuild command for the listed characters (or all of them)
pub fn run_rebuild(global: &GlobalArgs, characters: &[String], all: bool, force: bool) -> ExitCode {
    let builder = match builder(global) {
        Ok(builder) => builder,
        Err(code) => return code,
    };

    let targets: Vec<String> =
        if all { list_characters(builder.paths()) } else { characters.to_vec() };
    if targets.is_empty() {
        if all {
            eprintln!("No characters found in {}", builder.paths().characters_root().display());
            return ExitCode::from(EXIT_ERROR);
        }
        eprintln!("Error: name at least one character or pass --all");
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let mut failed = 0;
    for character in &targets {
        match builder.rebuild_cache(character, force) {
            Ok(report) => println!("{}", report.summary()),
            Err(e) => {
                print_error(character, &e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        eprintln!("{} of {} builds failed", failed, targets.len());
        ExitCode::from(EXIT_ERROR)
    } else {
        ExitCode::from(EXIT_SUCCESS)
    }
}

/// Run the watch command
pub fn run_watch(global: &GlobalArgs, character: &str) -> ExitCode {
    let settings = match global.settings() {
        Ok(settings) => settings,
        Err(code) => return code,
    };
    let watch_config = settings.watch.clone();
    let builder = CacheBuilder::new(settings).with_progress(global.reporter());

    println!("Starting watch mode...");
    println!("Press Ctrl+C to stop");
    println!();

    let options = crate::watch::WatchOptions::new(character, watch_config);
    match crate::watch::watch_and_rebuild(&builder, options) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
