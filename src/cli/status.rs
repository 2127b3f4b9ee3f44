//! Inspection commands (status, list)

use std::process::ExitCode;

use super::{GlobalArgs, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{
    list_backgrounds, list_characters, list_portraits, CacheBuilder, CacheManifest, CacheStatus,
};

/// Run the status command
pub fn run_status(global: &GlobalArgs, character: &str) -> ExitCode {
    let settings = match global.settings() {
        Ok(settings) => settings,
        Err(code) => return code,
    };
    let builder = CacheBuilder::new(settings);

    let status = match builder.cache_status(character) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let cache_dir = builder.paths().cache_dir(character);
    println!("Character: {}", character);
    println!("Cache:     {}", cache_dir.display());
    match &status {
        CacheStatus::Complete => println!("Status:    complete"),
        CacheStatus::Stale(reason) => println!("Status:    stale ({})", reason),
    }

    match CacheManifest::load_from_dir(&cache_dir) {
        Ok(Some(manifest)) => {
            println!("Manifest:");
            println!("  canvas:      {}", manifest.canvas());
            println!("  format:      {}", manifest.cache_format);
            println!(
                "  composites:  {} ({} portraits x {} backgrounds)",
                manifest.expected_items(),
                manifest.portrait_count,
                manifest.background_count
            );
            println!("  signature:   {}", manifest.source_signature);
        }
        Ok(None) => println!("Manifest:  none"),
        Err(e) => println!("Manifest:  unreadable ({})", e),
    }

    ExitCode::from(EXIT_SUCCESS)
}

/// Run the list command
pub fn run_list(global: &GlobalArgs) -> ExitCode {
    let settings = match global.settings() {
        Ok(settings) => settings,
        Err(code) => return code,
    };
    let builder = CacheBuilder::new(settings);
    let paths = builder.paths();

    let characters = list_characters(paths);
    if characters.is_empty() {
        println!("No characters found in {}", paths.characters_root().display());
        return ExitCode::from(EXIT_SUCCESS);
    }

    println!("{:<20} {:>10} {:>12}", "CHARACTER", "PORTRAITS", "BACKGROUNDS");
    for character in &characters {
        let portraits = list_portraits(&paths.portrait_dir(character)).len();
        let backgrounds = list_backgrounds(paths, character).len();
        println!("{:<20} {:>10} {:>12}", character, portraits, backgrounds);
    }

    ExitCode::from(EXIT_SUCCESS)
}
