//! Configuration module for galframe
//!
//! Provides types and parsing for `galframe.toml` settings and for the
//! per-character layout documents.

pub mod loader;
pub mod schema;

pub use loader::{load_character_config, load_settings, ConfigError, LoadedCharacter};
pub use schema::*;
