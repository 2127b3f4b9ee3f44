//! galframe - Precomputed visual-novel frame cache
//!
//! This library provides functionality to:
//! - Resolve per-character layout documents and canvas sizes
//! - Composite every portrait × background pair with the dialog box
//! - Validate and rebuild the on-disk composite cache
//! - Open cached composite bases for text rendering

pub mod build;
pub mod cli;
pub mod config;
pub mod output;
pub mod watch;
