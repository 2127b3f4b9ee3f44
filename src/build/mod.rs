//! Composite cache build system for galframe
//!
//! Precomputes every portrait × background composite of a character so the
//! runtime only has to draw text on top of a cached base image.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Discovery**: List portraits and backgrounds of a character
//! - **Validation**: Decide whether the existing cache is complete
//! - **Preparation**: Scale backgrounds to the canvas and persist them
//! - **Composition**: Layer background, portrait and dialog box per pair
//!
//! # Example
//!
//! ```ignore
//! use galframe::build::CacheBuilder;
//! use galframe::config::load_settings;
//!
//! let builder = CacheBuilder::new(load_settings(None)?);
//! let report = builder.ensure_cache("rin")?;
//! println!("{}", report.summary());
//! ```

pub mod composite;
pub mod context;
pub mod discovery;
pub mod incremental;
pub mod manifest;
pub mod parallel;
pub mod pipeline;
pub mod prepare;
pub mod progress;
pub mod result;
pub mod signature;

pub use composite::Scene;
pub use context::*;
pub use discovery::*;
pub use incremental::*;
pub use manifest::*;
pub use parallel::*;
pub use pipeline::*;
pub use prepare::PreparedImage;
pub use progress::{
    ConsoleProgress, FnProgress, JsonProgress, NullProgress, ProgressEvent, ProgressKind,
    ProgressReporter,
};
pub use result::*;
pub use signature::compute_signature;
