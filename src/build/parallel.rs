//! Parallel build execution.
//!
//! Both parallel stages of a build run on one bounded rayon pool:
//!
//! 1. Background preparation fans out across background entries
//! 2. Pair composition fans out across every `(portrait, background)` pair
//!
//! The stages are separated by a barrier: composition only starts once
//! every background is prepared. Workers only read the shared images and
//! each writes its own output file, so no locking is needed beyond the
//! progress counter.
//!
//! # Example
//!
//! ```ignore
//! use galframe::build::{build_pool, CancellationToken};
//!
//! let pool = build_pool(4)?;
//! let cancel = CancellationToken::new();
//! let written = composite_pairs(&ctx, &scene, &portraits, &backgrounds, &pool, &*progress, &cancel)?;
//! ```

use crate::build::composite::Scene;
use crate::build::prepare::PreparedImage;
use crate::build::progress::{notify, ProgressEvent, ProgressKind, ProgressReporter};
use crate::build::{BuildContext, BuildError};
use crate::output::{composite_file_name, save_composite};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a caller and a build.
///
/// Clones observe the same flag. Workers check it before starting each
/// unit of work; work already in flight finishes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(BuildError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), BuildError> {
        if self.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Create the worker pool for one build.
pub fn build_pool(jobs: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|i| format!("galframe-worker-{}", i))
        .build()
}

/// Composite and save every `(portrait, background)` pair.
///
/// Pairs are enumerated portrait-major. The first failure (or a
/// cancellation) stops workers from picking up further pairs and is
/// returned. Returns the number of files written.
pub fn composite_pairs(
    ctx: &BuildContext,
    scene: &Scene,
    portraits: &[PreparedImage],
    backgrounds: &[PreparedImage],
    pool: &ThreadPool,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<usize, BuildError> {
    let pairs: Vec<(&PreparedImage, &PreparedImage)> = portraits
        .iter()
        .flat_map(|portrait| backgrounds.iter().map(move |background| (portrait, background)))
        .collect();
    let total = pairs.len();
    let done = AtomicUsize::new(0);

    tracing::debug!(
        character = ctx.character(),
        pairs = total,
        jobs = pool.current_num_threads(),
        "compositing pairs"
    );

    pool.install(|| {
        pairs.par_iter().try_for_each(|(portrait, background)| -> Result<(), BuildError> {
            cancel.check()?;

            let image = scene.compose(&background.image, &portrait.image);
            let path = ctx.composite_path(&portrait.key, &background.key);
            save_composite(&image, &path, ctx.format(), ctx.jpeg_quality())?;

            let current = done.fetch_add(1, Ordering::SeqCst) + 1;
            notify(
                progress,
                ProgressEvent::new(
                    ProgressKind::Composite,
                    current,
                    total,
                    composite_file_name(&portrait.key, &background.key, ctx.format()),
                ),
            );
            Ok(())
        })
    })?;

    Ok(done.into_inner())
}
