//! Source signature for cache invalidation.
//!
//! The signature is a SHA-256 digest over everything that can change the
//! pixels of a composite: canvas size, output format and JPEG quality, and
//! the identity of the layout document, the dialog box image and every
//! portrait and background file. Identity
//! is `(path, mtime_ns, size)`; in [`SignatureMode::Content`] the file bytes
//! are hashed as well.

use crate::build::{AssetEntry, BuildContext};
use crate::config::SignatureMode;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Compute the source signature for the character described by `ctx`.
///
/// Files that vanish between listing and hashing are skipped.
pub fn compute_signature(
    ctx: &BuildContext,
    portraits: &[AssetEntry],
    backgrounds: &[AssetEntry],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ctx.canvas().to_string().as_bytes());
    hasher.update(ctx.format().as_str().as_bytes());
    hasher.update(ctx.jpeg_quality().to_string().as_bytes());
    hasher.update(ctx.signature_mode().as_str().as_bytes());

    let mode = ctx.signature_mode();
    hash_file_identity(&mut hasher, ctx.config_path(), mode);
    hash_file_identity(&mut hasher, &ctx.dialog_box_path(), mode);
    for entry in portraits.iter().chain(backgrounds) {
        hash_file_identity(&mut hasher, &entry.path, mode);
    }

    format!("{:x}", hasher.finalize())
}

/// Feed one file's identity into the hasher.
fn hash_file_identity(hasher: &mut Sha256, path: &Path, mode: SignatureMode) {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return,
    };

    let normalized = path.to_string_lossy().replace('\\', "/");
    let mtime_ns = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    hasher.update(normalized.as_bytes());
    hasher.update(mtime_ns.to_string().as_bytes());
    hasher.update(metadata.len().to_string().as_bytes());

    if mode == SignatureMode::Content {
        if let Err(e) = hash_file_contents(hasher, path) {
            tracing::debug!(file = %path.display(), error = %e, "file unreadable while hashing");
        }
    }
}

fn hash_file_contents(hasher: &mut Sha256, path: &Path) -> io::Result<()> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        hasher.update(&buf[..n]);
    }
}
