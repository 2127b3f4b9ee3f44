//! Build result types.
//!
//! Contains types for representing the outcome of cache build operations.

use std::time::Duration;

/// What a build call did for one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Composites and manifest were written
    Built,
    /// Cache was already complete
    Skipped,
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Built => write!(f, "built"),
            BuildStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of one `ensure_cache`/`rebuild_cache` call.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Character the build ran for
    pub character: String,
    pub status: BuildStatus,
    /// Number of portraits found
    pub portraits: usize,
    /// Number of backgrounds found
    pub backgrounds: usize,
    /// Composite files written by this call (0 when skipped)
    pub composites: usize,
    /// Build duration
    pub duration: Duration,
}

impl BuildReport {
    /// Create a report for a build that wrote the cache.
    pub fn built(
        character: impl Into<String>,
        portraits: usize,
        backgrounds: usize,
        composites: usize,
        duration: Duration,
    ) -> Self {
        Self {
            character: character.into(),
            status: BuildStatus::Built,
            portraits,
            backgrounds,
            composites,
            duration,
        }
    }

    /// Create a report for a build that found the cache complete.
    pub fn skipped(character: impl Into<String>, portraits: usize, backgrounds: usize) -> Self {
        Self {
            character: character.into(),
            status: BuildStatus::Skipped,
            portraits,
            backgrounds,
            composites: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status == BuildStatus::Skipped
    }

    /// Number of composites the cache holds for this character.
    pub fn expected_items(&self) -> usize {
        self.portraits * self.backgrounds
    }

    /// One-line summary for terminal output.
    pub fn summary(&self) -> String {
        match self.status {
            BuildStatus::Built => format!(
                "{}: built {} composites ({} portraits x {} backgrounds) in {:.2?}",
                self.character, self.composites, self.portraits, self.backgrounds, self.duration
            ),
            BuildStatus::Skipped => format!(
                "{}: up to date ({} composites)",
                self.character,
                self.expected_items()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_status_display() {
        assert_eq!(BuildStatus::Built.to_string(), "built");
        assert_eq!(BuildStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_built_report() {
        let report = BuildReport::built("rin", 2, 3, 6, Duration::from_millis(120));
        assert!(!report.is_skipped());
        assert_eq!(report.expected_items(), 6);
        assert!(report.summary().starts_with("rin: built 6 composites (2 portraits x 3 backgrounds)"));
    }

    #[test]
    fn test_skipped_report() {
        let report = BuildReport::skipped("rin", 2, 1);
        assert!(report.is_skipped());
        assert_eq!(report.composites, 0);
        assert_eq!(report.summary(), "rin: up to date (2 composites)");
    }
}
