use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the replay engine.
///
/// Rejected lines are never errors; only session setup and source
/// repositioning can fail.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// No source path was configured.
    #[error("replay source path is required")]
    MissingSource,

    /// The source could not be opened.
    #[error("open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rewinding the source for a new pass failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
