use std::path::PathBuf;
use thiserror::Error;

/// Failure to establish a watch. Per-event problems never surface here.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Cannot watch {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Operational errors hit while building a reload update.
#[derive(Error, Debug)]
pub enum ReloadError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid ignore pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}
