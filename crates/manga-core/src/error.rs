use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the catalog core.
///
/// Only scan-root failures and store I/O reach callers of the public API;
/// per-entry failures are logged and turned into `None` by [`crate::Work`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("metadata store error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no image entries in {0}")]
    NoImages(PathBuf),
    #[error("entry {0} is not part of this source")]
    MissingEntry(String),
    #[error("source session already released")]
    SessionClosed,
    #[error("worker dropped the task before completing it")]
    WorkerGone,
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
