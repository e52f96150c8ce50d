//! Read surface over the two kinds of work: zip archives and image folders.
//!
//! [`Source`] is the unbound adapter used while scanning. [`Source::bind`]
//! produces a [`Session`] that lives between `Work::open` and `Work::close`.

mod archive;
mod directory;

use std::path::Path;

pub use self::archive::{ArchiveSession, ArchiveSource};
pub use self::directory::{DirectorySession, DirectorySource};

use crate::media::Entry;
use crate::render::{self, Cover};
use crate::{Error, Result};

/// Archive extensions, compared case-insensitively.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "cbz"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum WorkKind {
    Unclassified,
    Archive,
    Directory,
}

pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ARCHIVE_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
}

#[derive(Debug, Clone)]
pub enum Source {
    Archive(ArchiveSource),
    Directory(DirectorySource),
}

impl Source {
    /// Pick the adapter for a filesystem node, or `None` if it can't be a work.
    pub fn detect(path: &Path, metadata: &std::fs::Metadata) -> Option<Self> {
        if metadata.is_dir() {
            Some(Source::Directory(DirectorySource::new(path)))
        } else if metadata.is_file() && is_archive(path) {
            Some(Source::Archive(ArchiveSource::new(path)))
        } else {
            None
        }
    }

    pub fn kind(&self) -> WorkKind {
        match self {
            Source::Archive(_) => WorkKind::Archive,
            Source::Directory(_) => WorkKind::Directory,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Source::Archive(s) => s.path(),
            Source::Directory(s) => s.path(),
        }
    }

    /// Page entries in enumeration order, filtered to recognized image names.
    pub fn list_images(&self) -> Result<Vec<Entry>> {
        match self {
            Source::Archive(s) => s.list_images(),
            Source::Directory(s) => s.list_images(),
        }
    }

    /// Render the cover from the first of `entries`.
    pub fn read_cover(&self, entries: &[Entry], height: u32, quality: u8) -> Result<Cover> {
        let first = entries
            .first()
            .ok_or_else(|| Error::NoImages(self.path().to_path_buf()))?;
        let session = self.bind()?;
        let bytes = session.read(first);
        session.release();
        render::render_cover(&bytes?, height, quality)
    }

    pub fn bind(&self) -> Result<Session> {
        match self {
            Source::Archive(s) => s.bind().map(Session::Archive),
            Source::Directory(s) => Ok(Session::Directory(s.bind())),
        }
    }
}

/// Bound state of a source while its work is open.
#[derive(Debug)]
pub enum Session {
    Archive(ArchiveSession),
    Directory(DirectorySession),
}

impl Session {
    /// Raw bytes of one entry.
    pub fn read(&self, entry: &Entry) -> Result<Vec<u8>> {
        match self {
            Session::Archive(s) => s.read(entry),
            Session::Directory(s) => s.read(entry),
        }
    }

    /// Drop any open handle. Safe to call more than once.
    pub fn release(&self) {
        match self {
            Session::Archive(s) => s.release(),
            Session::Directory(_) => {}
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Session::Archive(s) => s.path(),
            Session::Directory(s) => s.path(),
        }
    }
}
