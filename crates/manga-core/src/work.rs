use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::filename_classify::classify;
use crate::media::{Entry, PixelBuffer};
use crate::source::{Session, Source, WorkKind};
use crate::store::{MetadataRecord, MetadataStore};
use crate::{pool, render, DEFAULT_PAGE_WIDTH};

/// One catalog item: a folder or archive of page images.
///
/// A work is shared behind an `Arc`. Everything fixed at scan time is a plain
/// field; reading progress and the open session use interior mutability so
/// concurrent page loads only need `&self`.
#[derive(Debug)]
pub struct Work {
    /// Filesystem path, also the metadata store key
    pub path: PathBuf,
    pub kind: WorkKind,
    pub name: String,
    pub author: String,
    pub tags: Vec<String>,
    /// Cover as a `data:` URL, empty when it could not be rendered
    pub cover: String,
    /// Width / height of the cover source image
    pub aspect_ratio: f64,
    source: Option<Source>,
    entries: Vec<Entry>,
    readed_index: AtomicUsize,
    page_width: u32,
    session: Mutex<Option<Arc<Session>>>,
}

impl Work {
    /// Build a work from its scan results, merging a stored record.
    ///
    /// `source` is `None` for an unclassified path; such a work never opens.
    pub fn new(
        path: impl Into<PathBuf>,
        source: Option<Source>,
        entries: Vec<Entry>,
        record: MetadataRecord,
    ) -> Self {
        let path = path.into();
        let kind = source.as_ref().map_or(WorkKind::Unclassified, Source::kind);
        let display = display_name(&path, kind);
        let classified = classify(&display);
        let aspect_ratio = if record.aspect_ratio.is_finite() && record.aspect_ratio > 0.0 {
            record.aspect_ratio
        } else {
            1.0
        };

        let work = Self {
            path,
            kind,
            name: classified.name,
            author: classified.author,
            tags: classified.tags,
            cover: record.cover,
            aspect_ratio,
            source,
            entries,
            readed_index: AtomicUsize::new(0),
            page_width: DEFAULT_PAGE_WIDTH,
            session: Mutex::new(None),
        };
        work.read(record.readed_index);
        work
    }

    /// Target width for decoded pages.
    pub fn with_page_width(mut self, page_width: u32) -> Self {
        self.page_width = page_width.max(1);
        self
    }

    pub fn page_width(&self) -> u32 {
        self.page_width
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn readed_index(&self) -> usize {
        self.readed_index.load(Ordering::Relaxed)
    }

    /// Record the page being read. Persisted on [`Work::close`].
    pub fn read(&self, index: usize) {
        let last = self.entries.len().saturating_sub(1);
        self.readed_index.store(index.min(last), Ordering::Relaxed);
    }

    pub fn is_opened(&self) -> bool {
        self.lock_session().is_some()
    }

    /// Snapshot of what the metadata store keeps for this work.
    pub fn record(&self) -> MetadataRecord {
        MetadataRecord {
            cover: self.cover.clone(),
            readed_index: self.readed_index(),
            aspect_ratio: self.aspect_ratio,
        }
    }

    /// Bind the source so pages can be loaded. Does nothing when already open.
    ///
    /// Failures are logged and leave the work closed.
    pub async fn open(&self) {
        if self.is_opened() {
            return;
        }
        let Some(source) = self.source.clone() else {
            tracing::warn!(path = %self.path.display(), "Cannot open unclassified work");
            return;
        };

        let bound = match pool::offload(move || source.bind()).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to open work");
                return;
            }
        };

        let mut session = self.lock_session();
        if session.is_some() {
            // Another open() won the race.
            bound.release();
            return;
        }
        *session = Some(bound);
        tracing::debug!(path = %self.path.display(), pages = self.entries.len(), "Opened work");
    }

    /// Decode page `index` if it is still unloaded.
    ///
    /// Returns `None` when the work is not open, the index is out of range,
    /// the page is already loading or loaded, or decoding failed. A failed
    /// page goes back to unloaded so a later call can retry it.
    pub async fn load_entry(&self, index: usize) -> Option<PixelBuffer> {
        let entry = self.entries.get(index)?;
        let session = {
            // Claim under the session lock so close() either sees the claim
            // and resets it, or runs first and leaves nothing to claim.
            let guard = self.lock_session();
            let session = guard.clone()?;
            if !entry.try_begin() {
                return None;
            }
            session
        };

        let reader = Arc::clone(&session);
        let target = entry.detached();
        let page_width = self.page_width;
        let result = pool::offload(move || {
            let bytes = reader.read(&target)?;
            render::render_page(&bytes, page_width)
        })
        .await;

        let current = self.lock_session();
        if !current.as_ref().is_some_and(|s| Arc::ptr_eq(s, &session)) {
            tracing::debug!(path = %self.path.display(), index, "Discarding page decoded after close");
            return None;
        }
        match result {
            Ok(page) => {
                entry.finish();
                Some(page)
            }
            Err(e) => {
                entry.rollback();
                tracing::warn!(
                    path = %self.path.display(),
                    entry = %entry.name,
                    error = %e,
                    "Failed to load page"
                );
                None
            }
        }
    }

    /// Persist reading progress, reset every page and release the source.
    /// Does nothing when the work is not open.
    pub fn close(&self, store: &MetadataStore) {
        let session = {
            let mut guard = self.lock_session();
            let Some(session) = guard.take() else {
                return;
            };
            for entry in &self.entries {
                entry.reset();
            }
            session
        };
        session.release();

        store.update_readed_index(&self.path, self.readed_index(), || self.record());
        if let Err(e) = store.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist reading progress");
        }
        tracing::debug!(path = %self.path.display(), readed_index = self.readed_index(), "Closed work");
    }

    pub fn summary(&self) -> WorkSummary<'_> {
        WorkSummary {
            path: &self.path,
            kind: self.kind,
            name: &self.name,
            author: &self.author,
            tags: &self.tags,
            pages: self.entries.len(),
            readed_index: self.readed_index(),
            aspect_ratio: self.aspect_ratio,
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Arc<Session>>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Serializable view of a work for listings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSummary<'a> {
    pub path: &'a Path,
    pub kind: WorkKind,
    pub name: &'a str,
    pub author: &'a str,
    pub tags: &'a [String],
    pub pages: usize,
    pub readed_index: usize,
    pub aspect_ratio: f64,
}

/// Name fed to the classifier: archives lose their extension, folders keep
/// their whole name (`Vol.1` stays `Vol.1`).
fn display_name(path: &Path, kind: WorkKind) -> String {
    let name = match kind {
        WorkKind::Directory => path.file_name(),
        WorkKind::Archive | WorkKind::Unclassified => path.file_stem(),
    };
    name.unwrap_or(path.as_os_str()).to_string_lossy().into_owned()
}
