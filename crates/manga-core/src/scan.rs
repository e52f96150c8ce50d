use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};

use crate::source::Source;
use crate::store::MetadataStore;
use crate::work::Work;
use crate::{pool, CatalogOptions, Error, Result};

/// Hard stop for pathologically deep trees.
const MAX_DEPTH: usize = 64;

/// Called once per discovered work, in catalog order.
pub type DiscoveredCallback<'a> = dyn Fn(&Arc<Work>) + Send + Sync + 'a;

enum Probe {
    Work(Box<Work>),
    /// A folder without pages of its own; look inside it.
    Descend(PathBuf),
    Skip,
}

/// Walks a library tree and builds the catalog.
pub struct Scanner {
    store: Arc<MetadataStore>,
    options: CatalogOptions,
}

impl Scanner {
    pub fn new(store: Arc<MetadataStore>, options: CatalogOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// Scan `root` depth-first and return every work found under it.
    ///
    /// Children are visited in file-name order. A folder or archive with at
    /// least one page is a work; a folder without pages is searched instead.
    /// Stored covers, aspect ratios and reading positions are reused, new
    /// covers are rendered and the store is flushed once at the end.
    ///
    /// Fails only when `root` itself cannot be listed.
    pub async fn scan(
        &self,
        root: impl AsRef<Path>,
        on_each: &DiscoveredCallback<'_>,
    ) -> Result<Vec<Arc<Work>>> {
        let root = root.as_ref();
        let t = std::time::Instant::now();

        let children = list_children(root).await?;
        let works = self.walk_children(children, 0, on_each).await;

        tracing::info!(
            root = %root.display(),
            works = works.len(),
            elapsed_ms = t.elapsed().as_millis() as u64,
            "Scan complete"
        );
        self.store.flush()?;
        Ok(works)
    }

    fn walk<'a>(
        &'a self,
        folder: PathBuf,
        depth: usize,
        on_each: &'a DiscoveredCallback<'a>,
    ) -> BoxFuture<'a, Vec<Arc<Work>>> {
        Box::pin(async move {
            if depth >= MAX_DEPTH {
                tracing::warn!(dir = %folder.display(), "Directory nesting too deep, not descending");
                return Vec::new();
            }
            match list_children(&folder).await {
                Ok(children) => self.walk_children(children, depth, on_each).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory");
                    Vec::new()
                }
            }
        })
    }

    async fn walk_children(
        &self,
        children: Vec<PathBuf>,
        depth: usize,
        on_each: &DiscoveredCallback<'_>,
    ) -> Vec<Arc<Work>> {
        let mut works = Vec::new();
        // Probes run ahead with bounded concurrency; `buffered` keeps their order.
        let mut probes = stream::iter(children)
            .map(|child| self.probe(child))
            .buffered(self.options.scan_concurrency.max(1));

        while let Some(probe) = probes.next().await {
            match probe {
                Probe::Work(work) => {
                    let work = Arc::new(*work);
                    if !work.cover.is_empty() {
                        self.store.put(&work.path, work.record());
                    }
                    on_each(&work);
                    works.push(work);
                }
                Probe::Descend(dir) => {
                    works.extend(self.walk(dir, depth + 1, on_each).await);
                }
                Probe::Skip => {}
            }
        }
        works
    }

    async fn probe(&self, path: PathBuf) -> Probe {
        let metadata = match stat(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable path");
                return Probe::Skip;
            }
        };
        if metadata.is_symlink_dir {
            tracing::debug!(path = %path.display(), "Skipping symlinked directory");
            return Probe::Skip;
        }
        let metadata = metadata.target;
        let Some(source) = Source::detect(&path, &metadata) else {
            return Probe::Skip;
        };

        let mut record = self.store.get(&path).unwrap_or_default();
        let options = self.options.clone();
        let work_path = path.clone();
        let classified = pool::offload(move || {
            let entries = source.list_images()?;
            if entries.is_empty() {
                return Ok(None);
            }
            if record.cover.is_empty() {
                match source.read_cover(&entries, options.cover_height, options.cover_quality) {
                    Ok(cover) => {
                        record.cover = cover.data_url;
                        record.aspect_ratio = cover.aspect_ratio;
                    }
                    Err(e) => {
                        tracing::warn!(path = %work_path.display(), error = %e, "Failed to render cover");
                    }
                }
            }
            let work = Work::new(work_path, Some(source), entries, record)
                .with_page_width(options.page_width);
            Ok(Some(Box::new(work)))
        })
        .await;

        match classified {
            Ok(Some(work)) => {
                tracing::debug!(path = %path.display(), kind = ?work.kind, pages = work.len(), "Discovered work");
                Probe::Work(work)
            }
            Ok(None) if metadata.is_dir() => Probe::Descend(path),
            Ok(None) => Probe::Skip,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable work");
                Probe::Skip
            }
        }
    }
}

struct Stat {
    target: std::fs::Metadata,
    is_symlink_dir: bool,
}

/// Metadata of what `path` points at. Symlinked files are followed; symlinked
/// directories are flagged so the walk never revisits a tree through a link.
async fn stat(path: &Path) -> std::io::Result<Stat> {
    let link = tokio::fs::symlink_metadata(path).await?;
    if !link.file_type().is_symlink() {
        return Ok(Stat {
            target: link,
            is_symlink_dir: false,
        });
    }
    let target = tokio::fs::metadata(path).await?;
    Ok(Stat {
        is_symlink_dir: target.is_dir(),
        target,
    })
}

/// Children of `dir`, sorted by file name.
async fn list_children(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir_err = |source| Error::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(read_dir_err)?;
    let mut children = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(read_dir_err)? {
        children.push(entry.path());
    }
    children.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(children)
}
