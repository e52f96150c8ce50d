//! Which pages to decode for a given scroll position.
//!
//! Pages are stacked vertically at a fixed height. The window covers every
//! page touching the viewport plus one page of margin on each side.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::media::PixelBuffer;
use crate::work::Work;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Height of one page in scroll units
    pub page_height: f64,
    /// Space above the first page, subtracted from the scroll offset
    pub padding_top: f64,
}

impl PageGeometry {
    pub fn new(page_height: f64) -> Self {
        Self {
            page_height,
            padding_top: 0.0,
        }
    }

    /// Page height of `work` when its pages are laid out `page_width` wide.
    pub fn for_work(work: &Work) -> Self {
        Self::new(work.page_width() as f64 / work.aspect_ratio)
    }

    pub fn with_padding(mut self, padding_top: f64) -> Self {
        self.padding_top = padding_top;
        self
    }

    /// Scroll offset that brings page `readed_index` to the top.
    pub fn resume_offset(&self, readed_index: usize) -> f64 {
        self.page_height * readed_index as f64 + self.padding_top
    }

    fn is_valid(&self) -> bool {
        self.page_height.is_finite() && self.page_height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchWindow {
    /// First index to load, may be negative
    pub start_index: i64,
    /// One past the last index to load
    pub end_index: i64,
    /// Page covering the largest share of the viewport
    pub read_index: usize,
}

impl PrefetchWindow {
    pub fn compute(geometry: &PageGeometry, scroll_offset: f64, viewport_height: f64) -> Self {
        if !geometry.is_valid() {
            return Self {
                start_index: 0,
                end_index: 0,
                read_index: 0,
            };
        }
        let ph = geometry.page_height;
        let offset = scroll_offset - geometry.padding_top;
        let bottom = offset + viewport_height.max(0.0);

        Self {
            // Partly visible pages count, hence floor/ceil.
            start_index: (offset / ph).floor() as i64 - 1,
            end_index: (bottom / ph).ceil() as i64 + 1,
            read_index: (offset / ph).round().max(0.0) as usize,
        }
    }

    /// The window clamped to the pages that exist.
    pub fn indices(&self, len: usize) -> Range<usize> {
        let clamp = |i: i64| i.clamp(0, len as i64) as usize;
        clamp(self.start_index)..clamp(self.end_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_offset: f64,
    pub viewport_height: f64,
}

/// A decoded page for the rendering side.
#[derive(Debug)]
pub struct LoadedPage {
    pub index: usize,
    pub page: PixelBuffer,
}

/// Debounced prefetch driver for one open work.
///
/// Scroll samples overwrite each other; once none has arrived for the
/// debounce interval the full window for the latest sample is loaded and
/// finished pages are sent to the consumer in completion order.
pub struct Prefetcher {
    scroll: watch::Sender<Option<Viewport>>,
    task: JoinHandle<()>,
}

impl Prefetcher {
    pub fn spawn(
        work: Arc<Work>,
        geometry: PageGeometry,
        debounce: Duration,
        pages: mpsc::UnboundedSender<LoadedPage>,
    ) -> Self {
        let (scroll, samples) = watch::channel(None);
        let task = tokio::spawn(run(work, geometry, debounce, samples, pages));
        Self { scroll, task }
    }

    pub fn scroll(&self, viewport: Viewport) {
        self.scroll.send_replace(Some(viewport));
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        // Page loads already dispatched keep running; only the driver stops.
        self.task.abort();
    }
}

async fn run(
    work: Arc<Work>,
    geometry: PageGeometry,
    debounce: Duration,
    mut samples: watch::Receiver<Option<Viewport>>,
    pages: mpsc::UnboundedSender<LoadedPage>,
) {
    loop {
        if samples.changed().await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => break,
                changed = samples.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        let Some(viewport) = *samples.borrow_and_update() else {
            continue;
        };
        let window =
            PrefetchWindow::compute(&geometry, viewport.scroll_offset, viewport.viewport_height);
        work.read(window.read_index);
        tracing::debug!(
            start = window.start_index,
            end = window.end_index,
            read = window.read_index,
            "Prefetch window"
        );

        for index in window.indices(work.len()) {
            let work = Arc::clone(&work);
            let pages = pages.clone();
            tokio::spawn(async move {
                if let Some(page) = work.load_entry(index).await {
                    let _ = pages.send(LoadedPage { index, page });
                }
            });
        }
    }
}
