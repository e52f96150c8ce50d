pub mod error;
pub mod filename_classify;
pub mod media;
pub mod prefetch;
pub mod render;
pub mod scan;
pub mod source;
pub mod store;
pub mod work;

mod pool;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::{Error, Result};
pub use media::{Entry, EntryStatus, PixelBuffer};
pub use prefetch::{LoadedPage, PageGeometry, Prefetcher, PrefetchWindow, Viewport};
pub use scan::{DiscoveredCallback, Scanner};
pub use source::WorkKind;
pub use store::{MetadataRecord, MetadataStore};
pub use work::{Work, WorkSummary};

pub const DEFAULT_COVER_HEIGHT: u32 = 170;
pub const DEFAULT_PAGE_WIDTH: u32 = 600;

fn default_cover_height() -> u32 {
    DEFAULT_COVER_HEIGHT
}

fn default_page_width() -> u32 {
    DEFAULT_PAGE_WIDTH
}

fn default_cover_quality() -> u8 {
    100
}

fn default_scan_concurrency() -> usize {
    4
}

fn default_debounce_ms() -> u64 {
    50
}

/// Tunables for scanning and reading. Every field has a default, so a
/// config file only needs the ones it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogOptions {
    /// Cover thumbnail height in pixels
    #[serde(default = "default_cover_height")]
    pub cover_height: u32,
    /// Decoded page width in pixels
    #[serde(default = "default_page_width")]
    pub page_width: u32,
    /// JPEG quality for covers (1-100)
    #[serde(default = "default_cover_quality")]
    pub cover_quality: u8,
    /// Sibling paths probed at once while scanning
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
    /// Quiet period before a scroll sample triggers loading
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Space above the first page in the reading view
    #[serde(default)]
    pub padding_top: f64,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            cover_height: default_cover_height(),
            page_width: default_page_width(),
            cover_quality: default_cover_quality(),
            scan_concurrency: default_scan_concurrency(),
            debounce_ms: default_debounce_ms(),
            padding_top: 0.0,
        }
    }
}

impl CatalogOptions {
    /// Read options from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"page_width": 800, "debounce_ms": 10}"#).unwrap();

        let options = CatalogOptions::load(&path).unwrap();
        assert_eq!(options.page_width, 800);
        assert_eq!(options.debounce(), Duration::from_millis(10));
        assert_eq!(options.cover_height, DEFAULT_COVER_HEIGHT);
        assert_eq!(options.scan_concurrency, 4);
    }

    #[test]
    fn test_missing_options_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CatalogOptions::load(&dir.path().join("nope.json")),
            Err(Error::Io { .. })
        ));
    }
}
