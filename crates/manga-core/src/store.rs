use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Current store file format version
const STORE_VERSION: u32 = 1;

/// Default store filename
pub const STORE_FILENAME: &str = "store.json";

fn default_aspect_ratio() -> f64 {
    1.0
}

/// Per-work state that survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub readed_index: usize,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,
}

impl Default for MetadataRecord {
    fn default() -> Self {
        Self {
            cover: String::new(),
            readed_index: 0,
            aspect_ratio: default_aspect_ratio(),
        }
    }
}

/// On-disk layout: every record lives under the single `works` key.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(default)]
    works: HashMap<String, MetadataRecord>,
}

/// Durable path → [`MetadataRecord`] map.
///
/// Loaded once, mutated in memory, written back with [`MetadataStore::flush`].
/// Writes replace whole records; the last writer wins.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    records: Mutex<HashMap<String, MetadataRecord>>,
}

impl MetadataStore {
    /// Load the store at `path`. A missing file gives an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match File::open(&path) {
            Ok(file) => {
                let doc: StoreDocument = serde_json::from_reader(BufReader::new(file))?;
                if doc.version == STORE_VERSION {
                    doc.works
                } else {
                    tracing::warn!(
                        path = %path.display(),
                        version = doc.version,
                        "Ignoring metadata store with unknown version"
                    );
                    HashMap::new()
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::io(&path, e)),
        };
        tracing::debug!(path = %path.display(), records = records.len(), "Loaded metadata store");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// `<data dir>/manga-rs/store.json`, if the platform has a data dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("manga-rs").join(STORE_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store key for a work path.
    pub fn key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    pub fn get(&self, path: &Path) -> Option<MetadataRecord> {
        self.lock().get(&Self::key(path)).cloned()
    }

    pub fn put(&self, path: &Path, record: MetadataRecord) {
        self.lock().insert(Self::key(path), record);
    }

    /// Merge a new reading position into the record for `path`, creating the
    /// record from `fallback` when there is none yet.
    pub fn update_readed_index(
        &self,
        path: &Path,
        readed_index: usize,
        fallback: impl FnOnce() -> MetadataRecord,
    ) {
        self.lock()
            .entry(Self::key(path))
            .or_insert_with(fallback)
            .readed_index = readed_index;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write all records to disk.
    pub fn flush(&self) -> Result<()> {
        let records = self.lock();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        let file = File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;
        let doc = StoreDocumentRef {
            version: STORE_VERSION,
            saved_at: Utc::now(),
            works: &*records,
        };
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &doc)?;
        writer.flush().map_err(|e| Error::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| Error::io(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "Flushed metadata store");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MetadataRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Borrowing twin of [`StoreDocument`] so flushing does not clone every cover.
#[derive(Serialize)]
struct StoreDocumentRef<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    works: &'a HashMap<String, MetadataRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record() -> MetadataRecord {
        MetadataRecord {
            cover: "c".to_string(),
            readed_index: 5,
            aspect_ratio: 1.5,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join("none.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(STORE_FILENAME);
        let work = Path::new("/library/Some Work");

        let store = MetadataStore::open(&path).unwrap();
        store.put(work, record());
        store.flush().unwrap();

        let reloaded = MetadataStore::open(&path).unwrap();
        assert_eq!(reloaded.get(work), Some(record()));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_file_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STORE_FILENAME);
        let store = MetadataStore::open(&path).unwrap();
        store.put(Path::new("P"), record());
        store.flush().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["works"]["P"]["cover"], "c");
        assert_eq!(raw["works"]["P"]["readedIndex"], 5);
        assert_eq!(raw["works"]["P"]["aspectRatio"], 1.5);
    }

    #[test]
    fn test_update_readed_index_merges() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::open(dir.path().join(STORE_FILENAME)).unwrap();
        let work = Path::new("P");
        store.put(work, record());

        store.update_readed_index(work, 9, MetadataRecord::default);
        let merged = store.get(work).unwrap();
        assert_eq!(merged.readed_index, 9);
        assert_eq!(merged.cover, "c");
        assert_eq!(merged.aspect_ratio, 1.5);

        let other = Path::new("Q");
        store.update_readed_index(other, 2, MetadataRecord::default);
        assert_eq!(store.get(other).unwrap().readed_index, 2);
    }

    #[test]
    fn test_unknown_version_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STORE_FILENAME);
        fs::write(
            &path,
            r#"{"version":99,"saved_at":"2024-01-01T00:00:00Z","works":{"P":{"cover":"c"}}}"#,
        )
        .unwrap();
        assert!(MetadataStore::open(&path).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STORE_FILENAME);
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(MetadataStore::open(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_partial_record_gets_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STORE_FILENAME);
        fs::write(
            &path,
            r#"{"version":1,"saved_at":"2024-01-01T00:00:00Z","works":{"P":{"readedIndex":3}}}"#,
        )
        .unwrap();
        let rec = MetadataStore::open(&path).unwrap().get(Path::new("P")).unwrap();
        assert_eq!(rec.cover, "");
        assert_eq!(rec.readed_index, 3);
        assert_eq!(rec.aspect_ratio, 1.0);
    }
}
