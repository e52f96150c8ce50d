use std::fs;
use std::path::{Path, PathBuf};

use crate::media::{is_image, Entry};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct DirectorySource {
    path: PathBuf,
}

impl DirectorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Image files directly inside the folder, sorted by name.
    pub fn list_images(&self) -> Result<Vec<Entry>> {
        let read_dir = fs::read_dir(&self.path).map_err(|e| Error::ReadDir {
            path: self.path.clone(),
            source: e,
        })?;

        let mut names: Vec<String> = Vec::new();
        for dir_entry in read_dir.flatten() {
            let Ok(name) = dir_entry.file_name().into_string() else {
                tracing::debug!(dir = %self.path.display(), "Skipping non UTF-8 file name");
                continue;
            };
            if is_image(&name) && dir_entry.path().is_file() {
                names.push(name);
            }
        }
        names.sort();

        Ok(names.into_iter().map(|name| Entry::new(name, None)).collect())
    }

    /// Folders hold no handle; every read opens its own file.
    pub fn bind(&self) -> DirectorySession {
        DirectorySession {
            path: self.path.clone(),
        }
    }
}

#[derive(Debug)]
pub struct DirectorySession {
    path: PathBuf,
}

impl DirectorySession {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self, entry: &Entry) -> Result<Vec<u8>> {
        let file = self.path.join(&entry.name);
        fs::read(&file).map_err(|e| Error::io(file, e))
    }
}
