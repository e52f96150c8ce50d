use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use encoding_rs::SHIFT_JIS;
use zip::ZipArchive;

use crate::media::{is_image, Entry};
use crate::{Error, Result};

/// Resource-fork members written by macOS archivers.
const MACOS_METADATA_PREFIX: &str = "__MACOSX/";

/// Decode a zip member name, trying UTF-8 first, then Shift_JIS
pub(crate) fn decode_zip_name(raw: &[u8]) -> String {
    // Try UTF-8 first
    if let Ok(s) = std::str::from_utf8(raw) {
        return s.to_string();
    }

    // Fall back to Shift_JIS (common for Japanese ZIP files)
    let (decoded, _, had_errors) = SHIFT_JIS.decode(raw);
    if !had_errors {
        return decoded.into_owned();
    }

    // Last resort: lossy UTF-8
    String::from_utf8_lossy(raw).into_owned()
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    Ok(ZipArchive::new(file)?)
}

#[derive(Debug, Clone)]
pub struct ArchiveSource {
    path: PathBuf,
}

impl ArchiveSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Image members in central-directory order.
    pub fn list_images(&self) -> Result<Vec<Entry>> {
        let mut archive = open_archive(&self.path)?;
        let mut entries = Vec::new();

        for i in 0..archive.len() {
            let member = match archive.by_index(i) {
                Ok(member) => member,
                Err(e) => {
                    tracing::debug!(archive = %self.path.display(), index = i, error = %e, "Skipping unreadable member");
                    continue;
                }
            };
            if member.is_dir() {
                continue;
            }

            let name = decode_zip_name(member.name_raw());
            if name.starts_with(MACOS_METADATA_PREFIX) || !is_image(&name) {
                continue;
            }
            entries.push(Entry::new(name, Some(i)));
        }

        Ok(entries)
    }

    /// Open the archive and keep the handle for the session.
    pub fn bind(&self) -> Result<ArchiveSession> {
        Ok(ArchiveSession {
            path: self.path.clone(),
            archive: Mutex::new(Some(open_archive(&self.path)?)),
        })
    }
}

/// An archive held open while its work is being read.
///
/// Member reads share one handle and are serialized on it; callers decode
/// outside the lock.
#[derive(Debug)]
pub struct ArchiveSession {
    path: PathBuf,
    archive: Mutex<Option<ZipArchive<File>>>,
}

impl ArchiveSession {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self, entry: &Entry) -> Result<Vec<u8>> {
        let index = entry
            .member_index
            .ok_or_else(|| Error::MissingEntry(entry.name.clone()))?;

        let mut guard = self.archive.lock().unwrap_or_else(|e| e.into_inner());
        let archive = guard.as_mut().ok_or(Error::SessionClosed)?;
        let mut member = archive.by_index(index)?;
        // Header sizes are untrusted; let the buffer grow with what is read.
        let mut bytes = Vec::new();
        member
            .read_to_end(&mut bytes)
            .map_err(|e| Error::io(self.path.join(&entry.name), e))?;
        Ok(bytes)
    }

    pub fn release(&self) {
        let handle = self.archive.lock().unwrap_or_else(|e| e.into_inner()).take();
        if handle.is_some() {
            tracing::debug!(archive = %self.path.display(), "Released archive handle");
        }
    }

    pub fn is_released(&self) -> bool {
        self.archive.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render::tests::png_bytes;
    use crate::source::tests::write_zip;
    use tempfile::tempdir;

    #[test]
    fn test_decode_zip_name() {
        assert_eq!(decode_zip_name("表紙.jpg".as_bytes()), "表紙.jpg");
        // "表紙" in Shift_JIS
        let sjis = [0x95, 0x5C, 0x8E, 0x86, b'.', b'j', b'p', b'g'];
        assert_eq!(decode_zip_name(&sjis), "表紙.jpg");
    }

    #[test]
    fn test_list_images_filters_and_keeps_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.zip");
        write_zip(
            &path,
            &[
                ("b.png", png_bytes(2, 2)),
                ("readme.txt", b"hi".to_vec()),
                ("__MACOSX/._a.png", b"junk".to_vec()),
                ("a.jpg", png_bytes(2, 2)),
            ],
        );

        let entries = ArchiveSource::new(&path).list_images().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["b.png", "a.jpg"]);
        assert_eq!(entries[0].member_index, Some(0));
        assert_eq!(entries[1].member_index, Some(3));
    }

    #[test]
    fn test_corrupt_archive_fails_to_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        assert!(ArchiveSource::new(&path).list_images().is_err());
        assert!(ArchiveSource::new(&path).bind().is_err());
    }

    #[test]
    fn test_session_read_and_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.zip");
        let page = png_bytes(3, 3);
        write_zip(&path, &[("1.png", page.clone())]);

        let source = ArchiveSource::new(&path);
        let entries = source.list_images().unwrap();
        let session = source.bind().unwrap();
        assert_eq!(session.read(&entries[0]).unwrap(), page);

        session.release();
        session.release();
        assert!(session.is_released());
        assert!(matches!(session.read(&entries[0]), Err(Error::SessionClosed)));
    }

    /// One stored member whose local and central headers claim ~2 GiB.
    pub(crate) fn write_lying_zip(path: &Path, page: &[u8]) {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut buf = std::io::Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("01.png", options).unwrap();
        zip.write_all(page).unwrap();
        zip.finish().unwrap();
        let mut bytes = buf.into_inner();

        let claimed = 0x7FFF_FFF0u32.to_le_bytes();
        let find = |bytes: &[u8], sig: &[u8]| bytes.windows(4).position(|w| w == sig).unwrap();
        let local = find(&bytes, b"PK\x03\x04");
        let central = find(&bytes, b"PK\x01\x02");
        bytes[local + 22..local + 26].copy_from_slice(&claimed);
        bytes[central + 24..central + 28].copy_from_slice(&claimed);
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn test_member_with_bogus_size_does_not_crash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("liar.zip");
        write_lying_zip(&path, &png_bytes(4, 4));

        let source = ArchiveSource::new(&path);
        let Ok(entries) = source.list_images() else {
            return;
        };
        let Ok(session) = source.bind() else {
            return;
        };
        let session = std::sync::Arc::new(session);
        let reader = std::sync::Arc::clone(&session);
        let target = entries[0].detached();
        // Ok or Err both fine; it must come back instead of taking the process down.
        let _ = crate::pool::offload(move || reader.read(&target)).await;
        session.release();
    }
}
