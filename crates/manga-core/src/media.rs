use std::sync::atomic::{AtomicU8, Ordering};

/// Extensions accepted as pages. Matched as a case-sensitive `.ext` suffix.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "apng", "gif", "webp", "avif", "tif", "bmp", "tga",
];

/// Check whether a file or archive member name looks like a page image.
pub fn is_image(name: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|ext| {
        name.strip_suffix(ext)
            .is_some_and(|rest| rest.ends_with('.') && rest.len() > 1)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryStatus {
    Unloaded = 0,
    Loading = 1,
    Loaded = 2,
}

impl EntryStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => EntryStatus::Loading,
            2 => EntryStatus::Loaded,
            _ => EntryStatus::Unloaded,
        }
    }
}

/// One page of a work.
#[derive(Debug)]
pub struct Entry {
    /// File name (directory works) or member name (archive works)
    pub name: String,
    /// Index of the member in the archive's central directory (archive works only)
    pub member_index: Option<usize>,
    status: AtomicU8,
}

impl Entry {
    pub fn new(name: String, member_index: Option<usize>) -> Self {
        Self {
            name,
            member_index,
            status: AtomicU8::new(EntryStatus::Unloaded as u8),
        }
    }

    /// Same page reference with a fresh status, for handing to worker threads.
    pub(crate) fn detached(&self) -> Self {
        Self::new(self.name.clone(), self.member_index)
    }

    pub fn status(&self) -> EntryStatus {
        EntryStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Claim the entry for decoding. Only one caller can win per session.
    pub(crate) fn try_begin(&self) -> bool {
        self.transition(EntryStatus::Unloaded, EntryStatus::Loading)
    }

    pub(crate) fn finish(&self) -> bool {
        self.transition(EntryStatus::Loading, EntryStatus::Loaded)
    }

    /// Put a failed load back so a later scroll pass can retry it.
    pub(crate) fn rollback(&self) -> bool {
        self.transition(EntryStatus::Loading, EntryStatus::Unloaded)
    }

    pub(crate) fn reset(&self) {
        self.status
            .store(EntryStatus::Unloaded as u8, Ordering::Release);
    }

    fn transition(&self, from: EntryStatus, to: EntryStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Decoded page pixels, RGBA8, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}
