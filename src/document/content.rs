//! Lazy content handles.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::fs::FileSystem;

/// Lazily opened document content.
///
/// Providers may hold expensive resources; [`release`](Self::release) closes
/// them once no reachable document uses the provider anymore. Opening a
/// released provider fails with [`Error::ContentReleased`].
pub trait ContentProvider: Send + Sync {
    /// Open a new stream over the content.
    fn open(&self) -> Result<Box<dyn Read + Send + '_>>;

    /// Content length in bytes, if known without reading.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Close any held resources. Must be idempotent.
    fn release(&self) {}

    /// Returns `true` once [`release`](Self::release) was called.
    fn is_released(&self) -> bool {
        false
    }
}

// =============================================================================
// NullContent
// =============================================================================

/// Empty content.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullContent;

impl ContentProvider for NullContent {
    fn open(&self) -> Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(std::io::empty()))
    }

    fn len(&self) -> Option<u64> {
        Some(0)
    }
}

// =============================================================================
// MemoryContent
// =============================================================================

/// In-memory content; releasing drops the buffer.
pub struct MemoryContent {
    bytes: RwLock<Option<Arc<[u8]>>>,
}

impl MemoryContent {
    /// Wrap the given bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: RwLock::new(Some(bytes.into())),
        }
    }
}

impl From<String> for MemoryContent {
    fn from(text: String) -> Self {
        Self::new(text.into_bytes())
    }
}

impl From<&str> for MemoryContent {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl From<Vec<u8>> for MemoryContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl ContentProvider for MemoryContent {
    fn open(&self) -> Result<Box<dyn Read + Send + '_>> {
        match self.bytes.read().as_ref() {
            Some(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            None => Err(Error::ContentReleased("memory content".into())),
        }
    }

    fn len(&self) -> Option<u64> {
        self.bytes.read().as_ref().map(|b| b.len() as u64)
    }

    fn release(&self) {
        self.bytes.write().take();
    }

    fn is_released(&self) -> bool {
        self.bytes.read().is_none()
    }
}

// =============================================================================
// FileContent
// =============================================================================

/// Content read lazily from a file system path.
pub struct FileContent {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    released: AtomicBool,
}

impl FileContent {
    /// Content of `path` as seen through `fs`.
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
            released: AtomicBool::new(false),
        }
    }

    /// Backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentProvider for FileContent {
    fn open(&self) -> Result<Box<dyn Read + Send + '_>> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::ContentReleased(self.path.display().to_string()));
        }
        self.fs.open(&self.path)
    }

    fn len(&self) -> Option<u64> {
        self.fs.len(&self.path)
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_content_release() {
        let content = MemoryContent::from("abc");
        assert_eq!(content.len(), Some(3));

        let mut text = String::new();
        content.open().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "abc");

        content.release();
        content.release();
        assert!(content.is_released());
        assert!(matches!(content.open(), Err(Error::ContentReleased(_))));
    }

    #[test]
    fn test_null_content_is_empty() {
        let mut buf = Vec::new();
        NullContent.open().unwrap().read_to_end(&mut buf).unwrap();
        assert!(buf.is_empty());
    }
}
