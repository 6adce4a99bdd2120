//! In-memory file system.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{fingerprint, pattern_path, FileSystem, InputFile};
use crate::error::{Error, Result};

#[derive(Clone)]
struct MemoryFile {
    bytes: Arc<[u8]>,
    /// Monotonic stamp standing in for a modification time.
    stamp: u64,
}

/// File system kept entirely in memory.
///
/// Uses the roots `/input`, `/output` and `/temp`. Every write, append or copy
/// counts as one physical write, which makes it convenient for observing
/// incremental builds.
pub struct MemoryFileSystem {
    input_root: PathBuf,
    output_root: PathBuf,
    temp_root: PathBuf,
    files: RwLock<FxHashMap<PathBuf, MemoryFile>>,
    clock: AtomicU64,
    writes: AtomicUsize,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystem {
    /// Create an empty file system.
    pub fn new() -> Self {
        Self {
            input_root: PathBuf::from("/input"),
            output_root: PathBuf::from("/output"),
            temp_root: PathBuf::from("/temp"),
            files: RwLock::new(FxHashMap::default()),
            clock: AtomicU64::new(1),
            writes: AtomicUsize::new(0),
        }
    }

    /// Add or replace an input file (not counted as a physical write).
    pub fn add_input(&self, relative: impl AsRef<Path>, content: impl AsRef<[u8]>) {
        let path = self.input_root.join(relative);
        self.put(path, content.as_ref());
    }

    /// Builder-style [`add_input`](Self::add_input).
    pub fn with_input(self, relative: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Self {
        self.add_input(relative, content);
        self
    }

    /// Content of an output file.
    pub fn output(&self, relative: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = self.output_root.join(relative);
        self.files.read().get(&path).map(|f| f.bytes.to_vec())
    }

    /// Content of an output file as text.
    pub fn output_string(&self, relative: impl AsRef<Path>) -> Option<String> {
        self.output(relative)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    /// Modify a file behind the engine's back, as an external editor would.
    pub fn touch(&self, path: &Path, content: impl AsRef<[u8]>) {
        self.put(path.to_path_buf(), content.as_ref());
    }

    /// Number of physical writes performed so far.
    pub fn physical_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn put(&self, path: PathBuf, bytes: &[u8]) {
        let stamp = self.clock.fetch_add(1, Ordering::SeqCst);
        self.files.write().insert(
            path,
            MemoryFile {
                bytes: bytes.into(),
                stamp,
            },
        );
    }

    fn under(&self, root: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .read()
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    fn remove_under(&self, root: &Path) {
        self.files.write().retain(|p, _| !p.starts_with(root));
    }
}

impl FileSystem for MemoryFileSystem {
    fn input_files(&self, patterns: &[String]) -> Result<Vec<InputFile>> {
        let mut files: Vec<InputFile> = self
            .under(&self.input_root)
            .into_iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(&self.input_root).ok()?.to_path_buf();
                patterns
                    .iter()
                    .map(|p| pattern_path(p))
                    .any(|p| relative.starts_with(&p))
                    .then_some(InputFile { path, relative })
            })
            .collect();
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(files)
    }

    fn output_path(&self, relative: &Path) -> PathBuf {
        self.output_root.join(relative)
    }

    fn temp_path(&self, relative: &Path) -> PathBuf {
        self.temp_root.join(relative)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn len(&self, path: &Path) -> Option<u64> {
        self.files.read().get(path).map(|f| f.bytes.len() as u64)
    }

    fn cache_code(&self, path: &Path) -> Option<u64> {
        let files = self.files.read();
        let file = files.get(path)?;
        let modified = std::time::UNIX_EPOCH + std::time::Duration::from_nanos(file.stamp);
        Some(fingerprint(file.bytes.len() as u64, Some(modified)))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send + '_>> {
        let files = self.files.read();
        let file = files.get(path).ok_or_else(|| {
            Error::io(path, std::io::Error::from(std::io::ErrorKind::NotFound))
        })?;
        Ok(Box::new(Cursor::new(Arc::clone(&file.bytes))))
    }

    fn write(&self, path: &Path, content: &mut dyn Read) -> Result<u64> {
        let mut buf = Vec::new();
        content.read_to_end(&mut buf).map_err(|e| Error::io(path, e))?;
        self.put(path.to_path_buf(), &buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(buf.len() as u64)
    }

    fn append(&self, path: &Path, content: &mut dyn Read) -> Result<u64> {
        let mut buf = self
            .files
            .read()
            .get(path)
            .map(|f| f.bytes.to_vec())
            .unwrap_or_default();
        let before = buf.len();
        content.read_to_end(&mut buf).map_err(|e| Error::io(path, e))?;
        self.put(path.to_path_buf(), &buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok((buf.len() - before) as u64)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let bytes = self.read(from)?;
        self.put(to.to_path_buf(), &bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.files.write().remove(path);
        Ok(())
    }

    fn output_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self.under(&self.output_root))
    }

    fn clean_output(&self) -> Result<()> {
        self.remove_under(&self.output_root);
        Ok(())
    }

    fn clean_temp(&self) -> Result<()> {
        self.remove_under(&self.temp_root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_patterns() {
        let fs = MemoryFileSystem::new()
            .with_input("posts/a.md", "a")
            .with_input("posts/b.md", "b")
            .with_input("about.md", "about");
        let files = fs.input_files(&["posts".into()]).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative, PathBuf::from("posts/a.md"));

        let files = fs.input_files(&["/about.md".into()]).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_writes_are_counted_and_fingerprinted() {
        let fs = MemoryFileSystem::new();
        let out = fs.output_path(Path::new("a.txt"));
        fs.write(&out, &mut "x".as_bytes()).unwrap();
        let first = fs.cache_code(&out).unwrap();
        fs.write(&out, &mut "x".as_bytes()).unwrap();
        assert_ne!(fs.cache_code(&out).unwrap(), first);
        assert_eq!(fs.physical_writes(), 2);
        assert_eq!(fs.output_string("a.txt").as_deref(), Some("x"));
    }
}
