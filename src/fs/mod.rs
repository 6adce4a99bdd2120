//! File system abstraction consumed by the engine and the I/O modules.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ FileSystem                                    │
//! │   input_files(patterns) ─► [InputFile]        │
//! │   open / read           ─► content streams    │
//! │   write / append / copy ─► output root        │
//! │   cache_code(path)      ─► cheap fingerprint  │
//! └───────────────────────────────────────────────┘
//!        ▲                          ▲
//!  PhysicalFileSystem        MemoryFileSystem
//!  (disk, three roots)       (in-process, counts writes)
//! ```
//!
//! Patterns are deliberately simple: a pattern names either a file or a
//! directory (walked recursively) relative to each input root.

mod fingerprint;
mod memory;
mod physical;

pub use fingerprint::{fingerprint, hash_bytes, hash_reader};
pub use memory::MemoryFileSystem;
pub use physical::PhysicalFileSystem;

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// An input file found by [`FileSystem::input_files`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputFile {
    /// Full path usable with the other [`FileSystem`] methods.
    pub path: PathBuf,
    /// Path relative to the input root it was found in.
    pub relative: PathBuf,
}

/// File access used by the engine.
///
/// Paths passed to the read/write methods are full paths as returned by
/// [`input_files`](Self::input_files), [`output_path`](Self::output_path) or
/// [`temp_path`](Self::temp_path).
pub trait FileSystem: Send + Sync {
    /// Resolve patterns against the input roots, sorted by relative path.
    fn input_files(&self, patterns: &[String]) -> Result<Vec<InputFile>>;

    /// Full path of an output file.
    fn output_path(&self, relative: &Path) -> PathBuf;

    /// Full path inside the temp directory.
    fn temp_path(&self, relative: &Path) -> PathBuf;

    /// Returns `true` if the file exists.
    fn exists(&self, path: &Path) -> bool;

    /// File length, if the file exists.
    fn len(&self, path: &Path) -> Option<u64>;

    /// Cheap fingerprint of the file's observable state (existence, size,
    /// modification stamp). `None` if the file does not exist.
    fn cache_code(&self, path: &Path) -> Option<u64>;

    /// Open the file for reading.
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send + '_>>;

    /// Read the whole file.
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open(path)?
            .read_to_end(&mut buf)
            .map_err(|e| Error::io(path, e))?;
        Ok(buf)
    }

    /// Replace the file with the reader's content, creating parent
    /// directories. Returns the number of bytes written.
    fn write(&self, path: &Path, content: &mut dyn Read) -> Result<u64>;

    /// Append the reader's content to the file, creating it if needed.
    fn append(&self, path: &Path, content: &mut dyn Read) -> Result<u64>;

    /// Copy a file, creating parent directories of the target.
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file. Missing files are not an error.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Full paths of every file currently under the output root.
    fn output_files(&self) -> Result<Vec<PathBuf>>;

    /// Delete everything under the output root.
    fn clean_output(&self) -> Result<()>;

    /// Delete everything under the temp root.
    fn clean_temp(&self) -> Result<()>;
}

/// Normalize a pattern into a relative path (strips `./` and leading `/`).
pub(crate) fn pattern_path(pattern: &str) -> PathBuf {
    let trimmed = pattern.trim().trim_start_matches("./").trim_start_matches('/');
    PathBuf::from(trimmed)
}
