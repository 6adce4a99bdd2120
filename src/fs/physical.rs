//! Disk-backed file system.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use walkdir::WalkDir;

use super::{fingerprint, pattern_path, FileSystem, InputFile};
use crate::error::{Error, Result};

/// File system rooted at one or more input directories, an output directory
/// and a temp directory.
#[derive(Debug, Clone)]
pub struct PhysicalFileSystem {
    input_roots: Vec<PathBuf>,
    output_root: PathBuf,
    temp_root: PathBuf,
}

impl PhysicalFileSystem {
    /// Create a file system over the given roots.
    pub fn new(
        input_roots: impl IntoIterator<Item = impl Into<PathBuf>>,
        output_root: impl Into<PathBuf>,
        temp_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_roots: input_roots.into_iter().map(Into::into).collect(),
            output_root: output_root.into(),
            temp_root: temp_root.into(),
        }
    }

    /// Input roots in lookup order.
    pub fn input_roots(&self) -> &[PathBuf] {
        &self.input_roots
    }

    /// Output root.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Temp root.
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }
}

impl FileSystem for PhysicalFileSystem {
    fn input_files(&self, patterns: &[String]) -> Result<Vec<InputFile>> {
        let mut seen = FxHashSet::default();
        let mut files = Vec::new();

        // earlier roots shadow later ones
        for root in &self.input_roots {
            for pattern in patterns {
                let relative = pattern_path(pattern);
                let full = root.join(&relative);
                let found = if full.is_file() {
                    vec![full]
                } else if full.is_dir() {
                    walk(&full, true)?
                } else {
                    Vec::new()
                };
                for path in found {
                    let Ok(rel) = path.strip_prefix(root) else {
                        continue;
                    };
                    if seen.insert(rel.to_path_buf()) {
                        files.push(InputFile {
                            relative: rel.to_path_buf(),
                            path,
                        });
                    }
                }
            }
        }

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
        path.is_file()
    }

    fn len(&self, path: &Path) -> Option<u64> {
        fs::metadata(path).ok().map(|m| m.len())
    }

    fn cache_code(&self, path: &Path) -> Option<u64> {
        let meta = fs::metadata(path).ok()?;
        Some(fingerprint(meta.len(), meta.modified().ok()))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send + '_>> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn write(&self, path: &Path, content: &mut dyn Read) -> Result<u64> {
        ensure_parent(path)?;
        let mut file = File::create(path).map_err(|e| Error::io(path, e))?;
        io::copy(content, &mut file).map_err(|e| Error::io(path, e))
    }

    fn append(&self, path: &Path, content: &mut dyn Read) -> Result<u64> {
        ensure_parent(path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;
        io::copy(content, &mut file).map_err(|e| Error::io(path, e))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        ensure_parent(to)?;
        fs::copy(from, to).map_err(|e| Error::io(from, e))?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::io(path, e)),
            _ => Ok(()),
        }
    }

    fn output_files(&self) -> Result<Vec<PathBuf>> {
        if !self.output_root.is_dir() {
            return Ok(Vec::new());
        }
        // links are reported themselves, never followed out of the output root
        walk(&self.output_root, false)
    }

    fn clean_output(&self) -> Result<()> {
        clean_dir(&self.output_root)
    }

    fn clean_temp(&self) -> Result<()> {
        clean_dir(&self.temp_root)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    Ok(())
}

/// Every non-directory entry below `dir`, sorted by file name per directory.
fn walk(dir: &Path, follow_links: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(follow_links)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::io(path, e.into())
        })?;
        if !entry.file_type().is_dir() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Remove the contents of `dir`, keeping the directory itself.
fn clean_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return fs::create_dir_all(dir).map_err(|e| Error::io(dir, e));
    }
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| Error::io(&path, e))?;
    }
    Ok(())
}
