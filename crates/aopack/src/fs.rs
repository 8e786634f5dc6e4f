//! Read-only file system access for project discovery
//!
//! The graph builder never touches `std::fs` directly. It goes through the
//! [`FileSystem`] trait so tests can describe a whole project in memory.

use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;

use crate::naming::normalize_path;

/// Minimal read-only view of a file system
pub trait FileSystem: fmt::Debug {
    /// Whether anything exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Read the whole file as UTF-8 text
    ///
    /// A missing file must be reported as [`io::ErrorKind::NotFound`]; callers
    /// rely on that kind to tell "not local" apart from real I/O failures.
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// The real file system
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory file system keyed by normalized path
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    files: IndexMap<PathBuf, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`MemoryFileSystem::insert`]
    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, contents: impl Into<String>) {
        self.files
            .insert(normalize_path(path.as_ref()), contents.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// A path is a directory when some stored file lives below it
    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(&normalize_path(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize_path(path))
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )
            })
    }
}
