//! Filesystem access for manifest resolution
//!
//! Resolution never touches `std::fs` directly; it goes through a
//! [`FileSystem`] so tests can substitute an in-memory tree.
//!
//! - `OsFileSystem`: the real filesystem
//! - `MemoryFileSystem`: in-memory files for testing

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};

use crate::error::{CoreError, Result};

/// Trait for filesystem access providers
pub trait FileSystem: Send + Sync + Debug {
    /// Read the contents of a file as bytes
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Check if a regular file exists
    fn file_exists(&self, path: &Path) -> bool;

    /// Check if a directory exists
    fn directory_exists(&self, path: &Path) -> bool;

    /// Expand an absolute glob pattern into matching paths
    fn glob(&self, pattern: &Path) -> Result<Vec<PathBuf>>;

    /// Process working directory
    fn working_dir(&self) -> Result<PathBuf>;

    /// Resolve `path` against `working_dir` into a normalized absolute path
    fn abs_path(&self, path: &Path, working_dir: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&working_dir.join(path))
        }
    }

    /// Read a file as UTF-8 text
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|e| CoreError::FileAccess {
            path: path.display().to_string(),
            message: format!("file is not valid UTF-8: {}", e),
        })
    }
}

/// Lexically remove `.` and `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// The real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| CoreError::io(path.display().to_string(), &e))
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn glob(&self, pattern: &Path) -> Result<Vec<PathBuf>> {
        let pattern_str = pattern.to_string_lossy();
        let paths = glob::glob(&pattern_str).map_err(|e| CoreError::GlobPattern {
            pattern: pattern_str.to_string(),
            message: e.to_string(),
        })?;

        let mut matches = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => matches.push(path),
                Err(e) => {
                    tracing::debug!(path = %e.path().display(), "skipping unreadable glob match");
                }
            }
        }
        Ok(matches)
    }

    fn working_dir(&self) -> Result<PathBuf> {
        std::env::current_dir().map_err(|e| CoreError::io(".", &e))
    }
}

/// In-memory filesystem for testing
///
/// Paths are stored as given; relative paths are resolved against the
/// configured working directory when inserted.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    files: BTreeMap<PathBuf, Vec<u8>>,
    working_dir: PathBuf,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemoryFileSystem {
    /// Create an empty filesystem with the given working directory
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            files: BTreeMap::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Add a text file
    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Self {
        let path = self.abs_path(path.as_ref(), &self.working_dir.clone());
        self.files.insert(path, content.into());
        self
    }

    /// Add multiple files at once
    pub fn with_files<'a>(self, files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        files
            .into_iter()
            .fold(self, |fs, (path, content)| fs.with_file(path, content))
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| CoreError::FileAccess {
                path: path.display().to_string(),
                message: "file not found".to_string(),
            })
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize_path(path))
    }

    fn directory_exists(&self, path: &Path) -> bool {
        let dir = normalize_path(path);
        self.files
            .keys()
            .any(|file| file != &dir && file.starts_with(&dir))
    }

    fn glob(&self, pattern: &Path) -> Result<Vec<PathBuf>> {
        let pattern_str = pattern.to_string_lossy();
        let compiled = glob::Pattern::new(&pattern_str).map_err(|e| CoreError::GlobPattern {
            pattern: pattern_str.to_string(),
            message: e.to_string(),
        })?;
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..Default::default()
        };

        Ok(self
            .files
            .keys()
            .filter(|path| compiled.matches_path_with(path, options))
            .cloned()
            .collect())
    }

    fn working_dir(&self) -> Result<PathBuf> {
        Ok(self.working_dir.clone())
    }
}
