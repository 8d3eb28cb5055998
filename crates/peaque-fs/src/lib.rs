//! File-system abstraction for the Peaque framework.
//!
//! Every component that touches disk accepts a [`FileSystem`] so tests can
//! pin it to the in-memory backend. The two implementations are byte-exact
//! for all operations the framework uses, including recursive copies and
//! sorted directory listings.

mod memory;
mod path;
mod real;

pub use memory::MemoryFileSystem;
pub use path::{join_normalized, normalize_path};
pub use real::RealFileSystem;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Errors surfaced by file-system operations.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("is a directory: {0}")]
    IsADirectory(PathBuf),

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(PathBuf),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FsError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error means the target simply does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound(_) => true,
            FsError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// Metadata subset the framework cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
    pub is_file: bool,
    pub len: u64,
    pub modified: SystemTime,
}

/// One directory entry from [`FileSystem::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File or directory name, no path components.
    pub name: String,
    pub is_dir: bool,
}

/// Uniform view of a file tree.
///
/// Paths are accepted in host form; implementations normalize `.` segments
/// and backslashes to forward slashes internally. Listings are returned in
/// stable sorted order by name.
pub trait FileSystem: Send + Sync {
    fn read(&self, path: &Path) -> FsResult<Vec<u8>>;

    fn read_to_string(&self, path: &Path) -> FsResult<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| FsError::InvalidUtf8(path.to_path_buf()))
    }

    /// Write a file, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> FsResult<()>;

    fn list_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    fn stat(&self, path: &Path) -> FsResult<FileStat>;

    fn mkdir_all(&self, path: &Path) -> FsResult<()>;

    fn remove_file(&self, path: &Path) -> FsResult<()>;

    /// Copy a file or directory tree. Destination parents are created.
    fn copy_recursive(&self, from: &Path, to: &Path) -> FsResult<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Set access and modification times on an existing file.
    fn set_file_times(&self, path: &Path, accessed: SystemTime, modified: SystemTime)
        -> FsResult<()>;

    fn is_file(&self, path: &Path) -> bool {
        self.stat(path).map(|s| s.is_file).unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.stat(path).map(|s| s.is_dir).unwrap_or(false)
    }
}

/// Walk a directory tree, yielding every file path in sorted order.
///
/// Shared helper used by the production builder (compression pass, public
/// copy) and the tests. Missing roots yield an empty list.
pub fn walk_files(fs: &dyn FileSystem, root: &Path) -> FsResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !fs.is_dir(root) {
        return Ok(out);
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        // Depth-first, but keep sibling order stable by pushing in reverse.
        let entries = fs.list_dir(&dir)?;
        let mut dirs = Vec::new();
        for entry in entries {
            let child = dir.join(&entry.name);
            if entry.is_dir {
                dirs.push(child);
            } else {
                out.push(child);
            }
        }
        for d in dirs.into_iter().rev() {
            stack.push(d);
        }
    }
    out.sort();
    Ok(out)
}
