//! Host-backed file system.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use crate::{DirEntry, FileStat, FileSystem, FsError, FsResult};

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        RealFileSystem
    }
}

fn map_io(path: &Path, err: std::io::Error) -> FsError {
    if err.kind() == std::io::ErrorKind::NotFound {
        FsError::NotFound(path.to_path_buf())
    } else {
        FsError::io(path, err)
    }
}

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        fs::read(path).map_err(|e| map_io(path, e))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> FsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| map_io(parent, e))?;
        }
        fs::write(path, contents).map_err(|e| map_io(path, e))
    }

    fn list_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let meta = fs::metadata(path).map_err(|e| map_io(path, e))?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory(path.to_path_buf()));
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| map_io(path, e))? {
            let entry = entry.map_err(|e| map_io(path, e))?;
            let file_type = entry.file_type().map_err(|e| map_io(path, e))?;
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn stat(&self, path: &Path) -> FsResult<FileStat> {
        let meta = fs::metadata(path).map_err(|e| map_io(path, e))?;
        Ok(FileStat {
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            len: meta.len(),
            modified: meta.modified().map_err(|e| map_io(path, e))?,
        })
    }

    fn mkdir_all(&self, path: &Path) -> FsResult<()> {
        fs::create_dir_all(path).map_err(|e| map_io(path, e))
    }

    fn remove_file(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(path).map_err(|e| map_io(path, e))
    }

    fn copy_recursive(&self, from: &Path, to: &Path) -> FsResult<()> {
        let meta = fs::metadata(from).map_err(|e| map_io(from, e))?;
        if meta.is_file() {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| map_io(parent, e))?;
            }
            fs::copy(from, to).map_err(|e| map_io(from, e))?;
            return Ok(());
        }
        fs::create_dir_all(to).map_err(|e| map_io(to, e))?;
        for entry in self.list_dir(from)? {
            self.copy_recursive(&from.join(&entry.name), &to.join(&entry.name))?;
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn set_file_times(
        &self,
        path: &Path,
        accessed: SystemTime,
        modified: SystemTime,
    ) -> FsResult<()> {
        let file = fs::File::options()
            .write(true)
            .open(path)
            .map_err(|e| map_io(path, e))?;
        file.set_times(
            fs::FileTimes::new().set_accessed(accessed).set_modified(modified),
        )
        .map_err(|e| map_io(path, e))
    }
}
