//! In-memory file system for tests and offline builds.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::path::normalize_path;
use crate::{DirEntry, FileStat, FileSystem, FsError, FsResult};

#[derive(Debug, Clone)]
struct MemFile {
    contents: Vec<u8>,
    modified: SystemTime,
}

/// Byte-exact in-memory [`FileSystem`].
///
/// Files live in a sorted map keyed by normalized path; directories exist
/// implicitly as prefixes plus an explicit set for empty ones created via
/// `mkdir_all`.
#[derive(Default)]
pub struct MemoryFileSystem {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, MemFile>,
    dirs: BTreeMap<String, ()>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor seeding text files.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<Path>,
        C: AsRef<[u8]>,
    {
        let fs = Self::new();
        for (path, contents) in files {
            fs.write(path.as_ref(), contents.as_ref())
                .expect("seeding a memory fs cannot fail");
        }
        fs
    }
}

fn key(path: &Path) -> String {
    normalize_path(path)
}

impl Inner {
    fn dir_exists(&self, k: &str) -> bool {
        if k.is_empty() || k == "/" || self.dirs.contains_key(k) {
            return true;
        }
        let prefix = format!("{k}/");
        self.files.range(prefix.clone()..).next().is_some_and(|(p, _)| p.starts_with(&prefix))
            || self.dirs.range(prefix.clone()..).next().is_some_and(|(p, _)| p.starts_with(&prefix))
    }

    fn register_parents(&mut self, k: &str) {
        let mut current = k;
        while let Some(idx) = current.rfind('/') {
            current = &current[..idx];
            if current.is_empty() {
                break;
            }
            self.dirs.insert(current.to_string(), ());
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        let k = key(path);
        let inner = self.inner.read();
        match inner.files.get(&k) {
            Some(file) => Ok(file.contents.clone()),
            None if inner.dir_exists(&k) => Err(FsError::IsADirectory(path.to_path_buf())),
            None => Err(FsError::NotFound(path.to_path_buf())),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> FsResult<()> {
        let k = key(path);
        let mut inner = self.inner.write();
        inner.register_parents(&k);
        inner.files.insert(
            k,
            MemFile {
                contents: contents.to_vec(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let k = key(path);
        let inner = self.inner.read();
        if inner.files.contains_key(&k) {
            return Err(FsError::NotADirectory(path.to_path_buf()));
        }
        if !inner.dir_exists(&k) {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        let prefix = if k.is_empty() {
            String::new()
        } else if k == "/" {
            "/".to_string()
        } else {
            format!("{k}/")
        };
        let mut out: BTreeMap<String, bool> = BTreeMap::new();
        for name in inner
            .files
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
        {
            match name.split_once('/') {
                Some((dir, _)) => out.insert(dir.to_string(), true),
                None => out.insert(name.to_string(), false),
            };
        }
        for name in inner.dirs.keys().filter_map(|p| p.strip_prefix(&prefix)) {
            let first = name.split('/').next().unwrap_or(name);
            if !first.is_empty() {
                out.entry(first.to_string()).or_insert(true);
            }
        }
        Ok(out
            .into_iter()
            .map(|(name, is_dir)| DirEntry { name, is_dir })
            .collect())
    }

    fn stat(&self, path: &Path) -> FsResult<FileStat> {
        let k = key(path);
        let inner = self.inner.read();
        if let Some(file) = inner.files.get(&k) {
            return Ok(FileStat {
                is_dir: false,
                is_file: true,
                len: file.contents.len() as u64,
                modified: file.modified,
            });
        }
        if inner.dir_exists(&k) {
            return Ok(FileStat {
                is_dir: true,
                is_file: false,
                len: 0,
                modified: SystemTime::UNIX_EPOCH,
            });
        }
        Err(FsError::NotFound(path.to_path_buf()))
    }

    fn mkdir_all(&self, path: &Path) -> FsResult<()> {
        let k = key(path);
        let mut inner = self.inner.write();
        if !k.is_empty() && k != "/" {
            inner.register_parents(&k);
            inner.dirs.insert(k, ());
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> FsResult<()> {
        let k = key(path);
        let mut inner = self.inner.write();
        inner
            .files
            .remove(&k)
            .map(|_| ())
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    fn copy_recursive(&self, from: &Path, to: &Path) -> FsResult<()> {
        let from_key = key(from);
        let to_key = key(to);
        let mut inner = self.inner.write();
        if let Some(file) = inner.files.get(&from_key).cloned() {
            inner.register_parents(&to_key);
            inner.files.insert(to_key, file);
            return Ok(());
        }
        if !inner.dir_exists(&from_key) {
            return Err(FsError::NotFound(from.to_path_buf()));
        }
        let prefix = format!("{from_key}/");
        let moved: Vec<(String, MemFile)> = inner
            .files
            .iter()
            .filter(|(p, _)| p.starts_with(&prefix))
            .map(|(p, f)| (format!("{to_key}/{}", &p[prefix.len()..]), f.clone()))
            .collect();
        inner.register_parents(&format!("{to_key}/x"));
        inner.dirs.insert(to_key, ());
        for (p, f) in moved {
            inner.register_parents(&p);
            inner.files.insert(p, f);
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let k = key(path);
        let inner = self.inner.read();
        inner.files.contains_key(&k) || inner.dir_exists(&k)
    }

    fn set_file_times(
        &self,
        path: &Path,
        _accessed: SystemTime,
        modified: SystemTime,
    ) -> FsResult<()> {
        let k = key(path);
        let mut inner = self.inner.write();
        match inner.files.get_mut(&k) {
            Some(file) => {
                file.modified = modified;
                Ok(())
            }
            None => Err(FsError::NotFound(path.to_path_buf())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn read_write_roundtrip() {
        let fs = MemoryFileSystem::new();
        fs.write(Path::new("/app/src/index.ts"), b"export {}").unwrap();
        assert_eq!(fs.read(Path::new("/app/src/index.ts")).unwrap(), b"export {}");
    }

    #[test]
    fn normalizes_windows_and_dot_segments() {
        let fs = MemoryFileSystem::new();
        fs.write(Path::new("/app\\src\\./page.tsx"), b"x").unwrap();
        assert!(fs.is_file(Path::new("/app/src/page.tsx")));
    }

    #[test]
    fn listing_is_sorted_and_marks_dirs() {
        let fs = MemoryFileSystem::with_files([
            ("/app/src/zebra.ts", "z"),
            ("/app/src/api/route.ts", "r"),
            ("/app/src/alpha.ts", "a"),
        ]);
        let entries = fs.list_dir(Path::new("/app/src")).unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry { name: "alpha.ts".into(), is_dir: false },
                DirEntry { name: "api".into(), is_dir: true },
                DirEntry { name: "zebra.ts".into(), is_dir: false },
            ]
        );
    }

    #[test]
    fn list_missing_dir_is_not_found() {
        let fs = MemoryFileSystem::new();
        let err = fs.list_dir(Path::new("/nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn mkdir_all_creates_empty_listable_dirs() {
        let fs = MemoryFileSystem::new();
        fs.mkdir_all(Path::new("/app/src/pages")).unwrap();
        assert!(fs.is_dir(Path::new("/app/src/pages")));
        assert!(fs.list_dir(Path::new("/app/src/pages")).unwrap().is_empty());
        let entries = fs.list_dir(Path::new("/app/src")).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_dir);
    }

    #[test]
    fn copy_recursive_copies_nested_tree() {
        let fs = MemoryFileSystem::with_files([
            ("/app/public/logo.svg", "svg"),
            ("/app/public/fonts/mono.woff2", "woff"),
        ]);
        fs.copy_recursive(Path::new("/app/public"), Path::new("/dist/assets-abc123de"))
            .unwrap();
        assert_eq!(fs.read(Path::new("/dist/assets-abc123de/logo.svg")).unwrap(), b"svg");
        assert_eq!(
            fs.read(Path::new("/dist/assets-abc123de/fonts/mono.woff2")).unwrap(),
            b"woff"
        );
    }

    #[test]
    fn remove_file_then_read_fails() {
        let fs = MemoryFileSystem::with_files([("/a.txt", "1")]);
        fs.remove_file(Path::new("/a.txt")).unwrap();
        assert!(fs.read(Path::new("/a.txt")).unwrap_err().is_not_found());
    }

    #[test]
    fn set_file_times_roundtrips() {
        let fs = MemoryFileSystem::with_files([("/a.txt", "1")]);
        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(42);
        fs.set_file_times(Path::new("/a.txt"), when, when).unwrap();
        assert_eq!(fs.stat(Path::new("/a.txt")).unwrap().modified, when);
    }

    #[test]
    fn walk_files_yields_sorted_paths() {
        let fs = MemoryFileSystem::with_files([
            ("/app/b/two.txt", "2"),
            ("/app/a/one.txt", "1"),
            ("/app/root.txt", "0"),
        ]);
        let files = crate::walk_files(&fs, Path::new("/app")).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/app/a/one.txt"),
                PathBuf::from("/app/b/two.txt"),
                PathBuf::from("/app/root.txt"),
            ]
        );
    }
}
