//! Path → parsed tree cache keyed by modification time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::parser::{parse_file_with_errors, SyntaxError};
use crate::syntax::ast::File;

/// One cached file: its parse tree plus whatever diagnostics the tolerant
/// parser recorded while producing it.
#[derive(Debug)]
pub struct FileEntry {
    pub mtime: i64,
    pub file: Arc<File>,
    pub errors: Vec<SyntaxError>,
}

/// Concurrency discipline: the map lock is held only for lookups and
/// inserts; parsing happens outside it and entries are cloned out as `Arc`s.
#[derive(Default)]
pub struct FileCache {
    entries: Mutex<FxHashMap<PathBuf, Arc<FileEntry>>>,
}

impl FileCache {
    pub fn new() -> FileCache {
        FileCache::default()
    }

    /// Returns the cached tree if the file's mtime is unchanged, reparsing
    /// otherwise. `None` means the file could not be read at all.
    pub fn get(&self, path: &Path) -> Option<Arc<FileEntry>> {
        let mtime = file_mtime(path)?;
        if let Some(entry) = self.entries.lock().get(path) {
            if entry.mtime == mtime {
                return Some(entry.clone());
            }
        }
        let source = fs::read_to_string(path).ok()?;
        Some(self.force(path, &source, mtime))
    }

    /// Unconditionally reparses from the given source, bypassing the stat.
    pub fn force(&self, path: &Path, source: &str, mtime: i64) -> Arc<FileEntry> {
        let (file, errors) = parse_file_with_errors(source);
        if !errors.is_empty() {
            warn!(path = %path.display(), count = errors.len(), "parse diagnostics");
        }
        debug!(path = %path.display(), mtime, "file reparsed");
        let entry = Arc::new(FileEntry {
            mtime,
            file: Arc::new(file),
            errors,
        });
        self.entries
            .lock()
            .insert(path.to_path_buf(), entry.clone());
        entry
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Modification time in nanoseconds since the epoch; `None` when the file
/// cannot be stat'ed.
pub fn file_mtime(path: &Path) -> Option<i64> {
    let meta = fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    let dur = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(dur.as_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn caches_by_mtime_and_reparses_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.go");
        fs::write(&path, "package lib\nfunc A() {}\n").unwrap();

        let cache = FileCache::new();
        let first = cache.get(&path).unwrap();
        let second = cache.get(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.file.package.as_deref(), Some("lib"));

        // Rewrite with a guaranteed-different mtime via `force`.
        let third = cache.force(&path, "package lib\nfunc B() {}\n", first.mtime + 1);
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn broken_source_still_yields_a_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.go");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "package broken").unwrap();
        writeln!(f, "func Good() {{}}").unwrap();
        writeln!(f, "@#$garbage").unwrap();
        drop(f);

        let cache = FileCache::new();
        let entry = cache.get(&path).unwrap();
        assert!(!entry.errors.is_empty());
        assert!(entry
            .file
            .decls
            .iter()
            .any(|d| matches!(d, crate::syntax::ast::Decl::Func(f) if f.name == "Good")));
    }

    #[test]
    fn missing_file_is_none() {
        let cache = FileCache::new();
        assert!(cache.get(Path::new("/no/such/file.go")).is_none());
    }
}
