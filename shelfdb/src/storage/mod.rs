use crate::document::Document;
use crate::error::{Result, ShelfDbError};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use tempfile::NamedTempFile;

/// The on-disk JSON array backing one collection.
///
/// Reads parse the whole file; writes replace the whole file by writing a
/// sibling temp file and renaming it over the target, so a failed write never
/// leaves a truncated collection behind.
///
/// Every `CollectionFile` for the same path shares one in-process mutex (see
/// [`CollectionFile::lock`]). Nothing guards against other processes writing
/// the same file.
#[derive(Debug, Clone)]
pub struct CollectionFile {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl CollectionFile {
    /// Open the file at `path`, creating it as an empty array if it is absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_exists(&path)?;
        let path = path.canonicalize()?;
        let lock = path_lock(&path);
        Ok(CollectionFile { path, lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recreate the file as an empty array if it has gone missing.
    pub fn ensure_exists(&self) -> Result<()> {
        ensure_exists(&self.path)
    }

    /// Exclusive access to this path for the calling thread. Held across a
    /// read-modify-write cycle to keep it atomic within the process.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        // The mutex guards no data, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Parse the entire file.
    pub fn read_all(&self) -> Result<Vec<Document>> {
        let content = std::fs::read(&self.path)?;
        let parsed: Value =
            serde_json::from_slice(&content).map_err(|e| self.corrupt(e.to_string()))?;

        let items = match parsed {
            Value::Array(items) => items,
            other => {
                return Err(self.corrupt(format!(
                    "expected an array of documents, found {}",
                    crate::document::type_name(&other)
                )))
            }
        };

        let mut docs = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(doc) => docs.push(doc),
                other => {
                    return Err(self.corrupt(format!(
                        "element {index} is {}, not an object",
                        crate::document::type_name(&other)
                    )))
                }
            }
        }

        log::debug!("read {} documents from {}", docs.len(), self.path.display());
        Ok(docs)
    }

    /// Replace the entire file with `docs`.
    pub fn write_all(&self, docs: &[Document]) -> Result<()> {
        write_atomic(&self.path, docs)?;
        log::debug!("wrote {} documents to {}", docs.len(), self.path.display());
        Ok(())
    }

    fn corrupt(&self, reason: String) -> ShelfDbError {
        ShelfDbError::CorruptStore {
            path: self.path.clone(),
            reason,
        }
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = staged(path, &[])?;
    // Another handle may have created the file since the check above.
    match tmp.persist_noclobber(path) {
        Ok(_) => {
            log::info!("created empty collection file {}", path.display());
            sync_dir(parent_dir(path))
        }
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, docs: &[Document]) -> Result<()> {
    staged(path, docs)?.persist(path)?;
    sync_dir(parent_dir(path))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Flush the directory entry after a rename so the new file survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    std::fs::File::open(dir)?.sync_all()?;
    Ok(())
}

// Directories cannot be opened as files here; the rename is left to the OS.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Serialize `docs` into a synced temp file next to `path`.
fn staged(path: &Path, docs: &[Document]) -> Result<NamedTempFile> {
    let tmp = NamedTempFile::new_in(parent_dir(path))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, docs)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

type LockRegistry = Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>;

/// Paths currently held open in this process. Entries whose last
/// `CollectionFile` has been dropped are pruned on the next lookup.
fn registry() -> MutexGuard<'static, HashMap<PathBuf, Weak<Mutex<()>>>> {
    static LOCKS: OnceLock<LockRegistry> = OnceLock::new();
    LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The process-wide mutex for a canonical collection path.
fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    let mut locks = registry();
    locks.retain(|_, lock| lock.strong_count() > 0);
    if let Some(lock) = locks.get(path).and_then(Weak::upgrade) {
        return lock;
    }
    let lock = Arc::new(Mutex::new(()));
    locks.insert(path.to_path_buf(), Arc::downgrade(&lock));
    lock
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        crate::document::into_document(value).unwrap()
    }

    #[test]
    fn test_open_creates_empty_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/users.json");
        let file = CollectionFile::open(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
        assert!(file.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_ensure_exists_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("users.json");
        let file = CollectionFile::open(&path).unwrap();
        file.write_all(&[doc(json!({"id": "1"}))]).unwrap();

        file.ensure_exists().unwrap();
        CollectionFile::open(&path).unwrap();
        assert_eq!(file.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_write_then_read_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let file = CollectionFile::open(tmp.path().join("c.json")).unwrap();
        let docs = vec![
            doc(json!({"z": 1, "a": 2, "id": "first"})),
            doc(json!({"id": "second"})),
        ];
        file.write_all(&docs).unwrap();

        let back = file.read_all().unwrap();
        assert_eq!(back, docs);
        let keys: Vec<&String> = back[0].keys().collect();
        assert_eq!(keys, vec!["z", "a", "id"]);
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let file = CollectionFile::open(tmp.path().join("c.json")).unwrap();
        for i in 0..5 {
            file.write_all(&[doc(json!({"n": i}))]).unwrap();
        }
        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_corrupt_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("c.json");
        let file = CollectionFile::open(&path).unwrap();

        let cases: [&[u8]; 5] = [
            b"{not json",
            b"{\"a\": 1}",
            b"[1, 2]",
            b"",
            b"[{\"a\": \"\xff\xfe\"}]",
        ];
        for content in cases {
            std::fs::write(&path, content).unwrap();
            assert!(
                matches!(file.read_all(), Err(ShelfDbError::CorruptStore { .. })),
                "content {content:?} should be reported as corrupt"
            );
        }
    }

    #[test]
    fn test_same_path_shares_lock() {
        let tmp = TempDir::new().unwrap();
        let a = CollectionFile::open(tmp.path().join("c.json")).unwrap();
        let b = CollectionFile::open(tmp.path().join("./c.json")).unwrap();
        assert!(Arc::ptr_eq(&a.lock, &b.lock));

        let _guard = a.lock();
        assert!(b.lock.try_lock().is_err());
    }

    #[test]
    fn test_lock_released_with_last_handle() {
        let tmp = TempDir::new().unwrap();
        let file = CollectionFile::open(tmp.path().join("c.json")).unwrap();
        let path = file.path().to_path_buf();
        let weak = Arc::downgrade(&file.lock);
        assert!(registry().contains_key(&path));

        drop(file);
        assert!(weak.upgrade().is_none());

        // Reopening after the drop prunes the stale entry and starts a new lock.
        let reopened = CollectionFile::open(&path).unwrap();
        assert!(Arc::ptr_eq(&path_lock(&path), &reopened.lock));
        drop(reopened);
        path_lock(tmp.path());
        assert!(!registry().contains_key(&path));
    }
}
