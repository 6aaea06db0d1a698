//! File mapping table: file identity → backing channel, page size, refcount,
//! translation table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::channel::Channel;
use crate::error::{CacheError, Result};
use crate::translation::TranslationTable;

/// One file's participation in the cache.
///
/// Equality of mappings is by file identity (the canonicalized path), which
/// is also this struct's `HashMap` key in [`MappingTable`] — there is
/// deliberately no `PartialEq` impl on `Mapping` itself, since two live
/// `Arc<Mapping>` handles for the same file are always the same `Arc`
/// (`map` increments the refcount of the existing one rather than creating
/// a second `Mapping`).
pub(crate) struct Mapping {
    pub(crate) identity: PathBuf,
    pub(crate) file_page_size: usize,
    refcount: AtomicUsize,
    open_cursors: AtomicUsize,
    pub(crate) translation: TranslationTable,
    /// Exclusive upper bound on known file-page indices (the high-water mark).
    page_count: AtomicU64,
    closed: AtomicBool,
    channel: Mutex<Box<dyn Channel>>,
}

impl Mapping {
    pub(crate) fn new(
        identity: PathBuf,
        file_page_size: usize,
        channel: Box<dyn Channel>,
        initial_page_count: u64,
    ) -> Self {
        Self {
            identity,
            file_page_size,
            refcount: AtomicUsize::new(1),
            open_cursors: AtomicUsize::new(0),
            translation: TranslationTable::new(),
            page_count: AtomicU64::new(initial_page_count),
            closed: AtomicBool::new(false),
            channel: Mutex::new(channel),
        }
    }

    pub(crate) fn page_count(&self) -> u64 {
        self.page_count.load(Ordering::Acquire)
    }

    /// Raises the high-water mark to at least `at_least`, e.g. after an
    /// exclusive cursor extends the file.
    pub(crate) fn grow_to(&self, at_least: u64) {
        self.page_count.fetch_max(at_least, Ordering::AcqRel);
    }

    pub(crate) fn incref(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the refcount, returning the count after the decrement.
    pub(crate) fn decref(&self) -> usize {
        self.refcount.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// Registers an open cursor against this mapping, failing if the
    /// mapping has already been closed out from under it.
    pub(crate) fn register_cursor(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CacheError::IllegalState(format!(
                "mapping for {} is closed",
                self.identity.display()
            )));
        }
        self.open_cursors.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub(crate) fn release_cursor(&self) {
        self.open_cursors.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn open_cursor_count(&self) -> usize {
        self.open_cursors.load(Ordering::Acquire)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn with_channel<R>(&self, f: impl FnOnce(&mut dyn Channel) -> R) -> R {
        let mut guard = self.channel.lock();
        f(guard.as_mut())
    }
}

/// Maps file identity to an open [`Mapping`], the file mapping table of §4.B.
#[derive(Default)]
pub(crate) struct MappingTable {
    mappings: RwLock<HashMap<PathBuf, Arc<Mapping>>>,
}

impl MappingTable {
    pub(crate) fn new() -> Self {
        Self {
            mappings: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, identity: &Path) -> Option<Arc<Mapping>> {
        self.mappings.read().get(identity).cloned()
    }

    pub(crate) fn insert(&self, identity: PathBuf, mapping: Arc<Mapping>) {
        self.mappings.write().insert(identity, mapping);
    }

    pub(crate) fn remove(&self, identity: &Path) -> Option<Arc<Mapping>> {
        self.mappings.write().remove(identity)
    }

    pub(crate) fn all(&self) -> Vec<Arc<Mapping>> {
        self.mappings.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{FileChannel, OpenMode};
    use tempfile::TempDir;

    fn test_mapping(dir: &TempDir, name: &str) -> Mapping {
        let path = dir.path().join(name);
        let channel = FileChannel::open(&path, OpenMode::ReadWrite).unwrap();
        Mapping::new(path, 16, Box::new(channel), 0)
    }

    #[test]
    fn refcount_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mapping = test_mapping(&dir, "a.db");
        assert_eq!(mapping.refcount(), 1);
        mapping.incref();
        assert_eq!(mapping.refcount(), 2);
        assert_eq!(mapping.decref(), 1);
        assert_eq!(mapping.decref(), 0);
    }

    #[test]
    fn cursor_registration_rejected_once_closed() {
        let dir = TempDir::new().unwrap();
        let mapping = test_mapping(&dir, "a.db");
        mapping.register_cursor().unwrap();
        assert_eq!(mapping.open_cursor_count(), 1);
        mapping.release_cursor();
        assert_eq!(mapping.open_cursor_count(), 0);

        mapping.mark_closed();
        assert!(mapping.register_cursor().is_err());
    }

    #[test]
    fn grow_to_only_moves_forward() {
        let dir = TempDir::new().unwrap();
        let mapping = test_mapping(&dir, "a.db");
        mapping.grow_to(5);
        assert_eq!(mapping.page_count(), 5);
        mapping.grow_to(2);
        assert_eq!(mapping.page_count(), 5);
        mapping.grow_to(9);
        assert_eq!(mapping.page_count(), 9);
    }

    #[test]
    fn table_insert_get_remove() {
        let dir = TempDir::new().unwrap();
        let table = MappingTable::new();
        let mapping = Arc::new(test_mapping(&dir, "a.db"));
        table.insert(mapping.identity.clone(), mapping.clone());
        assert!(table.get(&mapping.identity).is_some());
        assert!(table.remove(&mapping.identity).is_some());
        assert!(table.get(&mapping.identity).is_none());
    }
}
