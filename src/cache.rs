//! The top-level cache: mapping lifecycle, flush, and close orchestration.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::cursor::{Cursor, Flags};
use crate::error::{CacheError, Result};
use crate::fault;
use crate::mapping::{Mapping, MappingTable};
use crate::monitor::{Monitor, NullMonitor};
use crate::pool::FramePool;
use crate::channel::{FileChannel, OpenMode};

/// Shared state behind every [`Cache`], [`PagedFile`], and [`Cursor`] handle
/// for one cache instance.
pub(crate) struct CacheInner {
    pub(crate) pool: FramePool,
    pub(crate) config: CacheConfig,
    mappings: MappingTable,
    monitor: Box<dyn Monitor>,
    /// Serializes the whole lookup-or-fault-and-rebind critical section so
    /// concurrent faults can never race a frame's translation entry against
    /// its rebinding. See the module docs on `fault::resolve`.
    fault_lock: Mutex<()>,
    closed: AtomicBool,
}

impl CacheInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn resolve_page(
        &self,
        mapping: &Arc<Mapping>,
        page_index: u64,
        no_fault: bool,
        may_extend: bool,
    ) -> Result<Option<usize>> {
        if self.is_closed() {
            return Err(CacheError::IllegalState("cache is closed".into()));
        }
        let _guard = self.fault_lock.lock();
        fault::resolve(
            &self.pool,
            mapping,
            page_index,
            self.config.cache_page_size,
            no_fault,
            may_extend,
            self.monitor.as_ref(),
        )
    }

    fn flush_mapping(&self, mapping: &Mapping) -> Result<()> {
        debug!("flushing {}", mapping.identity.display());
        self.monitor.on_flush_start(&mapping.identity);
        let cache_page_size = self.config.cache_page_size;
        let mut errors = Vec::new();
        let mut written = 0usize;

        for (page_index, frame_idx) in mapping.translation.bound_frames() {
            let frame = self.pool.frame(frame_idx);
            if !frame.is_dirty() && !frame.is_poisoned() {
                continue;
            }
            let mut contents = vec![0u8; cache_page_size];
            frame.read_bytes(0, &mut contents);
            match crate::io_adapter::write_page(mapping, page_index, &contents) {
                Ok(()) => {
                    frame.set_dirty(false);
                    frame.clear_poisoned();
                    self.monitor.on_page_out(&mapping.identity, page_index);
                    written += 1;
                }
                Err(e) => {
                    warn!(
                        "flush of {} page {} failed: {e}",
                        mapping.identity.display(), page_index
                    );
                    frame.mark_poisoned();
                    errors.push(e);
                }
            }
        }

        debug!("flushed {} page(s) of {}", written, mapping.identity.display());

        if let Err(e) = mapping.with_channel(|c| c.force(true)) {
            warn!("force of {} failed: {e}", mapping.identity.display());
            errors.push(CacheError::io(mapping.identity.clone(), e));
        }

        self.monitor.on_flush_end(&mapping.identity);
        aggregate(errors)
    }
}

fn aggregate(mut errors: Vec<CacheError>) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let first = errors.remove(0);
    if errors.is_empty() {
        Err(first)
    } else {
        Err(CacheError::Aggregate {
            first: Box::new(first),
            additional_failures: errors.len(),
        })
    }
}

/// A fixed-capacity, shared buffer pool mediating access to any number of
/// mapped files.
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    /// Creates a cache with no monitor attached.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_monitor(config, Box::new(NullMonitor))
    }

    /// Creates a cache that reports activity to `monitor`.
    #[must_use]
    pub fn with_monitor(config: CacheConfig, monitor: Box<dyn Monitor>) -> Self {
        let pool = FramePool::new(
            config.max_pages,
            config.cache_page_size,
            config.max_victim_search_attempts,
        );
        Self {
            inner: Arc::new(CacheInner {
                pool,
                config,
                mappings: MappingTable::new(),
                monitor,
                fault_lock: Mutex::new(()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Maps `path` for paged access with the given per-file page size.
    ///
    /// Remapping an already-mapped path with the same page size increments
    /// its reference count and returns a new handle to the same mapping;
    /// remapping it with a different page size is an error.
    pub fn map(&self, path: impl AsRef<Path>, file_page_size: usize) -> Result<PagedFile> {
        if self.inner.is_closed() {
            return Err(CacheError::IllegalState("cache is closed".into()));
        }
        if file_page_size == 0 || file_page_size > self.inner.config.cache_page_size {
            return Err(CacheError::Argument(format!(
                "file page size {file_page_size} must be in 1..={}",
                self.inner.config.cache_page_size
            )));
        }
        let path = path.as_ref().to_path_buf();

        if let Some(existing) = self.inner.mappings.get(&path) {
            if existing.is_closed() {
                return Err(CacheError::IllegalState(format!(
                    "mapping for {} is closed",
                    path.display()
                )));
            }
            if existing.file_page_size != file_page_size {
                return Err(CacheError::Argument(format!(
                    "{} is already mapped with page size {}, not {file_page_size}",
                    path.display(),
                    existing.file_page_size
                )));
            }
            existing.incref();
            return Ok(PagedFile {
                inner: self.inner.clone(),
                mapping: existing,
            });
        }

        let mut channel = FileChannel::open(&path, OpenMode::ReadWrite)
            .map_err(|e| CacheError::io(path.clone(), e))?;
        let size = channel
            .size()
            .map_err(|e| CacheError::io(path.clone(), e))?;
        let initial_page_count = size.div_ceil(file_page_size as u64);

        let mapping = Arc::new(Mapping::new(
            path.clone(),
            file_page_size,
            Box::new(channel),
            initial_page_count,
        ));
        self.inner.mappings.insert(path, mapping.clone());
        Ok(PagedFile {
            inner: self.inner.clone(),
            mapping,
        })
    }

    /// Decrements `path`'s reference count, flushing and fully closing it at
    /// zero. Fails if any cursor on this mapping is still open.
    pub fn unmap(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.inner.is_closed() {
            return Err(CacheError::IllegalState("cache is closed".into()));
        }
        let path = path.as_ref();
        let mapping = self
            .inner
            .mappings
            .get(path)
            .ok_or_else(|| CacheError::Argument(format!("{} is not mapped", path.display())))?;

        if mapping.open_cursor_count() > 0 {
            return Err(CacheError::IllegalState(format!(
                "{} still has open cursors",
                path.display()
            )));
        }

        if mapping.decref() > 0 {
            return Ok(());
        }

        let result = self.inner.flush_mapping(&mapping);
        mapping.mark_closed();
        self.inner.mappings.remove(path);
        result
    }

    /// Flushes every dirty page of every currently mapped file.
    pub fn flush(&self) -> Result<()> {
        if self.inner.is_closed() {
            return Err(CacheError::IllegalState("cache is closed".into()));
        }
        let errors: Vec<_> = self
            .inner
            .mappings
            .all()
            .iter()
            .filter_map(|m| self.inner.flush_mapping(m).err())
            .collect();
        aggregate(errors)
    }

    /// Flushes and closes every remaining mapping, then marks the cache
    /// closed. Best-effort: a failure on one mapping does not stop the
    /// others from being attempted. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("closing cache with {} mapping(s) still open", self.inner.mappings.all().len());
        let mappings = self.inner.mappings.all();
        let errors: Vec<_> = mappings
            .iter()
            .filter_map(|m| {
                let result = self.inner.flush_mapping(m).err();
                m.mark_closed();
                result
            })
            .collect();
        for mapping in &mappings {
            self.inner.mappings.remove(&mapping.identity);
        }
        aggregate(errors)
    }
}

/// A handle to one mapped file, returned by [`Cache::map`].
pub struct PagedFile {
    inner: Arc<CacheInner>,
    mapping: Arc<Mapping>,
}

impl PagedFile {
    /// Opens a cursor positioned at `start_page_index`.
    pub fn io(&self, start_page_index: u64, flags: Flags) -> Result<Cursor> {
        Cursor::new(self.inner.clone(), self.mapping.clone(), start_page_index, flags)
    }

    /// Flushes every dirty page of just this mapping.
    pub fn flush(&self) -> Result<()> {
        if self.inner.is_closed() {
            return Err(CacheError::IllegalState("cache is closed".into()));
        }
        self.inner.flush_mapping(&self.mapping)
    }

    /// The file's page size within this cache, as given to [`Cache::map`].
    pub fn file_page_size(&self) -> usize {
        self.mapping.file_page_size
    }

    /// Number of pages known to exist in the file (the high-water mark).
    pub fn page_count(&self) -> u64 {
        self.mapping.page_count()
    }
}

impl Drop for PagedFile {
    fn drop(&mut self) {
        self.mapping.decref();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::cursor::Flags;
    use tempfile::TempDir;

    fn cache(max_pages: usize) -> Cache {
        Cache::new(CacheConfig::new(8, max_pages))
    }

    #[test]
    fn map_same_path_twice_shares_one_mapping() {
        let dir = TempDir::new().unwrap();
        let cache = cache(4);
        let path = dir.path().join("a.db");
        let first = cache.map(&path, 8).unwrap();
        let second = cache.map(&path, 8).unwrap();
        assert_eq!(first.file_page_size(), second.file_page_size());
    }

    #[test]
    fn remap_with_different_page_size_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = cache(4);
        let path = dir.path().join("a.db");
        let _first = cache.map(&path, 8).unwrap();
        assert!(cache.map(&path, 4).is_err());
    }

    #[test]
    fn page_size_larger_than_cache_page_size_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = cache(4);
        assert!(cache.map(dir.path().join("a.db"), 9).is_err());
    }

    #[test]
    fn unmap_with_open_cursor_fails() {
        let dir = TempDir::new().unwrap();
        let cache = cache(4);
        let path = dir.path().join("a.db");
        let file = cache.map(&path, 8).unwrap();
        let _cursor = file.io(0, Flags::SHARED_LOCK).unwrap();
        assert!(cache.unmap(&path).is_err());
    }

    #[test]
    fn unmap_flushes_dirty_pages_to_disk() {
        let dir = TempDir::new().unwrap();
        let cache = cache(4);
        let path = dir.path().join("a.db");
        let file = cache.map(&path, 8).unwrap();
        {
            let mut cursor = file.io(0, Flags::EXCLUSIVE_LOCK).unwrap();
            cursor.next().unwrap();
            cursor.put_bytes(b"ABCDEFGH").unwrap();
        }
        drop(file);
        cache.unmap(&path).unwrap();

        let mut raw = FileChannel::open(&path, OpenMode::Read).unwrap();
        let mut buf = [0u8; 8];
        raw.read(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"ABCDEFGH");
    }

    #[test]
    fn close_is_idempotent_and_rejects_further_use() {
        let dir = TempDir::new().unwrap();
        let cache = cache(4);
        let path = dir.path().join("a.db");
        let _file = cache.map(&path, 8).unwrap();
        cache.close().unwrap();
        cache.close().unwrap();
        assert!(cache.map(dir.path().join("b.db"), 8).is_err());
    }

    #[test]
    fn close_flushes_dirty_pages_even_with_open_cursors() {
        let dir = TempDir::new().unwrap();
        let cache = cache(4);
        let path = dir.path().join("a.db");
        let file = cache.map(&path, 8).unwrap();
        let mut cursor = file.io(0, Flags::EXCLUSIVE_LOCK).unwrap();
        cursor.next().unwrap();
        cursor.put_bytes(b"ABCDEFGH").unwrap();

        cache.close().unwrap();

        let mut raw = FileChannel::open(&path, OpenMode::Read).unwrap();
        let mut buf = [0u8; 8];
        raw.read(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"ABCDEFGH");
    }

    #[test]
    fn trailing_partial_page_is_addressable_and_zero_padded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.db");
        {
            let mut raw = FileChannel::open(&path, OpenMode::ReadWrite).unwrap();
            raw.write_all(&[1u8; 10], 0).unwrap(); // 10 bytes over an 8-byte page size
        }

        let cache = cache(4);
        let file = cache.map(&path, 8).unwrap();
        assert_eq!(file.page_count(), 2);

        let mut cursor = file.io(1, Flags::SHARED_LOCK).unwrap();
        assert!(cursor.next().unwrap());
        let mut buf = [0xffu8; 8];
        cursor.get_bytes(&mut buf).unwrap();
        assert_eq!(&buf, &[1, 1, 0, 0, 0, 0, 0, 0]);
    }
}
