//! In-memory page buffers and their metadata.
//!
//! A [`Frame`] is a cache-page-sized buffer plus the bookkeeping needed to
//! answer "can this be evicted" and "did a concurrent writer overlap my
//! read": a pin count, a dirty bit, the (mapping, file-page index) it
//! currently holds, and a seqlock-style version counter.
//!
//! The version counter is the frame-level seqlock behind [`crate::Cursor::retry`]:
//! [`Frame::begin_exclusive_mutation`] and [`Frame::end_exclusive_mutation`]
//! bracket every write window, incrementing the counter once each, so a
//! reader that samples the version before and after its own read window can
//! tell whether a write started (or finished) inside that window. This
//! generalizes the teacher's `PageState` bit-packed atomic (which bumps a
//! version once per lock *acquisition*) into a true start/end bracket, since
//! torn-read detection needs to know a write both began and ended cleanly
//! around the reader's window, not merely that a lock was taken at some
//! point.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::mapping::Mapping;

/// Identifies the (mapping, file-page index) a frame is bound to.
#[derive(Clone)]
pub(crate) struct FrameBinding {
    pub(crate) mapping: Arc<Mapping>,
    pub(crate) page_index: u64,
}

/// A single cache-page-sized buffer plus its pool metadata.
///
/// # Safety
///
/// `data` is an [`UnsafeCell`] rather than a lock because the whole point of
/// the seqlock protocol is that shared readers never block on a writer.
/// Callers must follow the frame's locking discipline:
/// - A pin (any cursor) must be held for the duration of any access to `data`.
/// - A writer must hold the frame's `write_lock` (see
///   [`Frame::acquire_exclusive`]/[`Frame::release_exclusive`]) for the
///   whole bound lifetime of its exclusive cursor, and must bracket each
///   mutation with [`Frame::begin_exclusive_mutation`]/[`Frame::end_exclusive_mutation`].
/// - A reader without the write lock must treat its bytes as possibly torn
///   until it has confirmed the version did not change across the read
///   (see [`crate::Cursor::retry`]), and must never mutate `data`.
pub struct Frame {
    pub(crate) index: usize,
    version: AtomicU64,
    pin_count: AtomicU32,
    dirty: AtomicBool,
    poisoned: AtomicBool,
    binding: Mutex<Option<FrameBinding>>,
    write_lock: Mutex<()>,
    data: UnsafeCell<Box<[u8]>>,
}

// SAFETY: all access to `data` is gated by the pin/write-lock/version
// discipline documented on the struct, not by the Rust type system directly.
unsafe impl Sync for Frame {}

impl Frame {
    pub(crate) fn new(index: usize, cache_page_size: usize) -> Self {
        Self {
            index,
            version: AtomicU64::new(0),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
            binding: Mutex::new(None),
            write_lock: Mutex::new(()),
            data: UnsafeCell::new(vec![0u8; cache_page_size].into_boxed_slice()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        // SAFETY: length never changes after construction; no synchronization needed.
        unsafe { (*self.data.get()).len() }
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// A version with the write-in-progress bit set always looks "changed"
    /// to a reader, matching the classic seqlock odd/even convention.
    pub(crate) fn is_write_in_progress(version: u64) -> bool {
        version % 2 == 1
    }

    pub(crate) fn begin_exclusive_mutation(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_exclusive_mutation(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn unpin(&self) -> u32 {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin of a frame with zero pins");
        prev - 1
    }

    pub(crate) fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    pub(crate) fn mark_poisoned(&self) {
        self.poisoned.store(true, Ordering::Release);
    }

    pub(crate) fn clear_poisoned(&self) {
        self.poisoned.store(false, Ordering::Release);
    }

    pub(crate) fn binding(&self) -> Option<FrameBinding> {
        self.binding.lock().clone()
    }

    pub(crate) fn bind(&self, mapping: Arc<Mapping>, page_index: u64) {
        *self.binding.lock() = Some(FrameBinding {
            mapping,
            page_index,
        });
    }

    pub(crate) fn unbind(&self) -> Option<FrameBinding> {
        self.binding.lock().take()
    }

    /// Can this frame be handed out as an eviction victim right now?
    pub(crate) fn is_evictable(&self) -> bool {
        self.pin_count() == 0 && !self.is_poisoned()
    }

    /// Acquires the per-frame exclusive gate, blocking until any other
    /// exclusive cursor on this frame releases it. Held for the bound
    /// lifetime of an exclusive cursor, not just a single write call, so it
    /// cannot be represented as an ordinary RAII guard on [`Frame`] (which
    /// is reused across many cursor lifetimes); see [`Frame::release_exclusive`].
    pub(crate) fn acquire_exclusive(&self) {
        let guard = self.write_lock.lock();
        std::mem::forget(guard);
    }

    /// Releases the gate acquired by [`Frame::acquire_exclusive`].
    ///
    /// # Safety
    ///
    /// Must be called exactly once per successful `acquire_exclusive`, by
    /// the same logical owner (the cursor that acquired it). `parking_lot`
    /// exposes `force_unlock` precisely for this "hold across a scope that
    /// isn't a lexical block" pattern.
    pub(crate) fn release_exclusive(&self) {
        unsafe {
            self.write_lock.force_unlock();
        }
    }

    /// Copies `len` bytes starting at `offset` into `out`. Caller must hold
    /// a pin on this frame.
    pub(crate) fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        // SAFETY: caller holds a pin, so the frame cannot be reused or
        // freed out from under this read; torn-read detection is the
        // caller's responsibility via the version protocol, not this call.
        unsafe {
            let data = &*self.data.get();
            out.copy_from_slice(&data[offset..offset + out.len()]);
        }
    }

    /// Overwrites `len` bytes starting at `offset` with `src`. Caller must
    /// hold the write lock (see [`Frame::acquire_exclusive`]) and must have
    /// called [`Frame::begin_exclusive_mutation`] first.
    pub(crate) fn write_bytes(&self, offset: usize, src: &[u8]) {
        // SAFETY: caller holds the exclusive write lock for this frame, so
        // no other writer can be mutating `data` concurrently; concurrent
        // readers may observe a torn view, which is exactly what the
        // version bracket around this call is for.
        unsafe {
            let data = &mut *self.data.get();
            data[offset..offset + src.len()].copy_from_slice(src);
        }
    }

    /// Replaces the whole buffer with freshly loaded page bytes. Only
    /// called by the fault engine while the frame is privately owned (not
    /// yet visible through the translation table), so no pin/lock
    /// discipline is required here.
    pub(crate) fn load_contents(&self, bytes: &[u8]) {
        // SAFETY: the fault engine holds exclusive, un-shared ownership of
        // this frame at this point (it has not yet been published to the
        // translation table), so no concurrent access is possible.
        unsafe {
            let data = &mut *self.data.get();
            data[..bytes.len()].copy_from_slice(bytes);
            for b in &mut data[bytes.len()..] {
                *b = 0;
            }
        }
    }
}
