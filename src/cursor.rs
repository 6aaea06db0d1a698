//! Cursors: pinned, positioned access to a mapping's pages.
//!
//! A cursor starts **unbound**: obtaining one via [`crate::PagedFile::io`]
//! registers it against the mapping but pins nothing and faults nothing in.
//! [`Cursor::next`] is what actually moves it onto a page, pinning exactly
//! one frame for as long as the cursor stays there. `SHARED_LOCK` cursors
//! may observe a torn read if a concurrent exclusive cursor mutates the
//! same page mid-read; [`Cursor::retry`] is how the caller finds out and
//! knows to redo the read from the start. `EXCLUSIVE_LOCK` cursors hold the
//! frame's write gate for their whole time on a page, so no other cursor
//! can be mutating it and `retry` is always `false`.

use std::ops::BitOr;
use std::sync::Arc;

use crate::error::{CacheError, Result};
use crate::frame::Frame;
use crate::mapping::Mapping;
use crate::CacheInner;

/// Sentinel page id reported by a cursor that has never been advanced, or
/// that was just [`Cursor::rewind`]-ed.
pub const UNBOUND_PAGE_ID: u64 = u64::MAX;

/// Bitmask of lock mode and fault-policy flags for [`crate::PagedFile::io`].
///
/// Exactly one of `SHARED_LOCK`/`EXCLUSIVE_LOCK` must be set; `NO_GROW` and
/// `NO_FAULT` are independent modifiers. A shared cursor behaves as though
/// `NO_GROW` were always set, whether or not the caller also passed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    /// Multiple cursors may hold this lock concurrently; reads must use
    /// [`Cursor::retry`] to detect a torn read. Implies `NO_GROW`.
    pub const SHARED_LOCK: Flags = Flags(1 << 0);
    /// At most one cursor may hold this lock on a given page at a time.
    pub const EXCLUSIVE_LOCK: Flags = Flags(1 << 1);
    /// Advancing past the mapping's current high-water mark fails instead
    /// of growing it.
    pub const NO_GROW: Flags = Flags(1 << 2);
    /// A page that isn't currently resident is never faulted in; the
    /// cursor binds to a sentinel "unbound frame" instead of blocking on I/O.
    pub const NO_FAULT: Flags = Flags(1 << 3);

    fn empty() -> Self {
        Flags(0)
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    fn is_exclusive(self) -> bool {
        self.contains(Flags::EXCLUSIVE_LOCK)
    }

    /// Effective `NO_GROW`, with the implicit rule for shared cursors applied.
    fn no_grow(self) -> bool {
        self.contains(Flags::NO_GROW) || !self.is_exclusive()
    }

    fn validate(self) -> Result<()> {
        let shared = self.contains(Flags::SHARED_LOCK);
        let exclusive = self.contains(Flags::EXCLUSIVE_LOCK);
        if shared == exclusive {
            return Err(CacheError::Argument(
                "flags must set exactly one of SHARED_LOCK or EXCLUSIVE_LOCK".into(),
            ));
        }
        Ok(())
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags::empty()
    }
}

/// A positioned, pinning handle onto one mapping's pages.
///
/// Freshly obtained from [`crate::PagedFile::io`], a cursor pins nothing;
/// [`Cursor::next`] moves it onto its configured start page.
pub struct Cursor {
    inner: Arc<CacheInner>,
    mapping: Arc<Mapping>,
    flags: Flags,
    start_page_index: u64,
    page_index: u64,
    frame_idx: Option<usize>,
    offset: usize,
    /// The offset this cursor's current read window began at — where the
    /// page was bound, or wherever [`Cursor::set_offset`] last repositioned
    /// it. [`Cursor::retry`] restores this on an unstable window, rather
    /// than hardcoding zero.
    window_start_offset: usize,
    observed_version: u64,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(
        inner: Arc<CacheInner>,
        mapping: Arc<Mapping>,
        start_page_index: u64,
        flags: Flags,
    ) -> Result<Self> {
        flags.validate()?;
        mapping.register_cursor()?;
        Ok(Self {
            inner,
            mapping,
            flags,
            start_page_index,
            page_index: UNBOUND_PAGE_ID,
            frame_idx: None,
            offset: 0,
            window_start_offset: 0,
            observed_version: 0,
            closed: false,
        })
    }

    /// Releases the currently pinned frame, if any, without touching the
    /// cursor's open-cursor registration.
    fn release_current(&mut self) {
        if let Some(idx) = self.frame_idx.take() {
            let frame = self.inner.pool.frame(idx);
            if self.flags.is_exclusive() {
                frame.release_exclusive();
            }
            if frame.unpin() == 0 {
                self.inner.pool.release_to_eviction(idx);
            }
        }
    }

    /// Attempts to move this cursor onto `target`. Returns `Ok(false)`
    /// without pinning anything if `target` is past the mapping's current
    /// high-water mark and growth isn't allowed (`NO_GROW`, or a shared
    /// cursor, which always behaves as `NO_GROW`) — the cursor becomes
    /// unbound in that case, matching a failed advance from any state.
    fn advance(&mut self, target: u64) -> Result<bool> {
        self.require_open()?;
        if self.flags.no_grow() && target >= self.mapping.page_count() {
            self.release_current();
            self.page_index = UNBOUND_PAGE_ID;
            self.offset = 0;
            self.window_start_offset = 0;
            return Ok(false);
        }

        self.release_current();
        self.offset = 0;
        self.window_start_offset = 0;

        let no_fault = self.flags.contains(Flags::NO_FAULT);
        let may_extend = self.flags.is_exclusive();
        let resolved = self
            .inner
            .resolve_page(&self.mapping, target, no_fault, may_extend)?;

        self.page_index = target;
        match resolved {
            Some(idx) => {
                if self.flags.is_exclusive() {
                    self.inner.pool.frame(idx).acquire_exclusive();
                }
                self.observed_version = self.inner.pool.frame(idx).version();
                self.frame_idx = Some(idx);
            }
            None => {
                self.frame_idx = None;
            }
        }
        Ok(true)
    }

    /// Advances to the next page index, starting from this cursor's
    /// configured start page if it is currently unbound. Returns `false`
    /// if that would move past the mapping's high-water mark under
    /// `NO_GROW` (or an implicit shared-cursor `NO_GROW`).
    pub fn next(&mut self) -> Result<bool> {
        let target = if self.page_index == UNBOUND_PAGE_ID {
            self.start_page_index
        } else {
            self.page_index + 1
        };
        self.advance(target)
    }

    /// Jumps directly to `page_index`. Growth semantics and return value
    /// as in [`Cursor::next`].
    pub fn next_at(&mut self, page_index: u64) -> Result<bool> {
        self.advance(page_index)
    }

    /// Unpins the current frame (if any) and resets this cursor so the
    /// next [`Cursor::next`] call returns to its configured start page.
    pub fn rewind(&mut self) -> Result<()> {
        self.require_open()?;
        self.release_current();
        self.page_index = UNBOUND_PAGE_ID;
        self.offset = 0;
        self.window_start_offset = 0;
        Ok(())
    }

    /// The page this cursor is positioned on, or [`UNBOUND_PAGE_ID`] before
    /// the first successful `next()` and after `rewind()`.
    pub fn current_page_id(&self) -> u64 {
        self.page_index
    }

    /// `true` if the cursor is bound to a resident frame (i.e. not a
    /// `NO_FAULT` miss and not currently unbound).
    pub fn is_bound(&self) -> bool {
        self.frame_idx.is_some()
    }

    /// Repositions this cursor within its current page and marks `offset` as
    /// the start of a new read window, so a later unstable [`Cursor::retry`]
    /// restores it here.
    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        if offset > self.frame_len() {
            return Err(CacheError::Argument(format!(
                "offset {offset} exceeds page size {}",
                self.frame_len()
            )));
        }
        self.offset = offset;
        self.window_start_offset = offset;
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn frame_len(&self) -> usize {
        self.frame_idx
            .map(|idx| self.inner.pool.frame(idx).len())
            .unwrap_or(self.inner.config.cache_page_size)
    }

    fn frame(&self) -> Option<&Frame> {
        self.frame_idx.map(|idx| self.inner.pool.frame(idx))
    }

    pub fn get_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.get_bytes(&mut buf)?;
        Ok(buf[0])
    }

    pub fn get_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        match self.frame() {
            Some(frame) => {
                self.bounds_check(out.len())?;
                frame.read_bytes(self.offset, out);
                self.offset += out.len();
                Ok(())
            }
            None => {
                // Unbound (NO_FAULT miss, or never advanced): reads as zero.
                for b in out.iter_mut() {
                    *b = 0;
                }
                self.offset += out.len();
                Ok(())
            }
        }
    }

    pub fn put_byte(&mut self, value: u8) -> Result<()> {
        self.put_bytes(&[value])
    }

    pub fn put_bytes(&mut self, src: &[u8]) -> Result<()> {
        if !self.flags.is_exclusive() {
            return Err(CacheError::IllegalState(
                "cursor does not hold EXCLUSIVE_LOCK".into(),
            ));
        }
        let frame = self.frame().ok_or_else(|| {
            CacheError::IllegalState("cursor has no resident frame to write into".into())
        })?;
        self.bounds_check(src.len())?;
        frame.begin_exclusive_mutation();
        frame.write_bytes(self.offset, src);
        frame.end_exclusive_mutation();
        frame.set_dirty(true);
        self.offset += src.len();
        Ok(())
    }

    fn bounds_check(&self, len: usize) -> Result<()> {
        if self.offset + len > self.frame_len() {
            return Err(CacheError::Argument(format!(
                "access of {len} bytes at offset {} overruns page size {}",
                self.offset,
                self.frame_len()
            )));
        }
        Ok(())
    }

    /// Checks whether a write may have overlapped this cursor's reads since
    /// the page was bound (or since the last `retry` call). On a shared
    /// cursor, a `true` result means the caller must reset its own read
    /// state and redo the read from the start of its read window; this call
    /// already resets [`Cursor::offset`] back to that window's starting
    /// offset (not necessarily zero — see [`Cursor::set_offset`]) for that
    /// purpose. Always `false` on an exclusive cursor, which cannot race
    /// with itself.
    pub fn retry(&mut self) -> bool {
        if self.flags.is_exclusive() {
            return false;
        }
        let Some(frame) = self.frame() else {
            return false;
        };
        let current = frame.version();
        let unstable = current != self.observed_version || Frame::is_write_in_progress(current);
        if unstable {
            self.offset = self.window_start_offset;
            self.observed_version = frame.version();
        }
        unstable
    }

    fn require_open(&self) -> Result<()> {
        if self.closed {
            return Err(CacheError::IllegalState("cursor is closed".into()));
        }
        Ok(())
    }

    /// Releases this cursor's frame pin and its open-cursor registration.
    /// Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.release_current();
        self.mapping.release_cursor();
        self.closed = true;
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.close();
    }
}
