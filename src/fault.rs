//! The fault/evict engine: resolves a (mapping, page index) pair to a
//! pinned frame, faulting the page in and evicting a victim as needed.
//!
//! Every call here runs under the cache's single fault lock (see
//! `Cache::resolve_page`), so the steps below can treat frame selection,
//! writeback, and rebinding as a single atomic unit without a finer-grained
//! per-frame protocol. This trades fault-path parallelism for a
//! straightforward, clearly-correct critical section — cache hits still
//! only pay for a translation lookup and an atomic pin, and the critical
//! section never blocks on anything other cursors are waiting on (pins,
//! the exclusive write gate) since those are independent of this lock.

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::error::Result;
use crate::mapping::Mapping;
use crate::monitor::Monitor;
use crate::pool::FramePool;
use crate::{io_adapter, CacheError};

/// Resolves `page_index` within `mapping` to a pinned frame index.
///
/// Returns `Ok(None)` only when `no_fault` is set and the page is not
/// currently resident — the caller must treat that as the cursor's
/// "unbound frame" case and must not have blocked on any I/O to get there.
#[allow(clippy::too_many_arguments)]
pub(crate) fn resolve(
    pool: &FramePool,
    mapping: &Arc<Mapping>,
    page_index: u64,
    cache_page_size: usize,
    no_fault: bool,
    may_extend: bool,
    monitor: &dyn Monitor,
) -> Result<Option<usize>> {
    if let Some(idx) = mapping.translation.lookup(page_index) {
        pool.frame(idx).pin();
        trace!("cache hit: {} page {} -> frame {}", mapping.identity.display(), page_index, idx);
        return Ok(Some(idx));
    }

    if no_fault {
        trace!("no-fault miss: {} page {}", mapping.identity.display(), page_index);
        return Ok(None);
    }

    let idx = pool.acquire_victim()?;
    let victim = pool.frame(idx);

    if let Some(old) = victim.binding() {
        debug!(
            "evicting frame {} ({} page {}) to serve {} page {}",
            idx, old.mapping.identity.display(), old.page_index, mapping.identity.display(), page_index
        );
        monitor.on_evict(&old.mapping.identity, old.page_index);
        if victim.is_dirty() {
            let mut contents = vec![0u8; cache_page_size];
            victim.read_bytes(0, &mut contents);
            if let Err(e) = io_adapter::write_page(&old.mapping, old.page_index, &contents) {
                // Keep the frame dirty and mark it unusable as a future
                // victim until the mapping is explicitly flushed or closed.
                warn!(
                    "writeback failed while evicting {} page {}: {e}",
                    old.mapping.identity.display(), old.page_index
                );
                victim.mark_poisoned();
                pool.release_to_eviction(idx);
                let (source, path) = match e {
                    CacheError::Io { source, path } => (source, path),
                    other => return Err(other),
                };
                return Err(CacheError::Poisoned {
                    path,
                    page_index: old.page_index,
                    source,
                });
            }
            victim.set_dirty(false);
            monitor.on_page_out(&old.mapping.identity, old.page_index);
        }
        old.mapping.translation.remove(old.page_index);
        victim.unbind();
    }

    let page_was_known = page_index < mapping.page_count();
    if page_was_known {
        let mut contents = vec![0u8; cache_page_size];
        io_adapter::read_page(mapping, page_index, &mut contents)?;
        victim.load_contents(&contents);
    } else {
        victim.load_contents(&[]);
    }

    victim.bind(mapping.clone(), page_index);
    victim.set_dirty(false);
    victim.clear_poisoned();
    victim.pin();
    mapping.translation.insert(page_index, idx);
    monitor.on_page_in(&mapping.identity, page_index);
    trace!("faulted in {} page {} -> frame {}", mapping.identity.display(), page_index, idx);

    if may_extend && !page_was_known {
        mapping.grow_to(page_index + 1);
    }

    Ok(Some(idx))
}
