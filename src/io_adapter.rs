//! Reads and writes a single page to/from a mapping's backing channel.

use crate::error::{CacheError, Result};
use crate::mapping::Mapping;

/// Reads the file page at `page_index` from `mapping`'s channel into `out`.
///
/// `out` is exactly one cache page long. A short read at end-of-file (the
/// file page hasn't been written yet, or the file ends mid-page) zero-fills
/// the remainder of `out`, including any bytes beyond `file_page_size` that
/// belong to the cache page but not the file page.
pub(crate) fn read_page(mapping: &Mapping, page_index: u64, out: &mut [u8]) -> Result<()> {
    let file_page_size = mapping.file_page_size;
    debug_assert!(out.len() >= file_page_size);
    let offset = page_index * file_page_size as u64;

    let read = mapping.with_channel(|chan| chan.read(&mut out[..file_page_size], offset));
    let n = read.map_err(|e| CacheError::io(mapping.identity.clone(), e))?;
    for b in &mut out[n..] {
        *b = 0;
    }
    Ok(())
}

/// Writes exactly `file_page_size` bytes of `data` to `page_index`'s offset
/// in `mapping`'s channel, extending the file as needed.
pub(crate) fn write_page(mapping: &Mapping, page_index: u64, data: &[u8]) -> Result<()> {
    let file_page_size = mapping.file_page_size;
    let offset = page_index * file_page_size as u64;
    mapping
        .with_channel(|chan| chan.write_all(&data[..file_page_size], offset))
        .map_err(|e| CacheError::io(mapping.identity.clone(), e))
}
