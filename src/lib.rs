//! A fixed-capacity, shared buffer pool for byte-oriented access to files
//! organized into fixed-size pages.
//!
//! [`Cache`] owns a pool of in-memory frames and mediates every file's
//! access to them through [`Cache::map`]. A mapped file is a [`PagedFile`];
//! reading or writing it goes through a [`Cursor`] opened with
//! [`PagedFile::io`], which pins one frame at a time and exposes
//! byte-level `get`/`put` operations plus the optimistic-read retry
//! protocol (see [`Cursor::retry`]).
//!
//! ```no_run
//! use paged_cache::{Cache, CacheConfig, Flags};
//!
//! # fn main() -> paged_cache::Result<()> {
//! let cache = Cache::new(CacheConfig::default());
//! let file = cache.map("data.bin", 4096)?;
//!
//! let mut writer = file.io(0, Flags::EXCLUSIVE_LOCK)?;
//! writer.next()?;
//! writer.put_bytes(b"hello")?;
//! drop(writer);
//!
//! let mut reader = file.io(0, Flags::SHARED_LOCK)?;
//! reader.next()?;
//! loop {
//!     let mut buf = [0u8; 5];
//!     reader.get_bytes(&mut buf)?;
//!     if !reader.retry() {
//!         break;
//!     }
//!     reader.set_offset(0)?;
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod channel;
mod config;
mod cursor;
mod error;
mod eviction;
mod fault;
mod frame;
mod io_adapter;
mod mapping;
mod monitor;
mod pool;
mod translation;

pub use cache::{Cache, PagedFile};
pub use channel::{Channel, FileChannel, OpenMode};
pub use config::CacheConfig;
pub use cursor::{Cursor, Flags, UNBOUND_PAGE_ID};
pub use error::{CacheError, Result};
pub use monitor::{Monitor, NullMonitor};

pub(crate) use cache::CacheInner;
