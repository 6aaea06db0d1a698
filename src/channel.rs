//! The file-system abstraction the cache reads and writes through.
//!
//! This is the narrow, swappable "channel" collaborator named in the
//! design: `open`, `read`, `writeAll`, `size`, `force`, `close`. Its own
//! durability and atomicity guarantees are assumed, not engineered by this
//! crate — [`FileChannel`] is a thin pass-through to [`std::fs::File`],
//! grounded in the teacher's `DiskManager` (seek-then-read/write rather
//! than platform-specific positioned I/O, for portability).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// How a channel is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only.
    Read,
    /// Read-write, creating the file if it does not exist.
    ReadWrite,
}

/// A backing store for one file's bytes.
///
/// Implementors need not be thread-safe on their own; the cache serializes
/// all access to a given channel itself (writebacks for one mapping never
/// run concurrently).
pub trait Channel: Send {
    /// Reads up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes actually read (short at end-of-file).
    fn read(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Writes all of `buf` at `offset`, extending the file as needed.
    fn write_all(&mut self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Returns the current size of the file in bytes.
    fn size(&mut self) -> io::Result<u64>;

    /// Forces previously written data to durable storage.
    fn force(&mut self, metadata: bool) -> io::Result<()>;
}

/// A [`Channel`] backed by a plain [`std::fs::File`].
pub struct FileChannel {
    path: PathBuf,
    file: File,
}

impl FileChannel {
    /// Opens `path` in the given mode.
    pub fn open(path: &Path, mode: OpenMode) -> io::Result<Self> {
        let file = match mode {
            OpenMode::Read => OpenOptions::new().read(true).open(path)?,
            OpenMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?,
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// The path this channel was opened against.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Channel for FileChannel {
    fn read(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        loop {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            if total == buf.len() {
                break;
            }
        }
        Ok(total)
    }

    fn write_all(&mut self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn force(&mut self, metadata: bool) -> io::Result<()> {
        if metadata {
            self.file.sync_all()
        } else {
            self.file.sync_data()
        }
    }
}
