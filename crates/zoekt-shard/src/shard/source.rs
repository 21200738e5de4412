//! Abstract byte source behind a shard reader.
//!
//! Reads must be deterministic, byte-exact and re-entrant; dropping the
//! value closes it. Implementations may memory-map, buffer in memory, or
//! go through a file handle.

use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::Path;

pub trait IndexFile: Send + Sync {
    fn name(&self) -> &str;
    fn size(&self) -> io::Result<u64>;
    fn read(&self, off: u64, len: u32) -> io::Result<Vec<u8>>;
}

/// In-memory byte source, used for freshly written shards and tests.
pub struct MemFile {
    name: String,
    data: Vec<u8>,
}

impl MemFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        MemFile { name: name.into(), data }
    }
}

impl IndexFile for MemFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read(&self, off: u64, len: u32) -> io::Result<Vec<u8>> {
        let start = off as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of shard")
            })?;
        Ok(self.data[start..end].to_vec())
    }
}

/// Memory-mapped byte source for shard files on disk.
pub struct MmapFile {
    name: String,
    mmap: Mmap,
}

impl MmapFile {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // Safety: shards are write-once; the file is never mutated while
        // mapped.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(MmapFile { name: path.display().to_string(), mmap })
    }
}

impl IndexFile for MmapFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.mmap.len() as u64)
    }

    fn read(&self, off: u64, len: u32) -> io::Result<Vec<u8>> {
        let start = off as usize;
        let end = start
            .checked_add(len as usize)
            .filter(|&e| e <= self.mmap.len())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of shard")
            })?;
        Ok(self.mmap[start..end].to_vec())
    }
}
