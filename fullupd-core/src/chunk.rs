//! The chunk worker: reads one byte range of a source image and compresses it.
//!
//! Workers share nothing but a read-only source. They return their result by
//! value and the pipeline decides what to do with it.
use crate::codec::Compression;
use crate::error::{Error, Result};
use crate::operation::OperationKind;
use crate::platform;
use std::fs::File;
use std::io;

/// A readable image that supports reads at explicit offsets.
///
/// Implementations must not depend on a shared cursor: many workers call
/// `read_at` on the same source at once.
pub trait ChunkSource: Sync {
    /// Fills as much of `buf` as possible from `offset` onward and returns
    /// how many bytes were read. Fewer than `buf.len()` means EOF.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl ChunkSource for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        platform::read_at(self, buf, offset)
    }
}

impl ChunkSource for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = usize::try_from(offset).map_or(self.len(), |o| o.min(self.len()));
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl ChunkSource for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

/// A byte range `[offset, offset + size)` of a source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub offset: u64,
    pub size: u64,
}

/// What a worker hands back: the raw bytes and their compressed form.
#[derive(Debug)]
pub struct ChunkResult {
    pub offset: u64,
    pub raw: Vec<u8>,
    pub compressed: Vec<u8>,
    pub compression: Compression,
}

impl ChunkResult {
    /// Compression is kept only when it strictly shrinks the chunk.
    pub fn should_compress(&self) -> bool {
        self.compressed.len() < self.raw.len()
    }

    /// Length of the source range this chunk covered.
    pub fn source_len(&self) -> u64 {
        self.raw.len() as u64
    }

    /// Picks the smaller representation and the operation kind that goes
    /// with it.
    pub fn into_payload(self) -> (OperationKind, Vec<u8>) {
        if self.should_compress() {
            (OperationKind::ReplaceCompressed(self.compression), self.compressed)
        } else {
            (OperationKind::Replace, self.raw)
        }
    }
}

/// Reads exactly `chunk.size` bytes at `chunk.offset` and compresses them.
///
/// A source that runs out early fails with [`Error::ShortRead`]; partial
/// chunks are never emitted.
pub fn read_and_compress<S>(
    source: &S,
    chunk: Chunk,
    compression: Compression,
) -> Result<ChunkResult>
where
    S: ChunkSource + ?Sized,
{
    let size = usize::try_from(chunk.size).map_err(|_| {
        Error::Configuration(format!("chunk of {} bytes does not fit in memory", chunk.size))
    })?;
    let mut raw = vec![0u8; size];
    let read = source.read_at(&mut raw, chunk.offset)?;
    if read != size {
        return Err(Error::ShortRead {
            offset: chunk.offset,
            expected: chunk.size,
            actual: read as u64,
        });
    }

    let compressed = compression.compress(&raw)?;
    Ok(ChunkResult {
        offset: chunk.offset,
        raw,
        compressed,
        compression,
    })
}
