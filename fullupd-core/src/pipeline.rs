//! The pipeline driver: turns one partition image into an ordered list of
//! replace operations.
//!
//! Chunks are handed to a bounded pool of scoped worker threads. Results are
//! drained strictly in submission order, oldest first, even when a younger
//! worker finishes earlier. Offsets into the data blob and destination extents
//! are assigned as results are drained, so this order is what makes the
//! output deterministic.
use crate::chunk::{Chunk, ChunkResult, ChunkSource, read_and_compress};
use crate::codec::Compression;
use crate::config::{DEFAULT_BLOCK_SIZE, PayloadGenerationConfig, default_concurrency};
use crate::error::{Error, Result};
use crate::operation::{DataBlob, Extent, Operation};
use std::collections::VecDeque;
use std::io::Write;
use std::thread::{self, ScopedJoinHandle};

/// A progress notification for the partition being processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Share of the partition drained so far, 0 to 100.
    pub percent: u32,
    /// Total data blob length after the last drained chunk.
    pub output_size: u64,
}

/// Decides which progress percentages are worth reporting.
///
/// The first value always passes. After that a value passes only when it is
/// at least ten points above the last reported one, or when it is 100.
/// Reported values never repeat or go backwards.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProgressGate {
    last: Option<u32>,
}

impl ProgressGate {
    pub fn advance(&mut self, percent: u32) -> bool {
        let report = match self.last {
            None => true,
            Some(last) => last < percent && (last + 10 <= percent || percent == 100),
        };
        if report {
            self.last = Some(percent);
        }
        report
    }
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    chunk_size: u64,
    block_size: u64,
    max_concurrency: usize,
    compression: Compression,
}

impl Pipeline {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size,
            block_size: DEFAULT_BLOCK_SIZE,
            max_concurrency: default_concurrency(),
            compression: Compression::default(),
        }
    }

    pub fn from_config(config: &PayloadGenerationConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            block_size: config.block_size,
            max_concurrency: config.max_concurrency,
            compression: config.compression,
        }
    }

    pub fn block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Processes `partition_size` bytes of `source`, appending each chunk's
    /// payload to `blob` and returning one operation per chunk in source order.
    ///
    /// Chunks are `chunk_size` bytes except the last, which covers whatever
    /// remains. Any failure aborts the partition; bytes already appended to
    /// `blob` are not rolled back.
    pub fn process<S, W, F>(
        &self,
        source: &S,
        partition_size: u64,
        blob: &mut DataBlob<W>,
        mut on_progress: F,
    ) -> Result<Vec<Operation>>
    where
        S: ChunkSource + ?Sized,
        W: Write,
        F: FnMut(Progress),
    {
        self.check()?;

        thread::scope(|scope| -> Result<Vec<Operation>> {
            let mut in_flight: VecDeque<ScopedJoinHandle<'_, Result<ChunkResult>>> =
                VecDeque::with_capacity(self.max_concurrency);
            let mut ops = Vec::new();
            let mut gate = ProgressGate::default();
            let mut bytes_left = partition_size;
            let mut offset = 0u64;

            while bytes_left > 0 || !in_flight.is_empty() {
                while in_flight.len() < self.max_concurrency && bytes_left > 0 {
                    let chunk = Chunk {
                        offset,
                        size: bytes_left.min(self.chunk_size),
                    };
                    let compression = self.compression;
                    let handle = thread::Builder::new()
                        .name("chunk-proc".to_string())
                        .spawn_scoped(scope, move || {
                            read_and_compress(source, chunk, compression)
                        })?;
                    in_flight.push_back(handle);
                    bytes_left = bytes_left.saturating_sub(self.chunk_size);
                    offset += self.chunk_size;
                }

                let Some(oldest) = in_flight.pop_front() else {
                    break;
                };
                let result = oldest
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))?;

                let done = result.offset + result.source_len();
                let op = self.emit(result, blob)?;
                ops.push(op);

                let percent = (u128::from(done) * 100 / u128::from(partition_size)) as u32;
                if gate.advance(percent) {
                    log::info!("{percent}% complete (output size: {})", blob.len());
                    on_progress(Progress {
                        percent,
                        output_size: blob.len(),
                    });
                }
            }

            Ok(ops)
        })
    }

    fn check(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk size must be positive".into()));
        }
        if self.block_size == 0 {
            return Err(Error::Configuration("block size must be positive".into()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Configuration(
                "at least one chunk worker is required".into(),
            ));
        }
        Ok(())
    }

    /// Appends the smaller representation of a drained chunk to the blob and
    /// builds its operation.
    ///
    /// The extent always spans `chunk_size / block_size` blocks, including for
    /// a short final chunk.
    fn emit<W: Write>(&self, result: ChunkResult, blob: &mut DataBlob<W>) -> Result<Operation> {
        let extent = Extent {
            start_block: result.offset / self.block_size,
            num_blocks: self.chunk_size / self.block_size,
        };
        let raw_len = result.source_len();
        let (kind, payload) = result.into_payload();
        let data_offset = blob.append(&payload)?;
        log::debug!(
            "chunk at block {}: {kind:?}, {raw_len} -> {} bytes",
            extent.start_block,
            payload.len()
        );

        Ok(Operation {
            kind,
            data_offset,
            data_length: payload.len() as u64,
            dst_extents: vec![extent],
        })
    }
}
