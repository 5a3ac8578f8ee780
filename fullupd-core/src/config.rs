//! Inputs for a full-update run.
use crate::codec::Compression;
use crate::error::{Error, Result};
use std::path::PathBuf;

/// Default chunk size: 2 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 2 * 1024 * 1024;
/// Default destination block size: 4 KiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;

const MIN_CONCURRENCY: usize = 4;

/// Number of chunk workers allowed in flight when nothing else is configured:
/// the number of online cores, but never fewer than four.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(MIN_CONCURRENCY)
}

/// A source partition image and the number of bytes of it to process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionConfig {
    pub path: PathBuf,
    pub size: u64,
}

impl PartitionConfig {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// The target image: a rootfs-class partition whose operations feed the
/// operation graph, and a kernel-class partition producing a flat list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageConfig {
    pub rootfs: PartitionConfig,
    pub kernel: PartitionConfig,
}

#[derive(Clone, Debug)]
pub struct PayloadGenerationConfig {
    pub target: ImageConfig,
    /// Bytes of source image per operation. Must be a positive multiple of
    /// `block_size`.
    pub chunk_size: u64,
    pub block_size: u64,
    /// Upper bound on chunk workers running at once.
    pub max_concurrency: usize,
    pub compression: Compression,
}

impl PayloadGenerationConfig {
    pub fn new(target: ImageConfig) -> Self {
        Self {
            target,
            chunk_size: DEFAULT_CHUNK_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            max_concurrency: default_concurrency(),
            compression: Compression::default(),
        }
    }

    /// Checks the config before any file is opened.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Configuration("block size must be positive".into()));
        }
        // A zero chunk size would collapse a whole partition into a single
        // operation, which a full update does not allow.
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk size must be positive".into()));
        }
        if self.chunk_size % self.block_size != 0 {
            return Err(Error::Configuration(format!(
                "chunk size {} is not a multiple of block size {}",
                self.chunk_size, self.block_size
            )));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Configuration(
                "at least one chunk worker is required".into(),
            ));
        }
        for (name, part) in [("rootfs", &self.target.rootfs), ("kernel", &self.target.kernel)] {
            if part.size % self.block_size != 0 {
                return Err(Error::Configuration(format!(
                    "{name} size {} is not a multiple of block size {}",
                    part.size, self.block_size
                )));
            }
        }
        Ok(())
    }
}
