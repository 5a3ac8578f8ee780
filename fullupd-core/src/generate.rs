//! Contains the top-level logic for generating a full update.
//!
//! Both partitions of the target image go through the same [`Pipeline`] and
//! share one data blob. The rootfs partition is processed first and its
//! operations become graph vertices; the kernel partition follows and produces
//! a flat list. A partition is fully drained before the next one starts.
use crate::chunk::ChunkSource;
use crate::config::PayloadGenerationConfig;
use crate::error::Result;
use crate::operation::{DataBlob, Operation, OperationGraph, rootfs_label};
use crate::pipeline::{Pipeline, Progress};
use std::fmt;
use std::fs::File;
use std::io::Write;

/// Which partition of the target image an event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionKind {
    Rootfs,
    Kernel,
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKind::Rootfs => f.write_str("rootfs"),
            PartitionKind::Kernel => f.write_str("kernel"),
        }
    }
}

/// Everything a full-update run hands to manifest construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FullUpdate {
    pub graph: OperationGraph,
    pub kernel_ops: Vec<Operation>,
    /// Length of the data blob once both partitions were written.
    pub data_size: u64,
}

/// Generates a full update from the partition images named in `config`.
///
/// # Arguments
///
/// * `config` - Partition paths and sizes, chunk and block sizes, worker
///   count and codec. It is validated before any file is opened.
/// * `blob` - The data blob operation payloads are appended to. Its current
///   length is where the first operation's data starts.
/// * `on_progress` - A closure called with throttled progress for the
///   partition being processed.
///
/// # Errors
///
/// This function will return an error if:
/// - The config is invalid.
/// - A partition image cannot be opened or read, or is shorter than its
///   declared size.
/// - A chunk fails to compress.
/// - Writing to `blob` fails.
///
/// Bytes already written to `blob` are left in place on error and must be
/// discarded by the caller.
pub fn run<W, F>(
    config: &PayloadGenerationConfig,
    blob: &mut DataBlob<W>,
    on_progress: F,
) -> Result<FullUpdate>
where
    W: Write,
    F: FnMut(PartitionKind, Progress),
{
    config.validate()?;

    let rootfs = File::open(&config.target.rootfs.path)?;
    let kernel = File::open(&config.target.kernel.path)?;

    run_sources(config, &rootfs, &kernel, blob, on_progress)
}

/// Like [`run`], but reads from already opened sources instead of the paths
/// in `config`. The partition sizes still come from `config`.
pub fn run_sources<R, K, W, F>(
    config: &PayloadGenerationConfig,
    rootfs: &R,
    kernel: &K,
    blob: &mut DataBlob<W>,
    mut on_progress: F,
) -> Result<FullUpdate>
where
    R: ChunkSource + ?Sized,
    K: ChunkSource + ?Sized,
    W: Write,
    F: FnMut(PartitionKind, Progress),
{
    config.validate()?;

    let pipeline = Pipeline::from_config(config);
    log::info!("Max threads: {}", config.max_concurrency);

    log::info!("compressing {}", config.target.rootfs.path.display());
    let rootfs_ops = pipeline.process(rootfs, config.target.rootfs.size, blob, |p| {
        on_progress(PartitionKind::Rootfs, p)
    })?;

    let mut graph = OperationGraph::new();
    for (i, op) in rootfs_ops.into_iter().enumerate() {
        graph.push(rootfs_label(i), op);
    }

    log::info!("compressing {}", config.target.kernel.path.display());
    let kernel_ops = pipeline.process(kernel, config.target.kernel.size, blob, |p| {
        on_progress(PartitionKind::Kernel, p)
    })?;

    blob.flush()?;

    Ok(FullUpdate {
        graph,
        kernel_ops,
        data_size: blob.len(),
    })
}
