//! The core, UI-agnostic library for the `fullupd` payload generator.
//!
//! `fullupd-core` turns partition images into the data half of a full update:
//! every image is cut into fixed-size chunks, each chunk is compressed on its
//! own worker thread, and the smaller of the raw and compressed bytes is
//! appended to a shared data blob together with one replace operation
//! describing where the bytes go. Building and signing the manifest that wraps
//! these operations is left to the caller.
//!
//! The library is structured into several key modules:
//! - [`config`]: The `PayloadGenerationConfig` and its validation.
//! - [`codec`]: The lossless codecs a chunk can be compressed with.
//! - [`chunk`]: The chunk worker and the `ChunkSource` trait it reads through.
//! - [`pipeline`]: The bounded worker pool that drains chunks in order.
//! - [`operation`]: Operations, extents, the operation graph and the data blob.
//! - [`platform`]: Positional reads and source sizing per operating system.
//! - [`generate`]: Runs the pipeline over the rootfs and kernel partitions.
//!
//! The primary entry point is [`generate::run`]. It reports progress via a
//! callback, allowing the calling application to display it however it likes.
//!
//! ## Example: Generating a Full Update
//!
//! ```rust,no_run
//! use fullupd_core::config::{ImageConfig, PartitionConfig, PayloadGenerationConfig};
//! use fullupd_core::{generate, operation::DataBlob};
//! use std::fs::File;
//! use std::io::BufWriter;
//!
//! fn main() -> fullupd_core::Result<()> {
//!     let config = PayloadGenerationConfig::new(ImageConfig {
//!         rootfs: PartitionConfig::new("rootfs.img", 512 * 1024 * 1024),
//!         kernel: PartitionConfig::new("kernel.img", 16 * 1024 * 1024),
//!     });
//!
//!     let mut blob = DataBlob::new(BufWriter::new(File::create("payload.bin")?));
//!     let update = generate::run(&config, &mut blob, |partition, progress| {
//!         println!("{partition}: {}%", progress.percent);
//!     })?;
//!
//!     println!(
//!         "{} rootfs and {} kernel operations, {} bytes of data",
//!         update.graph.len(),
//!         update.kernel_ops.len(),
//!         update.data_size
//!     );
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod codec;
pub mod config;
mod error;
pub mod generate;
pub mod operation;
pub mod pipeline;
pub mod platform;

pub use error::{Error, Result};
