use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use fullupd_core::codec::Compression;
use fullupd_core::config::{
    DEFAULT_BLOCK_SIZE, DEFAULT_CHUNK_SIZE, ImageConfig, PartitionConfig, PayloadGenerationConfig,
    default_concurrency,
};
use fullupd_core::generate::{self, FullUpdate, PartitionKind};
use fullupd_core::operation::{DataBlob, Operation, OperationKind};
use fullupd_core::pipeline::Progress;
use fullupd_core::platform;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fullupd")]
#[command(about = "Generate full-update payload data from partition images", version)]
struct Cli {
    /// Rootfs partition image
    #[arg(long, required = true)]
    rootfs: PathBuf,

    /// Bytes of the rootfs image to process [default: size of the image]
    #[arg(long)]
    rootfs_size: Option<u64>,

    /// Kernel partition image
    #[arg(long, required = true)]
    kernel: PathBuf,

    /// Bytes of the kernel image to process [default: size of the image]
    #[arg(long)]
    kernel_size: Option<u64>,

    /// Bytes of source image per operation
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Destination block size in bytes
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u64,

    /// Maximum number of chunks compressed at once [default: max(cores, 4)]
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Codec tried on every chunk (xz, zstd, gzip, bzip2)
    #[arg(short, long, default_value_t = Compression::Xz)]
    compression: Compression,

    /// File the payload data is written to
    #[arg(short, long, required = true)]
    output: PathBuf,

    /// Log pipeline details to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Returns the explicit size, or the size of the image at `path`.
fn partition(path: &Path, size: Option<u64>) -> Result<PartitionConfig> {
    let size = match size {
        Some(size) => size,
        None => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            platform::source_size(&file)
                .with_context(|| format!("Failed to determine size of {}", path.display()))?
        }
    };
    Ok(PartitionConfig::new(path, size))
}

fn partition_bar(prefix: &'static str, color: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(100);
    pb.set_prefix(prefix);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{prefix:12}} [{{elapsed_precise}}] [{{bar:40.{color}/black}}] {{pos:>3}}% {{msg}}"
            ))?
            .progress_chars("■ "),
    );
    Ok(pb)
}

/// Counts (raw, compressed) operations.
fn count_kinds<'a>(ops: impl Iterator<Item = &'a Operation>) -> (usize, usize) {
    ops.fold((0, 0), |(raw, packed), op| match op.kind {
        OperationKind::Replace => (raw + 1, packed),
        OperationKind::ReplaceCompressed(_) => (raw, packed + 1),
    })
}

fn print_summary(update: &FullUpdate, output: &Path) {
    let (rootfs_raw, rootfs_packed) = count_kinds(update.graph.ordered_ops());
    let (kernel_raw, kernel_packed) = count_kinds(update.kernel_ops.iter());

    println!(
        "\n✨ Wrote {} bytes of payload data to {}.",
        update.data_size,
        style(output.display()).cyan()
    );
    println!("\n  {:<10} {:>10} {:>10} {:>12}", "PARTITION", "OPS", "RAW", "COMPRESSED");
    println!("  {:-<10} {:-<10} {:-<10} {:-<12}", "", "", "", "");
    println!(
        "  {:<10} {:>10} {:>10} {:>12}",
        PartitionKind::Rootfs.to_string(),
        update.graph.len(),
        rootfs_raw,
        rootfs_packed
    );
    println!(
        "  {:<10} {:>10} {:>10} {:>12}",
        PartitionKind::Kernel.to_string(),
        update.kernel_ops.len(),
        kernel_raw,
        kernel_packed
    );
}

/// Removes a partially written payload file, logging the outcome.
/// Returns whether a file was removed.
fn discard_output(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::warn!("removed partial output {}", path.display());
            true
        }
        Err(err) => {
            log::warn!("could not remove {}: {err}", path.display());
            false
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = PayloadGenerationConfig::new(ImageConfig {
        rootfs: partition(&cli.rootfs, cli.rootfs_size)?,
        kernel: partition(&cli.kernel, cli.kernel_size)?,
    });
    config.chunk_size = cli.chunk_size;
    config.block_size = cli.block_size;
    config.max_concurrency = cli.jobs.unwrap_or_else(default_concurrency);
    config.compression = cli.compression;
    config.validate()?;
    log::info!(
        "chunk size {}, block size {}, {} workers, {} compression",
        config.chunk_size,
        config.block_size,
        config.max_concurrency,
        config.compression
    );

    println!("  Rootfs: {}", style(cli.rootfs.display()).cyan());
    println!("  Kernel: {}", style(cli.kernel.display()).cyan());
    println!("  Output: {}", style(cli.output.display()).cyan());
    println!();

    let rootfs_pb = partition_bar("Rootfs", "green")?;
    let kernel_pb = partition_bar("Kernel", "magenta")?;

    let on_progress = |partition: PartitionKind, progress: Progress| {
        let pb = match partition {
            PartitionKind::Rootfs => &rootfs_pb,
            PartitionKind::Kernel => &kernel_pb,
        };
        pb.set_position(u64::from(progress.percent));
        pb.set_message(format!("{} bytes out", progress.output_size));
        if progress.percent == 100 {
            pb.finish();
        }
    };

    let output = File::create(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;
    let mut blob = DataBlob::new(BufWriter::new(output));

    match generate::run(&config, &mut blob, on_progress) {
        Ok(update) => {
            rootfs_pb.finish();
            kernel_pb.finish();
            print_summary(&update, &cli.output);
            Ok(())
        }
        Err(e) => {
            rootfs_pb.abandon_with_message("❌ Generation failed.");
            kernel_pb.finish_and_clear();
            log::error!("payload generation failed: {e}");
            // Partial payload data is meaningless; do not leave it behind.
            drop(blob);
            discard_output(&cli.output);
            Err(e.into())
        }
    }
}
