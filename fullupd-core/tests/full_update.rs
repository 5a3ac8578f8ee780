use fullupd_core::chunk::ChunkSource;
use fullupd_core::codec::Compression;
use fullupd_core::config::{ImageConfig, PartitionConfig, PayloadGenerationConfig};
use fullupd_core::generate::{self, PartitionKind};
use fullupd_core::operation::{DataBlob, Extent, Operation, OperationKind};
use fullupd_core::pipeline::Pipeline;
use fullupd_core::Error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;

const BLOCK: u64 = 4096;
const CHUNK: u64 = 4 * BLOCK;

/// Alternates compressible and random chunks so both operation kinds show up.
fn mixed_image(chunks: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut image = vec![0u8; chunks * CHUNK as usize];
    for (i, chunk) in image.chunks_mut(CHUNK as usize).enumerate() {
        if i % 2 == 1 {
            rng.fill(chunk);
        }
    }
    image
}

fn assert_contiguous(ops: &[Operation], start: u64) {
    let mut expected = start;
    for op in ops {
        assert_eq!(op.data_offset, expected);
        expected += op.data_length;
    }
}

/// An in-memory image whose reads sleep for a per-chunk delay and which
/// tracks how many reads are running at once.
struct SlowSource {
    image: Vec<u8>,
    delays_ms: Vec<u64>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowSource {
    fn new(image: Vec<u8>, delays_ms: Vec<u64>) -> Self {
        Self {
            image,
            delays_ms,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

impl ChunkSource for SlowSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let index = (offset / CHUNK) as usize;
        let delay = self.delays_ms.get(index).copied().unwrap_or(0);
        thread::sleep(Duration::from_millis(delay));
        let n = self.image.read_at(buf, offset);

        self.active.fetch_sub(1, Ordering::SeqCst);
        n
    }
}

fn pipeline() -> Pipeline {
    Pipeline::new(CHUNK).block_size(BLOCK).max_concurrency(4)
}

#[test]
fn operations_are_contiguous_and_map_to_source_blocks() {
    let image = mixed_image(9, 1);
    let mut blob = DataBlob::with_offset(Vec::new(), 1000);
    let ops = pipeline()
        .process(&image, image.len() as u64, &mut blob, |_| {})
        .unwrap();

    assert_eq!(ops.len(), 9);
    assert_contiguous(&ops, 1000);
    for (i, op) in ops.iter().enumerate() {
        assert_eq!(op.dst_extents.len(), 1);
        let extent = op.dst_extents[0];
        assert_eq!(extent.start_block * BLOCK, i as u64 * CHUNK);
        assert_eq!(extent.num_blocks * BLOCK, CHUNK);
    }
    assert_eq!(blob.len(), 1000 + blob.get_ref().len() as u64);
}

#[test]
fn payload_bytes_match_the_chosen_representation() {
    let image = mixed_image(4, 2);
    let mut blob = DataBlob::new(Vec::new());
    let ops = pipeline()
        .compression(Compression::Zstd)
        .process(&image, image.len() as u64, &mut blob, |_| {})
        .unwrap();
    let data = blob.into_inner();

    for (i, op) in ops.iter().enumerate() {
        let start = op.data_offset as usize;
        let bytes = &data[start..start + op.data_length as usize];
        let source = &image[i * CHUNK as usize..(i + 1) * CHUNK as usize];
        match op.kind {
            OperationKind::Replace => assert_eq!(bytes, source),
            OperationKind::ReplaceCompressed(Compression::Zstd) => {
                assert!(bytes.len() < source.len());
                assert_eq!(zstd::decode_all(bytes).unwrap(), source);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }
    assert_eq!(ops[0].kind, OperationKind::ReplaceCompressed(Compression::Zstd));
    assert_eq!(ops[1].kind, OperationKind::Replace);
}

#[test]
fn order_ignores_worker_completion_time() {
    let image = mixed_image(12, 3);
    let mut baseline = DataBlob::new(Vec::new());
    let expected = pipeline()
        .process(&image, image.len() as u64, &mut baseline, |_| {})
        .unwrap();

    for seed in 0..4 {
        let mut rng = StdRng::seed_from_u64(seed);
        let delays = (0..12).map(|_| rng.random_range(0..25)).collect();
        let source = SlowSource::new(image.clone(), delays);

        let mut blob = DataBlob::new(Vec::new());
        let ops = pipeline()
            .process(&source, image.len() as u64, &mut blob, |_| {})
            .unwrap();

        assert_eq!(ops, expected);
        assert_eq!(blob.get_ref(), baseline.get_ref());
    }
}

#[test]
fn reversed_latency_still_drains_oldest_first() {
    let image = mixed_image(4, 4);
    let source = SlowSource::new(image.clone(), vec![60, 40, 20, 0]);
    let mut blob = DataBlob::new(Vec::new());
    let ops = pipeline()
        .process(&source, image.len() as u64, &mut blob, |_| {})
        .unwrap();

    let starts: Vec<u64> = ops.iter().map(|op| op.dst_extents[0].start_block).collect();
    assert_eq!(starts, vec![0, 4, 8, 12]);
    assert_contiguous(&ops, 0);
}

#[test]
fn three_chunks_use_at_most_three_workers() {
    let image = vec![0u8; 3 * CHUNK as usize];
    let source = SlowSource::new(image, vec![30, 30, 30]);
    let mut blob = DataBlob::new(Vec::new());
    let ops = pipeline()
        .process(&source, 3 * CHUNK, &mut blob, |_| {})
        .unwrap();

    assert_eq!(ops.len(), 3);
    assert!(source.peak.load(Ordering::SeqCst) <= 3);
    for (i, op) in ops.iter().enumerate() {
        assert_eq!(
            op.dst_extents,
            vec![Extent {
                start_block: i as u64 * 4,
                num_blocks: 4
            }]
        );
    }
}

#[test]
fn pool_never_exceeds_its_bound() {
    let image = vec![0u8; 10 * CHUNK as usize];
    let source = SlowSource::new(image, vec![10; 10]);
    let mut blob = DataBlob::new(Vec::new());
    Pipeline::new(CHUNK)
        .block_size(BLOCK)
        .max_concurrency(2)
        .process(&source, 10 * CHUNK, &mut blob, |_| {})
        .unwrap();
    assert!(source.peak.load(Ordering::SeqCst) <= 2);
}

#[test]
fn identical_input_gives_identical_output() {
    let image = mixed_image(8, 5);
    let run = || {
        let mut blob = DataBlob::new(Vec::new());
        let ops = pipeline()
            .process(&image, image.len() as u64, &mut blob, |_| {})
            .unwrap();
        (ops, blob.into_inner())
    };
    assert_eq!(run(), run());
}

#[test]
fn last_chunk_reads_the_remainder_but_keeps_a_full_extent() {
    // 2.5 chunks: two full chunks and one of two blocks.
    let image = vec![0u8; (2 * CHUNK + 2 * BLOCK) as usize];
    let mut blob = DataBlob::new(Vec::new());
    let mut percents = Vec::new();
    let ops = pipeline()
        .process(&image, image.len() as u64, &mut blob, |p| percents.push(p.percent))
        .unwrap();

    assert_eq!(ops.len(), 3);
    assert_eq!(
        ops[2].dst_extents,
        vec![Extent {
            start_block: 8,
            num_blocks: 4
        }]
    );
    assert_eq!(percents.last(), Some(&100));
}

#[test]
fn truncated_source_is_a_short_read() {
    let image = vec![0u8; (3 * CHUNK - 100) as usize];
    let mut blob = DataBlob::new(Vec::new());
    let result = pipeline().process(&image, 3 * CHUNK, &mut blob, |_| {});
    match result {
        Err(Error::ShortRead { offset, .. }) => assert_eq!(offset, 2 * CHUNK),
        other => panic!("expected short read, got {other:?}"),
    }
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_failure_aborts_the_partition() {
    let image = vec![0u8; 2 * CHUNK as usize];
    let mut blob = DataBlob::new(FailingWriter);
    let result = pipeline().process(&image, image.len() as u64, &mut blob, |_| {});
    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(blob.len(), 0);
}

fn image_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn config(
    rootfs: &NamedTempFile,
    rootfs_size: u64,
    kernel: &NamedTempFile,
    kernel_size: u64,
) -> PayloadGenerationConfig {
    let mut config = PayloadGenerationConfig::new(ImageConfig {
        rootfs: PartitionConfig::new(rootfs.path(), rootfs_size),
        kernel: PartitionConfig::new(kernel.path(), kernel_size),
    });
    config.chunk_size = CHUNK;
    config.block_size = BLOCK;
    config.max_concurrency = 4;
    config
}

#[test]
fn run_processes_rootfs_then_kernel() {
    let rootfs_bytes = mixed_image(6, 6);
    let kernel_bytes = mixed_image(3, 7);
    let rootfs = image_file(&rootfs_bytes);
    let kernel = image_file(&kernel_bytes);
    let config = config(&rootfs, rootfs_bytes.len() as u64, &kernel, kernel_bytes.len() as u64);

    let mut events = Vec::new();
    let mut blob = DataBlob::new(Vec::new());
    let update = generate::run(&config, &mut blob, |partition, p| {
        events.push((partition, p.percent))
    })
    .unwrap();

    assert_eq!(update.graph.len(), 6);
    assert_eq!(update.graph.final_order, (0..6).collect::<Vec<_>>());
    assert_eq!(update.graph.vertices[0].label, "<rootfs-operation-0>");
    assert_eq!(update.graph.vertices[5].label, "<rootfs-operation-5>");
    assert_eq!(update.kernel_ops.len(), 3);

    let all: Vec<Operation> = update
        .graph
        .ordered_ops()
        .chain(update.kernel_ops.iter())
        .cloned()
        .collect();
    assert_contiguous(&all, 0);
    assert_eq!(update.data_size, blob.len());
    assert_eq!(update.data_size, blob.get_ref().len() as u64);

    assert_eq!(update.kernel_ops[0].dst_extents[0].start_block, 0);
    let first_kernel = events.iter().position(|(k, _)| *k == PartitionKind::Kernel).unwrap();
    assert!(events[..first_kernel].iter().all(|(k, _)| *k == PartitionKind::Rootfs));
    assert_eq!(events[first_kernel - 1], (PartitionKind::Rootfs, 100));
    assert_eq!(events.last(), Some(&(PartitionKind::Kernel, 100)));
}

#[test]
fn run_fails_when_rootfs_is_shorter_than_declared() {
    let rootfs = image_file(&vec![0u8; 2 * CHUNK as usize]);
    let kernel = image_file(&vec![0u8; CHUNK as usize]);
    let config = config(&rootfs, 4 * CHUNK, &kernel, CHUNK);

    let mut blob = DataBlob::new(Vec::new());
    let result = generate::run(&config, &mut blob, |_, _| {});
    assert!(matches!(result, Err(Error::ShortRead { .. })));
}

#[test]
fn run_rejects_bad_config_before_touching_files() {
    let rootfs = image_file(&[0u8; 16]);
    let kernel = image_file(&[0u8; 16]);
    let mut config = config(&rootfs, 0, &kernel, 0);
    config.chunk_size = 0;

    let mut blob = DataBlob::new(Vec::new());
    let result = generate::run(&config, &mut blob, |_, _| {});
    assert!(matches!(result, Err(Error::Configuration(_))));
    assert!(blob.is_empty());
}

#[test]
fn run_sources_reads_in_memory_images() {
    let rootfs = mixed_image(2, 8);
    let kernel = vec![0u8; CHUNK as usize];
    let rootfs_file = image_file(&[]);
    let kernel_file = image_file(&[]);
    let config = config(&rootfs_file, rootfs.len() as u64, &kernel_file, kernel.len() as u64);

    let mut blob = DataBlob::new(Vec::new());
    let update = generate::run_sources(&config, &rootfs, &kernel, &mut blob, |_, _| {}).unwrap();
    assert_eq!(update.graph.len(), 2);
    assert_eq!(update.kernel_ops.len(), 1);
    assert_eq!(
        update.kernel_ops[0].kind,
        OperationKind::ReplaceCompressed(Compression::Xz)
    );
}
