//! Records produced by a run: operations, their destination extents, and the
//! containers they are collected in.
use crate::codec::Compression;
use crate::error::Result;
use std::fmt;
use std::io::Write;

/// How an operation's payload bytes are to be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// The payload is the raw destination data.
    Replace,
    /// The payload must be decompressed with the given codec first.
    ReplaceCompressed(Compression),
}

/// A contiguous run of destination blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub start_block: u64,
    pub num_blocks: u64,
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_block, self.num_blocks)
    }
}

/// One unit of the update payload.
///
/// `data_offset` and `data_length` locate the operation's bytes in the data
/// blob; the ranges of consecutive operations are adjacent and never overlap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub data_offset: u64,
    pub data_length: u64,
    pub dst_extents: Vec<Extent>,
}

/// A graph node wrapping one operation and its label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vertex {
    pub label: String,
    pub op: Operation,
}

/// Operations for the rootfs partition.
///
/// A full update has no dependencies between operations, so `final_order`
/// is always the insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationGraph {
    pub vertices: Vec<Vertex>,
    pub final_order: Vec<usize>,
}

impl OperationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a vertex and schedules it last. Returns its index.
    pub fn push(&mut self, label: String, op: Operation) -> usize {
        self.vertices.push(Vertex { label, op });
        let index = self.vertices.len() - 1;
        self.final_order.push(index);
        index
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Iterates operations in final order.
    pub fn ordered_ops(&self) -> impl Iterator<Item = &Operation> {
        self.final_order.iter().map(|&i| &self.vertices[i].op)
    }
}

/// Label of the `index`-th rootfs operation.
pub fn rootfs_label(index: usize) -> String {
    format!("<rootfs-operation-{index}>")
}

/// The output stream all operation payloads are appended to, together with
/// its running length.
pub struct DataBlob<W> {
    inner: W,
    len: u64,
}

impl<W: Write> DataBlob<W> {
    pub fn new(inner: W) -> Self {
        Self::with_offset(inner, 0)
    }

    /// Wraps a stream that already holds `len` bytes of payload data.
    pub fn with_offset(inner: W, len: u64) -> Self {
        Self { inner, len }
    }

    /// Writes `bytes` at the end of the blob and returns the offset they
    /// start at.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let offset = self.len;
        self.inner.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(offset)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(offset: u64) -> Operation {
        Operation {
            kind: OperationKind::Replace,
            data_offset: offset,
            data_length: 1,
            dst_extents: vec![Extent {
                start_block: offset,
                num_blocks: 1,
            }],
        }
    }

    #[test]
    fn graph_final_order_follows_insertion() {
        let mut graph = OperationGraph::new();
        for i in 0..3 {
            assert_eq!(graph.push(rootfs_label(i), op(i as u64)), i);
        }
        assert_eq!(graph.final_order, vec![0, 1, 2]);
        assert_eq!(graph.vertices[2].label, "<rootfs-operation-2>");
        let offsets: Vec<u64> = graph.ordered_ops().map(|o| o.data_offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn blob_hands_out_adjacent_offsets() {
        let mut blob = DataBlob::with_offset(Vec::new(), 100);
        assert_eq!(blob.append(b"abc").unwrap(), 100);
        assert_eq!(blob.append(b"de").unwrap(), 103);
        assert_eq!(blob.len(), 105);
        assert_eq!(blob.into_inner(), b"abcde");
    }

    #[test]
    fn extent_display() {
        let extent = Extent {
            start_block: 2,
            num_blocks: 512,
        };
        assert_eq!(extent.to_string(), "2:512");
    }
}
