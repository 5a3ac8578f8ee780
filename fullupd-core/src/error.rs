//! The error type shared by every stage of payload generation.
//!
//! Every variant is fatal to a run. Nothing is retried and partially written
//! output must be discarded by the caller.

use crate::codec::Compression;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The generation config was rejected before any I/O happened.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Opening, reading or writing a source image or the output stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The source returned fewer bytes than the chunk asked for. This usually
    /// means the image is truncated or its declared size is wrong.
    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("{codec} compression failed: {source}")]
    Compression {
        codec: Compression,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
