//! General-purpose lossless codecs a chunk can be compressed with.
//!
//! Codec parameters are fixed. The only decision made elsewhere is whether the
//! compressed bytes are worth keeping at all.
use crate::error::{Error, Result};
use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use xz2::write::XzEncoder;

const XZ_PRESET: u32 = 6;
const ZSTD_LEVEL: i32 = 19;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    #[default]
    Xz,
    Zstd,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Compresses `data` into a freshly allocated buffer.
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        self.encode(data)
            .map_err(|source| Error::Compression { codec: self, source })
    }

    fn encode(self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Compression::Xz => {
                let mut encoder = XzEncoder::new(Vec::new(), XZ_PRESET);
                encoder.write_all(data)?;
                encoder.finish()
            }
            Compression::Zstd => zstd::bulk::compress(data, ZSTD_LEVEL),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::best());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Compression::Bzip2 => {
                let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::best());
                encoder.write_all(data)?;
                encoder.finish()
            }
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::Xz => "xz",
            Compression::Zstd => "zstd",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
        };
        f.write_str(name)
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "xz" => Ok(Compression::Xz),
            "zst" | "zstd" => Ok(Compression::Zstd),
            "gz" | "gzip" => Ok(Compression::Gzip),
            "bz2" | "bzip2" => Ok(Compression::Bzip2),
            other => Err(Error::Configuration(format!(
                "unknown compression '{other}' (expected xz, zstd, gzip or bzip2)"
            ))),
        }
    }
}
