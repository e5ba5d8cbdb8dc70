//! Picks a decompressor for a Debian archive member from its file name.

use std::io::Read;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use crate::error::{ErrorContext, PackageError, Result};

/// Codecs a `control.tar.*` member may use.
///
/// Discriminants follow the ZIP method numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionMethod {
    None = 0,
    Deflate = 8,
    BZip2 = 12,
    Lzma = 14,
    Zstd = 93,
    Xz = 95,
}

impl CompressionMethod {
    /// Maps a member name such as `control.tar.xz` to its codec.
    ///
    /// Anything without a recognized `.tar.*` suffix is treated as uncompressed.
    pub fn from_file_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".tar.gz") {
            Self::Deflate
        } else if name.ends_with(".tar.xz") {
            Self::Xz
        } else if name.ends_with(".tar.bz2") {
            Self::BZip2
        } else if name.ends_with(".tar.lzma") {
            Self::Lzma
        } else if name.ends_with(".tar.zst") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Lzma | Self::Zstd)
    }

    /// Wraps `reader` in the matching decoder.
    ///
    /// # Errors
    ///
    /// [`PackageError::Unsupported`] for LZMA and Zstd; raw bytes are never passed through
    /// for those.
    pub fn decoder<'a, R: Read + 'a>(self, reader: R) -> Result<Box<dyn Read + 'a>> {
        match self {
            Self::None => Ok(Box::new(reader)),
            Self::Deflate => Ok(Box::new(GzDecoder::new(reader))),
            Self::BZip2 => Ok(Box::new(BzDecoder::new(reader))),
            Self::Xz => Ok(Box::new(XzDecoder::new(reader))),
            Self::Lzma => Err(PackageError::Unsupported("LZMA compression".into())),
            Self::Zstd => Err(PackageError::Unsupported("Zstandard compression".into())),
        }
    }

    /// Decompresses `data` fully, refusing output above `limit` bytes.
    pub fn decompress(self, data: &[u8], limit: u64) -> Result<Vec<u8>> {
        let decoder = self.decoder(data)?;
        let mut out = Vec::new();
        decoder
            .take(limit.saturating_add(1))
            .read_to_end(&mut out)
            .with_context(|| format!("decompressing {self:?} stream"))?;

        if out.len() as u64 > limit {
            return Err(PackageError::invalid(
                "deb",
                format!("decompressed member exceeds {limit} bytes"),
            ));
        }
        Ok(out)
    }
}
