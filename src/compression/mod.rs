// src/compression/mod.rs
//! Payload compression
//!
//! Stored payloads are gzip streams written with a fixed header: no file
//! name, zero modification time, maximum compression and an "unknown"
//! operating system byte. Compressing the same bytes twice therefore yields
//! the same file, so the compressed hash (`chash`) is stable across
//! publications.

use std::io::{self, Read, Write};
use thiserror::Error;

use flate2::Compression;
use flate2::GzBuilder;

/// Header every stored payload starts with
pub const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0xff];

/// Compression-related errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to compress {format} data: {source}")]
    Compression {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to decompress {format} data: {source}")]
    Decompression {
        format: &'static str,
        source: io::Error,
    },
}

/// Formats a stored object may be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression (raw data)
    None,
    /// Gzip compression (.gz)
    Gzip,
}

impl CompressionFormat {
    /// Detect compression format from magic bytes
    ///
    /// Gzip streams start with `1f 8b`; anything else is treated as raw.
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            Self::Gzip
        } else {
            Self::None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Create a decompressing reader for the given format
pub fn create_decoder<'a, R: Read + Send + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Box<dyn Read + Send + 'a> {
    match format {
        CompressionFormat::None => Box::new(reader),
        CompressionFormat::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
    }
}

/// Decompress a byte slice, detecting the format from its magic bytes
pub fn decompress_auto(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let format = CompressionFormat::from_magic_bytes(data);
    let mut output = Vec::new();
    create_decoder(data, format)
        .read_to_end(&mut output)
        .map_err(|e| CompressionError::Decompression {
            format: format.name(),
            source: e,
        })?;
    Ok(output)
}

/// Stream `reader` into `writer` as deterministic gzip
///
/// Returns the number of uncompressed bytes consumed.
pub fn compress_to<R: Read, W: Write>(reader: &mut R, writer: W) -> Result<u64, CompressionError> {
    let wrap = |source| CompressionError::Compression {
        format: "gzip",
        source,
    };
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(writer, Compression::best());
    let n = io::copy(reader, &mut encoder).map_err(wrap)?;
    encoder.finish().map_err(wrap)?;
    Ok(n)
}

/// Whether `data` starts with the header [`compress`] writes
///
/// Objects that fail this were stored raw or by another gzip writer and do
/// not have stable compressed hashes.
pub fn is_pkg_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_HEADER)
}

/// Deterministic gzip of a byte slice
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut out = Vec::new();
    compress_to(&mut &data[..], &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f, 0x8b, 0x08]),
            CompressionFormat::Gzip
        );
        assert_eq!(CompressionFormat::from_magic_bytes(b"plain"), CompressionFormat::None);
        assert_eq!(CompressionFormat::from_magic_bytes(&[0x1f]), CompressionFormat::None);
    }

    #[test]
    fn test_header_is_fixed() {
        let out = compress(b"payload bytes").unwrap();
        assert_eq!(&out[..10], &GZIP_HEADER);
        assert!(is_pkg_gzip(&out));
    }

    #[test]
    fn test_foreign_gzip_is_not_pkg_gzip() {
        let mut out = Vec::new();
        let mut encoder = GzBuilder::new()
            .mtime(1_700_000_000)
            .write(&mut out, Compression::default());
        encoder.write_all(b"payload bytes").unwrap();
        encoder.finish().unwrap();

        assert_eq!(CompressionFormat::from_magic_bytes(&out), CompressionFormat::Gzip);
        assert!(!is_pkg_gzip(&out));
        assert!(!is_pkg_gzip(b"payload bytes"));
    }

    #[test]
    fn test_compression_is_deterministic() {
        let data = vec![42u8; 100_000];
        assert_eq!(compress(&data).unwrap(), compress(&data).unwrap());
    }

    #[test]
    fn test_decompress_auto() {
        let data = b"The quick brown fox".repeat(50);
        let packed = compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress_auto(&packed).unwrap(), data);
        assert_eq!(decompress_auto(b"raw").unwrap(), b"raw");
    }

    #[test]
    fn test_compress_to_counts_input() {
        let mut sink = Vec::new();
        let n = compress_to(&mut &b"12345"[..], &mut sink).unwrap();
        assert_eq!(n, 5);
    }
}
