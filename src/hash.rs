// src/hash.rs

//! Hash algorithms used by package content and manifest signatures
//!
//! pkg5 repositories identify payloads by several digests at once. The legacy
//! `hash`/`chash`/`elfhash` attributes are SHA-1; newer attributes carry the
//! algorithm in their name (`pkg.hash.sha256`, `gelf:sha512t_256`, ...).
//! Signature actions may additionally use SHA-384 and SHA-512.
//!
//! | Algorithm | Name | Used by |
//! |-----------|------|---------|
//! | SHA-1 | `sha1` | `hash`, `chash`, `elfhash`, manifest checksums |
//! | SHA-256 | `sha256` | `pkg.hash.sha256`, `gelf:sha256`, signatures |
//! | SHA-512/256 | `sha512t_256` | `pkg.hash.sha512_256`, `gelf:sha512t_256` |
//! | SHA-384, SHA-512 | `sha384`, `sha512` | signature `algorithm` values |

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512, Sha512_256};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;
use thiserror::Error;

/// Read buffer size used when streaming payloads through a hasher
pub const BLOCK_SIZE: usize = 8192;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-1, the legacy default for every unnamed hash attribute
    #[default]
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    /// SHA-512 truncated to 256 bits
    Sha512_256,
}

impl HashAlgorithm {
    /// Get the hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 | Self::Sha512_256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Get the hash output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    /// Get the algorithm name as a string
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Sha512_256 => "sha512t_256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha384" | "sha-384" => Ok(Self::Sha384),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            "sha512t_256" | "sha512_256" | "sha512/256" => Ok(Self::Sha512_256),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Hash computation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("unknown hash kind: {0}")]
    UnknownHashKind(String),

    #[error("invalid hash length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("invalid hex in hash: {0}")]
    InvalidHex(String),

    #[error("{algorithm} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },
}

/// A hash value with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub value: String,
}

impl Hash {
    /// Create a hash value, validating length and hex digits
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        let expected_len = algorithm.hex_len();

        if value.len() != expected_len {
            return Err(HashError::InvalidLength {
                expected: expected_len,
                got: value.len(),
            });
        }

        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value));
        }

        Ok(Self {
            algorithm,
            value: value.to_lowercase(),
        })
    }

    fn new_unchecked(algorithm: HashAlgorithm, value: String) -> Self {
        Self { algorithm, value }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Streaming hasher over any supported algorithm
#[derive(Clone)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

#[derive(Clone)]
enum HasherState {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Sha512_256(Sha512_256),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => HasherState::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => HasherState::Sha512(Sha512::new()),
            HashAlgorithm::Sha512_256 => HasherState::Sha512_256(Sha512_256::new()),
        };
        Self { algorithm, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha1(h) => h.update(data),
            HasherState::Sha256(h) => h.update(data),
            HasherState::Sha384(h) => h.update(data),
            HasherState::Sha512(h) => h.update(data),
            HasherState::Sha512_256(h) => h.update(data),
        }
    }

    /// Finalize into raw digest bytes
    pub fn finalize_bytes(self) -> Vec<u8> {
        match self.state {
            HasherState::Sha1(h) => h.finalize().to_vec(),
            HasherState::Sha256(h) => h.finalize().to_vec(),
            HasherState::Sha384(h) => h.finalize().to_vec(),
            HasherState::Sha512(h) => h.finalize().to_vec(),
            HasherState::Sha512_256(h) => h.finalize().to_vec(),
        }
    }

    /// Finalize into a hex [`Hash`]
    pub fn finalize(self) -> Hash {
        let algorithm = self.algorithm;
        Hash::new_unchecked(algorithm, hex::encode(self.finalize_bytes()))
    }

    #[inline]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

/// Compute hash of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute hash of data from a reader
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<Hash> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; BLOCK_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// SHA-1 hex digest, the default for legacy attributes
#[inline]
pub fn sha1(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha1, data).value
}

#[inline]
pub fn sha256(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, data).value
}

/// Verify bytes match an expected hex digest
pub fn verify_bytes(data: &[u8], expected: &str, algorithm: HashAlgorithm) -> Result<(), HashError> {
    let actual = hash_bytes(algorithm, data);
    if actual.value == expected.to_lowercase() {
        Ok(())
    } else {
        Err(HashError::Mismatch {
            algorithm,
            expected: expected.to_string(),
            actual: actual.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_known_values() {
        assert_eq!(sha1(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(sha1(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_sha256_hash() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");
        assert_eq!(hash.algorithm, HashAlgorithm::Sha256);
        assert_eq!(
            hash.value,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_output_lengths() {
        for alg in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
            HashAlgorithm::Sha512_256,
        ] {
            assert_eq!(hash_bytes(alg, b"payload").value.len(), alg.hex_len());
        }
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!(
            "sha512_256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha512_256
        );
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_hash_reader_matches_hash_bytes() {
        let data = vec![7u8; BLOCK_SIZE * 3 + 17];
        let streamed = hash_reader(HashAlgorithm::Sha1, &mut data.as_slice()).unwrap();
        assert_eq!(streamed, hash_bytes(HashAlgorithm::Sha1, &data));
    }

    #[test]
    fn test_hash_new_validation() {
        assert!(Hash::new(HashAlgorithm::Sha1, "abc").is_err());
        assert!(Hash::new(HashAlgorithm::Sha1, "z".repeat(40)).is_err());
        let h = Hash::new(HashAlgorithm::Sha1, "A".repeat(40)).unwrap();
        assert_eq!(h.as_str(), "a".repeat(40));
    }

    #[test]
    fn test_verify_bytes() {
        let data = b"hello world";
        let good = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert!(verify_bytes(data, good, HashAlgorithm::Sha256).is_ok());
        assert!(matches!(
            verify_bytes(data, "00", HashAlgorithm::Sha256),
            Err(HashError::Mismatch { .. })
        ));
    }
}
