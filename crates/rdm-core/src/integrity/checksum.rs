//! `algorithm:hexhash` parsing and file hashing.
//!
//! Hashing happens after publish, never inline with the transfer.

use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::ChecksumError;

const BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(Algorithm::Md5),
            "sha1" => Some(Algorithm::Sha1),
            "sha256" => Some(Algorithm::Sha256),
            "sha512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    /// Digest length in hex digits.
    pub fn hex_len(self) -> usize {
        match self {
            Algorithm::Md5 => 32,
            Algorithm::Sha1 => 40,
            Algorithm::Sha256 => 64,
            Algorithm::Sha512 => 128,
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, Algorithm::Sha256 | Algorithm::Sha512)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        })
    }
}

/// A validated expected checksum with a supported algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    algorithm: Algorithm,
    /// Normalised lowercase hex.
    hex: String,
}

impl Checksum {
    /// Parse `"algorithm:hexhash"`. The algorithm is case-insensitive; the hash
    /// may contain whitespace, `:` or `-` separators and either letter case.
    pub fn parse(s: &str) -> Result<Self, ChecksumError> {
        let (name, hash) = s
            .split_once(':')
            .ok_or_else(|| ChecksumError::Format(s.to_string()))?;
        let algorithm = Algorithm::from_name(name.trim())
            .ok_or_else(|| ChecksumError::UnknownAlgorithm(name.trim().to_string()))?;
        let hex = normalize_hex(hash);
        if hex.is_empty() {
            return Err(ChecksumError::Format(s.to_string()));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ChecksumError::InvalidHex(hash.trim().to_string()));
        }
        if hex.len() != algorithm.hex_len() {
            return Err(ChecksumError::Length {
                algorithm,
                expected: algorithm.hex_len(),
                actual: hex.len(),
            });
        }
        if !algorithm.is_supported() {
            return Err(ChecksumError::Unsupported(algorithm));
        }
        Ok(Self { algorithm, hex })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Hash `path` with this checksum's algorithm, as lowercase hex.
    pub fn compute(&self, path: &Path) -> Result<String, ChecksumError> {
        match self.algorithm {
            Algorithm::Sha256 => digest_path::<Sha256>(path),
            Algorithm::Sha512 => digest_path::<Sha512>(path),
            other => Err(ChecksumError::Unsupported(other)),
        }
    }

    /// Whether the file at `path` hashes to this checksum.
    pub fn matches(&self, path: &Path) -> Result<bool, ChecksumError> {
        Ok(self.compute(path)? == self.hex)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl std::str::FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Checksum::parse(s)
    }
}

/// Parse `expected` and check the file at `path` against it.
pub fn verify(path: &Path, expected: &str) -> Result<bool, ChecksumError> {
    Checksum::parse(expected)?.matches(path)
}

fn normalize_hex(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Hash a file in fixed-size chunks; memory use does not grow with file size.
fn digest_path<D: Digest>(path: &Path) -> Result<String, ChecksumError> {
    let io_err = |source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut f = File::open(path).map_err(io_err)?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
