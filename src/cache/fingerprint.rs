//! Content fingerprints for dependency inputs
//!
//! Same bytes = same fingerprint = same cache entry.

use crate::error::{DevloopError, DevloopResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

/// SHA-256 digest of a file's bytes, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex encoding
    pub const HEX_LEN: usize = 64;

    /// Hash a file's contents, streaming so large archives stay out of memory
    pub fn of_file(path: &Path) -> DevloopResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| DevloopError::io(format!("opening {}", path.display()), e))?;

        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)
            .map_err(|e| DevloopError::io(format!("hashing {}", path.display()), e))?;

        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Hash an in-memory buffer
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Parse a hex digest, e.g. from a cache file name
    pub fn parse(hex: &str) -> Option<Self> {
        (hex.len() == Self::HEX_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .then(|| Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn fingerprint_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dep.jar");
        fs::write(&path, b"archive bytes").unwrap();

        let a = Fingerprint::of_file(&path).unwrap();
        let b = Fingerprint::of_file(&path).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), Fingerprint::HEX_LEN);
        assert_eq!(a, Fingerprint::of_bytes(b"archive bytes"));
    }

    #[test]
    fn single_byte_change_changes_fingerprint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dep.jar");

        fs::write(&path, b"archive bytes 1").unwrap();
        let before = Fingerprint::of_file(&path).unwrap();
        fs::write(&path, b"archive bytes 2").unwrap();
        let after = Fingerprint::of_file(&path).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn parse_rejects_non_digests() {
        let fp = Fingerprint::of_bytes(b"x");
        assert_eq!(Fingerprint::parse(fp.as_str()), Some(fp.clone()));
        assert_eq!(fp.short().len(), 12);
        assert!(Fingerprint::parse("abc123").is_none());
        assert!(Fingerprint::parse(&"z".repeat(64)).is_none());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Fingerprint::of_file(Path::new("/definitely/not/here.jar")).unwrap_err();
        assert!(matches!(err, DevloopError::Io { .. }));
    }
}
