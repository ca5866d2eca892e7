//! Persistent input store handed to the bundler
//!
//! Maps every bundler input to a freshness token. A token compares equal
//! across cycles while the file is unchanged, so the bundler can reuse what
//! it parsed last time. Records are never removed: a deleted file is simply
//! no longer referenced by the bundle.

use crate::cache::Fingerprint;
use crate::config::FreshnessPolicy;
use crate::error::{DevloopError, DevloopResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Opaque freshness marker for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreshnessToken {
    /// Content digest; changes iff the bytes change
    Digest(Fingerprint),
    /// Modification time in milliseconds since the epoch
    Timestamp(u128),
}

impl FreshnessToken {
    /// Compute the token for a file under `policy`
    pub fn for_file(path: &Path, policy: FreshnessPolicy) -> DevloopResult<Self> {
        match policy {
            FreshnessPolicy::Digest => Ok(Self::Digest(Fingerprint::of_file(path)?)),
            FreshnessPolicy::Timestamp => {
                let modified = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .map_err(|e| DevloopError::io(format!("reading mtime of {}", path.display()), e))?;
                let millis = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or(0);
                Ok(Self::Timestamp(millis))
            }
        }
    }
}

impl fmt::Display for FreshnessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digest(fp) => write!(f, "sha256:{}", fp),
            Self::Timestamp(ms) => write!(f, "mtime:{}", ms),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    path: String,
    token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    inputs: Vec<ManifestEntry>,
}

/// Input identity -> freshness token, owned by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct PersistentInputStore {
    inputs: BTreeMap<String, FreshnessToken>,
}

impl PersistentInputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current token for `input`.
    ///
    /// Returns true if the input is new or its token changed.
    pub fn register(&mut self, input: impl Into<String>, token: FreshnessToken) -> bool {
        let input = input.into();
        match self.inputs.get(&input) {
            Some(existing) if *existing == token => false,
            _ => {
                self.inputs.insert(input, token);
                true
            }
        }
    }

    /// Register a file by path, computing its token
    pub fn register_file(&mut self, path: &Path, policy: FreshnessPolicy) -> DevloopResult<bool> {
        let token = FreshnessToken::for_file(path, policy)?;
        Ok(self.register(path.to_string_lossy(), token))
    }

    pub fn token(&self, input: &str) -> Option<&FreshnessToken> {
        self.inputs.get(input)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Write the store as JSON for an external bundler
    pub fn write_manifest(&self, path: &Path) -> DevloopResult<()> {
        let manifest = Manifest {
            inputs: self
                .inputs
                .iter()
                .map(|(path, token)| ManifestEntry {
                    path: path.clone(),
                    token: token.to_string(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&manifest)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DevloopError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::write(path, json)
            .map_err(|e| DevloopError::io(format!("writing input store {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unchanged_file_keeps_token() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Foo.js");
        fs::write(&file, "var a;").unwrap();

        let mut store = PersistentInputStore::new();
        assert!(store.register_file(&file, FreshnessPolicy::Digest).unwrap());
        assert!(!store.register_file(&file, FreshnessPolicy::Digest).unwrap());

        fs::write(&file, "var b;").unwrap();
        assert!(store.register_file(&file, FreshnessPolicy::Digest).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn deleted_inputs_are_kept() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Gone.js");
        fs::write(&file, "x").unwrap();

        let mut store = PersistentInputStore::new();
        store.register_file(&file, FreshnessPolicy::Digest).unwrap();
        fs::remove_file(&file).unwrap();

        assert!(store.token(&file.to_string_lossy()).is_some());
    }

    #[test]
    fn timestamp_token() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Foo.js");
        fs::write(&file, "x").unwrap();

        let token = FreshnessToken::for_file(&file, FreshnessPolicy::Timestamp).unwrap();
        assert!(matches!(token, FreshnessToken::Timestamp(ms) if ms > 0));
        assert!(token.to_string().starts_with("mtime:"));
    }

    #[test]
    fn manifest_lists_every_input() {
        let dir = TempDir::new().unwrap();
        let mut store = PersistentInputStore::new();
        store.register("a.js", FreshnessToken::Digest(Fingerprint::of_bytes(b"a")));
        store.register("b.js", FreshnessToken::Timestamp(42));

        let path = dir.path().join("state/store.json");
        store.write_manifest(&path).unwrap();

        let manifest: Manifest = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(manifest.inputs.len(), 2);
        assert_eq!(manifest.inputs[0].path, "a.js");
        assert!(manifest.inputs[0].token.starts_with("sha256:"));
        assert_eq!(manifest.inputs[1].token, "mtime:42");
    }
}
