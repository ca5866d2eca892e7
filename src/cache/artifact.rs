//! On-disk store of materialized dependency artifacts
//!
//! Each artifact lives at `<cache_dir>/<fingerprint>-<file name>.cache`.
//! Writers build the archive under `<cache_dir>/.tmp/` and publish it with a
//! single link/rename, so a reader (possibly another devloop process) never
//! observes a half-written entry under its final name.

use crate::cache::fingerprint::Fingerprint;
use crate::error::{DevloopError, DevloopResult};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extension of published artifacts
pub const ARTIFACT_EXT: &str = "cache";

/// Scratch directory for in-progress writes
const TMP_DIR: &str = ".tmp";

/// A published cache entry
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub fingerprint: Fingerprint,
    /// File name of the dependency the artifact was built from
    pub source_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl CachedArtifact {
    /// Parse an artifact from its path on disk
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let stem = file_name.strip_suffix(&format!(".{}", ARTIFACT_EXT))?;
        let (hex, source_name) = stem.split_once('-')?;
        let fingerprint = Fingerprint::parse(hex)?;

        let metadata = fs::metadata(path).ok()?;
        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Some(Self {
            fingerprint,
            source_name: source_name.to_string(),
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            created_at,
        })
    }
}

/// Content-addressed artifact store; the only writer of the cache directory
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    /// Open (creating if needed) the cache directory
    pub fn open(dir: &Path) -> DevloopResult<Self> {
        if dir.exists() && !dir.is_dir() {
            return Err(DevloopError::NotADirectory(dir.to_path_buf()));
        }
        let tmp = dir.join(TMP_DIR);
        fs::create_dir_all(&tmp).map_err(|e| DevloopError::DirCreate {
            path: tmp.clone(),
            source: e,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path for the artifact of `source_name` with `fingerprint`
    pub fn entry_path(&self, fingerprint: &Fingerprint, source_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{}.{}", fingerprint, source_name, ARTIFACT_EXT))
    }

    /// Look up a published artifact
    pub fn lookup(&self, fingerprint: &Fingerprint, source_name: &str) -> Option<CachedArtifact> {
        let path = self.entry_path(fingerprint, source_name);
        if !path.is_file() {
            return None;
        }
        CachedArtifact::from_path(&path)
    }

    /// Reserve a temp file for a new artifact.
    ///
    /// Nothing becomes visible under the final name until
    /// [`PendingArtifact::publish`] succeeds.
    pub fn begin(&self, fingerprint: &Fingerprint, source_name: &str) -> PendingArtifact {
        let temp = self.dir.join(TMP_DIR).join(format!(
            "{}-{}.{}",
            fingerprint.short(),
            uuid::Uuid::new_v4(),
            ARTIFACT_EXT
        ));
        PendingArtifact {
            temp,
            target: self.entry_path(fingerprint, source_name),
            published: false,
        }
    }

    /// All published artifacts, newest first
    pub fn list(&self) -> DevloopResult<Vec<CachedArtifact>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            DevloopError::io(format!("reading cache directory {}", self.dir.display()), e)
        })?;

        let mut artifacts: Vec<CachedArtifact> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|e| CachedArtifact::from_path(&e.path()))
            .collect();

        artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(artifacts)
    }

    /// Remove every published artifact and leftover temp file.
    ///
    /// Returns the number of artifacts removed.
    pub fn clear(&self) -> DevloopResult<usize> {
        let artifacts = self.list()?;
        for artifact in &artifacts {
            fs::remove_file(&artifact.path).map_err(|e| {
                DevloopError::io(format!("removing {}", artifact.path.display()), e)
            })?;
        }
        self.sweep_temp();
        Ok(artifacts.len())
    }

    /// Delete temp files left behind by interrupted writers.
    ///
    /// Only call this when no other process is writing to the cache.
    pub fn sweep_temp(&self) -> usize {
        let Ok(entries) = fs::read_dir(self.dir.join(TMP_DIR)) else {
            return 0;
        };
        let mut removed = 0;
        for entry in entries.filter_map(Result::ok) {
            if fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Removed {} stale temp files from artifact cache", removed);
        }
        removed
    }
}

/// An artifact being written; removed on drop unless published
#[derive(Debug)]
pub struct PendingArtifact {
    temp: PathBuf,
    target: PathBuf,
    published: bool,
}

impl PendingArtifact {
    /// Where the writer should put the archive bytes
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Atomically move the finished archive to its final name.
    ///
    /// The first publisher wins: if another writer already published the same
    /// fingerprint, this write is dropped and the existing entry returned.
    pub fn publish(mut self) -> DevloopResult<CachedArtifact> {
        match fs::hard_link(&self.temp, &self.target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(
                    "Artifact {} already published by another writer",
                    self.target.display()
                );
            }
            // Filesystems without hard links: rename is still atomic
            Err(_) => {
                fs::rename(&self.temp, &self.target).map_err(|e| DevloopError::CachePublish {
                    path: self.target.clone(),
                    source: e,
                })?;
            }
        }
        self.published = true;
        let _ = fs::remove_file(&self.temp);

        CachedArtifact::from_path(&self.target).ok_or_else(|| {
            DevloopError::Internal(format!(
                "published artifact {} is unreadable",
                self.target.display()
            ))
        })
    }

    /// Drop the in-progress write
    pub fn discard(self) {
        drop(self);
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        if let Err(e) = fs::remove_file(&self.temp) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove temp artifact {}: {}", self.temp.display(), e);
            }
        }
    }
}
