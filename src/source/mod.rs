//! Source tree classification
//!
//! Every file the pipeline touches is classified exactly once into a
//! [`SourceKind`]; later stages match on the kind instead of re-deriving it
//! from file name suffixes.

pub mod detector;
pub mod overlay;

pub use detector::{ChangeDetector, ScanFailure, ScanReport};
pub use overlay::{OverlayCollector, RootedFile};

use crate::error::{DevloopError, DevloopResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// First-party source pattern
pub const SOURCE_PATTERN: &str = "**/*.java";
/// Hand-written overrides of transpiler output
pub const OVERLAY_PATTERN: &str = "**/*.native.js";
/// Any script file
pub const SCRIPT_PATTERN: &str = "**/*.js";
/// Dependency archives on the classpath
pub const ARCHIVE_PATTERN: &str = "**/*.{jar,zip}";

/// Suffix shared by every overlay file
pub const OVERLAY_SUFFIX: &str = ".native.js";
/// Suffix shared by every first-party source
pub const SOURCE_SUFFIX: &str = ".java";

/// What role a file plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Compiled, then transpiled
    FirstPartySource,
    /// Layered into the transpile stage next to its source
    NativeOverlay,
    /// Copied verbatim to the output tree
    PlainAsset,
    /// Third-party input materialized into the artifact cache
    DependencyArchive,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FirstPartySource => "source",
            Self::NativeOverlay => "overlay",
            Self::PlainAsset => "asset",
            Self::DependencyArchive => "archive",
        };
        write!(f, "{}", name)
    }
}

/// Matches paths against the fixed naming conventions
#[derive(Debug, Clone)]
pub struct Classifier {
    sources: GlobSet,
    overlays: GlobSet,
    scripts: GlobSet,
    archives: GlobSet,
}

impl Classifier {
    pub fn new() -> DevloopResult<Self> {
        Ok(Self {
            sources: glob_set(SOURCE_PATTERN)?,
            overlays: glob_set(OVERLAY_PATTERN)?,
            scripts: glob_set(SCRIPT_PATTERN)?,
            archives: glob_set(ARCHIVE_PATTERN)?,
        })
    }

    /// Classify a path, or `None` if the pipeline ignores it.
    ///
    /// Overlays are checked before plain scripts: an overlay also matches the
    /// generic script pattern but must never be treated as an asset.
    pub fn classify(&self, path: &Path) -> Option<SourceKind> {
        if self.sources.is_match(path) {
            Some(SourceKind::FirstPartySource)
        } else if self.overlays.is_match(path) {
            Some(SourceKind::NativeOverlay)
        } else if self.scripts.is_match(path) {
            Some(SourceKind::PlainAsset)
        } else if self.archives.is_match(path) {
            Some(SourceKind::DependencyArchive)
        } else {
            None
        }
    }

    /// Every file below `root` whose kind passes `keep`, in path order.
    ///
    /// A missing root yields an empty list.
    pub fn files_in(
        &self,
        root: &Path,
        keep: impl Fn(SourceKind) -> bool,
    ) -> DevloopResult<Vec<PathBuf>> {
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry
                .map_err(|e| DevloopError::io(format!("scanning {}", root.display()), e.into()))?;
            if entry.file_type().is_file() && self.classify(entry.path()).is_some_and(&keep) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

fn glob_set(pattern: &str) -> DevloopResult<GlobSet> {
    let glob = Glob::new(pattern).map_err(|e| DevloopError::Pattern {
        pattern: pattern.to_string(),
        source: e,
    })?;
    GlobSetBuilder::new()
        .add(glob)
        .build()
        .map_err(|e| DevloopError::Pattern {
            pattern: pattern.to_string(),
            source: e,
        })
}

/// A classified file as seen by one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub kind: SourceKind,
}

impl SourceFile {
    /// Path with the kind's suffix removed, used to pair overlays with sources
    pub fn stem_path(&self) -> Option<PathBuf> {
        let suffix = match self.kind {
            SourceKind::FirstPartySource => SOURCE_SUFFIX,
            SourceKind::NativeOverlay => OVERLAY_SUFFIX,
            _ => return None,
        };
        strip_suffix(&self.path, suffix)
    }
}

/// Remove a file name suffix such as `.native.js` from a path
pub fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    let text = path.to_str()?;
    text.strip_suffix(suffix).map(PathBuf::from)
}
