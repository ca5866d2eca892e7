//! Native overlay collection and plain asset pass-through

use crate::config::OverlayPolicy;
use crate::error::{DevloopError, DevloopResult};
use crate::source::{strip_suffix, Classifier, SourceFile, SourceKind, OVERLAY_SUFFIX};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// A file paired with its path relative to the root it was found under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootedFile {
    pub path: PathBuf,
    pub relative: PathBuf,
}

/// Collects overlays and plain assets from the source roots
pub struct OverlayCollector {
    roots: Vec<PathBuf>,
    classifier: Classifier,
}

impl OverlayCollector {
    pub fn new(roots: Vec<PathBuf>, classifier: Classifier) -> Self {
        Self { roots, classifier }
    }

    /// Collect overlays for the transpile stage.
    ///
    /// With [`OverlayPolicy::All`] every overlay present is returned, whether
    /// or not its source changed this cycle. [`OverlayPolicy::Changed`] keeps
    /// only overlays whose source is in `changed`.
    pub fn collect(
        &self,
        policy: OverlayPolicy,
        changed: &[SourceFile],
    ) -> DevloopResult<Vec<RootedFile>> {
        let overlays = self.walk(SourceKind::NativeOverlay)?;

        let overlays = match policy {
            OverlayPolicy::All => overlays,
            OverlayPolicy::Changed => {
                let stems: HashSet<PathBuf> =
                    changed.iter().filter_map(SourceFile::stem_path).collect();
                overlays
                    .into_iter()
                    .filter(|o| {
                        strip_suffix(&o.path, OVERLAY_SUFFIX).is_some_and(|s| stems.contains(&s))
                    })
                    .collect()
            }
        };

        debug!("Collected {} overlays ({:?})", overlays.len(), policy);
        Ok(overlays)
    }

    /// Plain scripts that are not overlays
    pub fn plain_assets(&self) -> DevloopResult<Vec<RootedFile>> {
        self.walk(SourceKind::PlainAsset)
    }

    /// Copy every plain asset into `dest`, keeping its root-relative path.
    ///
    /// Returns the number of files copied.
    pub fn copy_plain_assets(&self, dest: &Path) -> DevloopResult<usize> {
        let assets = self.plain_assets()?;
        for asset in &assets {
            let target = dest.join(&asset.relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    DevloopError::io(format!("creating directory {}", parent.display()), e)
                })?;
            }
            fs::copy(&asset.path, &target).map_err(|e| {
                DevloopError::io(
                    format!(
                        "copying {} to {}",
                        asset.path.display(),
                        target.display()
                    ),
                    e,
                )
            })?;
        }
        Ok(assets.len())
    }

    fn walk(&self, kind: SourceKind) -> DevloopResult<Vec<RootedFile>> {
        let mut found = Vec::new();
        for root in &self.roots {
            for entry in WalkDir::new(root).follow_links(true) {
                let entry = entry.map_err(|e| {
                    DevloopError::io(format!("scanning {}", root.display()), e.into())
                })?;
                if !entry.file_type().is_file() || self.classifier.classify(entry.path()) != Some(kind)
                {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .map_err(|_| {
                        DevloopError::Internal(format!(
                            "{} escaped root {}",
                            entry.path().display(),
                            root.display()
                        ))
                    })?
                    .to_path_buf();
                found.push(RootedFile {
                    path: entry.into_path(),
                    relative,
                });
            }
        }
        Ok(found)
    }
}
