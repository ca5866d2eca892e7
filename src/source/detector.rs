//! Modification-time change detection
//!
//! Polls the source roots and reports first-party sources whose mtime is
//! strictly newer than the committed watermark. Filesystems with coarse
//! timestamps may delay pickup of an edit by one cycle.

use crate::source::{Classifier, SourceFile, SourceKind};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

/// A root whose scan was cut short
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub root: PathBuf,
    pub reason: String,
}

/// Result of one poll over all roots
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Sources newer than the watermark
    pub modified: Vec<SourceFile>,
    /// Roots that could not be fully read
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Finds first-party sources modified after a watermark
pub struct ChangeDetector {
    roots: Vec<PathBuf>,
    classifier: Classifier,
}

impl ChangeDetector {
    pub fn new(roots: Vec<PathBuf>, classifier: Classifier) -> Self {
        Self { roots, classifier }
    }

    /// Scan every root for sources modified strictly after `watermark`.
    ///
    /// An unreadable directory stops the scan of its root and is recorded in
    /// the report; other roots are still scanned.
    pub fn scan(&self, watermark: SystemTime) -> ScanReport {
        let mut report = ScanReport::default();

        for root in &self.roots {
            for entry in WalkDir::new(root).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        report.failures.push(ScanFailure {
                            root: root.clone(),
                            reason: e.to_string(),
                        });
                        break;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }
                if self.classifier.classify(entry.path()) != Some(SourceKind::FirstPartySource) {
                    continue;
                }

                let modified = match entry.metadata().map(|m| m.modified()) {
                    Ok(Ok(modified)) => modified,
                    Ok(Err(e)) => {
                        report.failures.push(ScanFailure {
                            root: root.clone(),
                            reason: format!("{}: {}", entry.path().display(), e),
                        });
                        break;
                    }
                    Err(e) => {
                        report.failures.push(ScanFailure {
                            root: root.clone(),
                            reason: e.to_string(),
                        });
                        break;
                    }
                };

                if modified > watermark {
                    report.modified.push(SourceFile {
                        path: entry.into_path(),
                        modified,
                        kind: SourceKind::FirstPartySource,
                    });
                }
            }
        }

        debug!(
            "Scan found {} modified sources across {} roots",
            report.modified.len(),
            self.roots.len()
        );
        report
    }
}
