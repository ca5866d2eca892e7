//! Persistent artifact cache for dependency materialization
//!
//! Provides content-addressed caching keyed by archive fingerprints.
//! Entries are immutable once published.
//!
//! # Invariants
//!
//! - Cache keys are the SHA-256 of the dependency archive
//! - An entry is published only after its materialization succeeded
//! - Publishing is a single atomic link/rename from a private temp file
//! - Failures are never cached; a later run retries the same input
//!
//! # Entry States
//!
//! | State | On disk | Description |
//! |-------|---------|-------------|
//! | Miss | nothing | Not yet materialized, or previously failed |
//! | Pending | `.tmp/<short>-<uuid>.cache` | Being written, invisible to readers |
//! | Published | `<fingerprint>-<name>.cache` | Immutable, reused across restarts |

pub mod artifact;
pub mod fingerprint;
pub mod flight;

pub use artifact::{ArtifactCache, CachedArtifact, PendingArtifact, ARTIFACT_EXT};
pub use fingerprint::Fingerprint;
pub use flight::FlightGroup;

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
