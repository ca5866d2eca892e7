//! Build cycle state machine types

use std::fmt;
use std::time::{Duration, SystemTime};

/// Stages of one build cycle, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Polling,
    HasChanges,
    Compiling,
    Transpiling,
    Bundling,
    Committed,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Polling => "polling",
            Self::HasChanges => "collecting overlays",
            Self::Compiling => "compiling",
            Self::Transpiling => "transpiling",
            Self::Bundling => "bundling",
            Self::Committed => "committed",
        };
        write!(f, "{}", name)
    }
}

/// State carried from one cycle to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildState {
    /// Sources modified at or before this instant are already built
    pub watermark: SystemTime,
    /// Candidate of the last finished attempt. A failed cycle is retried
    /// only once some source is saved after this instant.
    pub last_attempt: SystemTime,
    pub committed: u64,
    pub abandoned: u64,
}

impl BuildState {
    /// State of a fresh process: everything counts as changed
    pub fn new() -> Self {
        Self {
            watermark: SystemTime::UNIX_EPOCH,
            last_attempt: SystemTime::UNIX_EPOCH,
            committed: 0,
            abandoned: 0,
        }
    }
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock time spent per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub poll: Duration,
    pub compile: Duration,
    pub transpile: Duration,
    pub bundle: Duration,
    pub total: Duration,
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "poll {}ms, compile {}ms, transpile {}ms, bundle {}ms, total {}ms",
            self.poll.as_millis(),
            self.compile.as_millis(),
            self.transpile.as_millis(),
            self.bundle.as_millis(),
            self.total.as_millis()
        )
    }
}

/// What a committed cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub sources: usize,
    pub generated: usize,
    pub overlays: usize,
    pub assets: usize,
    pub timings: StageTimings,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Nothing newer than the watermark
    Idle,
    Committed(CycleReport),
    /// A stage failed; the watermark was left unchanged
    Abandoned { stage: CycleStage, reason: String },
}

impl CycleOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}
