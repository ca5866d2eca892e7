//! Build pipeline: dependency materialization and the rebuild loop

pub mod cycle;
pub mod layout;
pub mod materializer;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use cycle::{BuildState, CycleOutcome, CycleReport, CycleStage, StageTimings};
pub use layout::BuildLayout;
pub use materializer::{
    MaterializeOptions, MaterializeReport, MaterializeResult, MaterializeStatus, Materializer,
};
pub use orchestrator::Orchestrator;
