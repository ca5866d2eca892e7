//! Bundler inputs: the persistent input store and the argument plan

pub mod plan;
pub mod store;

pub use plan::BundlePlan;
pub use store::{FreshnessToken, PersistentInputStore};
