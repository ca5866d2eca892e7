//! devloop - incremental Java to JavaScript dev builds
//!
//! Watches Java source roots, recompiles and transpiles whatever changed,
//! and re-bundles the output. Dependency archives are transpiled once and
//! kept in a content-addressed artifact cache shared across projects.

pub mod archive;
pub mod bundle;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod toolchain;
pub mod ui;

pub use error::{DevloopError, DevloopResult};
