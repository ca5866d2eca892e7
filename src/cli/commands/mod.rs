//! CLI command implementations

pub mod build;
pub mod cache;
pub mod config;

pub use build::{build, test, watch};
pub use cache::execute as cache;
pub use config::execute as config;

use crate::config::Config;
use crate::ui::UiContext;

/// UI context for a command; JSON logs force plain output
fn ui_context(config: &Config) -> UiContext {
    UiContext::detect().with_plain(config.general.log_format == "json")
}
