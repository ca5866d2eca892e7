//! Terminal output for devloop commands
//!
//! Interactive terminals get `cliclack` log lines and `indicatif` progress;
//! CI and piped output fall back to plain bracketed status lines.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, remark, step_error, step_ok, step_ok_detail, step_warn_hint,
};
pub use progress::{MaterializeProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::init_theme;
