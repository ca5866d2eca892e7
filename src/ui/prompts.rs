//! Confirmation prompt with non-interactive fallback

use super::context::UiContext;
use crate::error::{DevloopError, DevloopResult};

/// Ask a yes/no question.
///
/// `--yes` answers yes; a non-interactive session gets `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> DevloopResult<bool> {
    if ctx.auto_yes() {
        println!("  {} (auto-approved)", message);
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    let message = message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message).initial_value(default).interact()
    })
    .await
    .map_err(|e| DevloopError::User(format!("Prompt task failed: {}", e)))?;

    result.map_err(|e| DevloopError::User(format!("Prompt failed: {}", e)))
}
