//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::pipeline::{MaterializeResult, MaterializeStatus};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Progress over the dependency classpath.
///
/// Interactive sessions get an indicatif bar; CI gets one line per entry.
pub struct MaterializeProgress {
    bar: Option<ProgressBar>,
}

impl MaterializeProgress {
    pub fn new(ctx: &UiContext, total: usize) -> Self {
        let bar = if ctx.use_fancy_output() && total > 0 {
            let bar = ProgressBar::new(total as u64);
            let bar_style = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} Dependencies  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                .map(|s| s.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ").progress_chars("━╸─"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(bar_style);
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            if total > 0 {
                println!("Preparing {} dependencies...", total);
            }
            None
        };
        Self { bar }
    }

    /// Record one finished entry
    pub fn on_result(&self, result: &MaterializeResult) {
        let name = entry_label(&result.entry);
        match &self.bar {
            Some(bar) => {
                bar.inc(1);
                if let MaterializeStatus::Failed(reason) = &result.status {
                    bar.println(format!("  {} {}: {}", style("✗").red(), name, reason));
                }
                bar.set_message(name);
            }
            None => println!("  {} {}", status_tag(&result.status), name),
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn entry_label(entry: &Path) -> String {
    entry
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| entry.display().to_string())
}

fn status_tag(status: &MaterializeStatus) -> String {
    match status {
        MaterializeStatus::CacheHit(_) => style("[CACHED]").dim().to_string(),
        MaterializeStatus::Materialized(_) => style("[BUILT]").green().to_string(),
        MaterializeStatus::Skipped(_) => style("[SKIP]").dim().to_string(),
        MaterializeStatus::Failed(_) => style("[FAIL]").red().to_string(),
    }
}
