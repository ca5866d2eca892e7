//! Config command - show, locate or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::DevloopResult;
use crate::ui;

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> DevloopResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager),
        Some(ConfigAction::Init { force }) => init_config(manager, config, force).await?,
    }
    Ok(())
}

fn show_config(config: &Config) -> DevloopResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    let path = manager.path();
    if path.exists() {
        println!("{}", path.display());
    } else {
        println!("{} (not created; defaults in use)", path.display());
    }
}

async fn init_config(manager: &ConfigManager, config: &Config, force: bool) -> DevloopResult<()> {
    let ctx = super::ui_context(config);
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    ui::remark(
        &ctx,
        "Set [project] sources and entry_points, then run: devloop watch",
    );
    Ok(())
}
