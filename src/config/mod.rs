//! Configuration management for devloop

pub mod schema;

pub use schema::{
    CompilationLevel, Config, DependencyMode, FreshnessPolicy, OverlayPolicy, ToolConfig,
};

use crate::error::{DevloopError, DevloopResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name of the project configuration
pub const CONFIG_FILE_NAME: &str = "devloop.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager rooted at the current directory
    pub fn new() -> Self {
        Self {
            config_path: PathBuf::from(CONFIG_FILE_NAME),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Walk up from `start` looking for a `devloop.toml`
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Default directory for materialized dependency artifacts
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".devloop"))
            .join("devloop")
            .join("artifacts")
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub async fn load(&self) -> DevloopResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file.
    ///
    /// Relative paths inside the file are resolved against the file's
    /// directory so the loop behaves the same from any working directory.
    pub async fn load_from_file(&self, path: &Path) -> DevloopResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| DevloopError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| DevloopError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(resolve_paths(config, base))
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> DevloopResult<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DevloopError::DirCreate {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
            }
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            DevloopError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn resolve_all(base: &Path, paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.into_iter().map(|p| resolve(base, p)).collect()
}

/// Anchor every relative path in the config at `base`
fn resolve_paths(mut config: Config, base: &Path) -> Config {
    let project = &mut config.project;
    project.sources = resolve_all(base, std::mem::take(&mut project.sources));
    project.classpath = resolve_all(base, std::mem::take(&mut project.classpath));
    project.js_classpath = resolve_all(base, std::mem::take(&mut project.js_classpath));
    project.output_dir = resolve(base, std::mem::take(&mut project.output_dir));
    project.classes_dir = project.classes_dir.take().map(|p| resolve(base, p));
    project.generated_dir = project.generated_dir.take().map(|p| resolve(base, p));
    project.cache_dir = project.cache_dir.take().map(|p| resolve(base, p));
    config.bundle.externs = resolve_all(base, std::mem::take(&mut config.bundle.externs));
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.project.output_file, "app.js");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("devloop.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.project.entry_points = vec!["app.App".to_string()];

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.project.entry_points, vec!["app.App"]);
    }

    #[tokio::test]
    async fn relative_paths_resolve_against_config_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("devloop.toml");
        std::fs::write(
            &path,
            r#"
                [project]
                sources = ["src", "/abs/src"]
                js_classpath = ["lib/jre.js.zip"]
                output_dir = "build/js"
            "#,
        )
        .unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();

        assert_eq!(config.project.sources[0], temp.path().join("src"));
        assert_eq!(config.project.sources[1], PathBuf::from("/abs/src"));
        assert_eq!(
            config.project.js_classpath[0],
            temp.path().join("lib/jre.js.zip")
        );
        assert_eq!(config.project.output_dir, temp.path().join("build/js"));
    }

    #[tokio::test]
    async fn invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("devloop.toml");
        std::fs::write(&path, "[watch]\npoll_interval_ms = \"fast\"\n").unwrap();

        let err = ConfigManager::with_path(path.clone())
            .load()
            .await
            .unwrap_err();
        match err {
            DevloopError::ConfigInvalid { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn find_local_config_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "").unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = ConfigManager::find_local_config(&nested).unwrap();
        assert_eq!(found, temp.path().join(CONFIG_FILE_NAME));
    }
}
