//! Configuration schema for devloop
//!
//! Configuration is stored in `devloop.toml` next to the project.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Inputs and outputs of the build
    pub project: ProjectConfig,

    /// Bundler settings
    pub bundle: BundleConfig,

    /// Transpiler settings
    pub transpile: TranspileConfig,

    /// Rebuild loop settings
    pub watch: WatchConfig,

    /// External tools
    pub toolchain: ToolchainConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Project inputs and outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// First-party source roots, watched for changes
    pub sources: Vec<PathBuf>,

    /// Dependency classpath; archives are materialized once at startup
    pub classpath: Vec<PathBuf>,

    /// Prebuilt JS archives handed straight to the bundler
    pub js_classpath: Vec<PathBuf>,

    /// Output root for generated JS and the bundle
    pub output_dir: PathBuf,

    /// Bytecode output directory (temporary directory if unset)
    pub classes_dir: Option<PathBuf>,

    /// Directory for sources generated during compilation (temporary if unset)
    pub generated_dir: Option<PathBuf>,

    /// Directory holding materialized dependency artifacts
    pub cache_dir: Option<PathBuf>,

    /// Bundle entry points, from either the source or JS side
    pub entry_points: Vec<String>,

    /// Bundle file name inside `output_dir`
    pub output_file: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            sources: vec![],
            classpath: vec![],
            js_classpath: vec![],
            output_dir: PathBuf::from("out"),
            classes_dir: None,
            generated_dir: None,
            cache_dir: None,
            entry_points: vec![],
            output_file: "app.js".to_string(),
        }
    }
}

/// Bundler compilation aggressiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CompilationLevel {
    Bundle,
    WhitespaceOnly,
    Simple,
    Advanced,
}

impl CompilationLevel {
    /// Flag value understood by the bundler
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Bundle => "BUNDLE",
            Self::WhitespaceOnly => "WHITESPACE_ONLY",
            Self::Simple => "SIMPLE",
            Self::Advanced => "ADVANCED",
        }
    }
}

impl fmt::Display for CompilationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_flag())
    }
}

/// How the bundler determines the set and order of inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DependencyMode {
    /// Include all inputs in the order given
    None,
    /// Sort by reachability from the entry points
    Strict,
    /// Like strict, but non-module files without provides become entry points
    Loose,
}

impl DependencyMode {
    /// Flag value understood by the bundler
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Strict => "STRICT",
            Self::Loose => "LOOSE",
        }
    }
}

/// Bundler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    pub compilation_level: CompilationLevel,

    /// Target output language level
    pub language_out: String,

    pub dependency_mode: DependencyMode,

    /// `@define` overrides as `name[=value]`
    pub defines: Vec<String>,

    /// Extra type-declaration (externs) files
    pub externs: Vec<PathBuf>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            compilation_level: CompilationLevel::Bundle,
            language_out: "ECMASCRIPT5".to_string(),
            dependency_mode: DependencyMode::Strict,
            defines: vec![],
            externs: vec![],
        }
    }
}

/// Transpiler settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranspileConfig {
    /// Emit legacy namespace declarations for generated modules
    pub declare_legacy_namespaces: bool,
}

/// Which freshness token the bundler cache receives for loose JS inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessPolicy {
    /// SHA-256 of the file contents
    Digest,
    /// Last-modified time of the file
    Timestamp,
}

/// Which overlays travel into a first-party transpile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPolicy {
    /// Every overlay under the source roots
    All,
    /// Only overlays belonging to sources changed this cycle
    Changed,
}

/// Rebuild loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Sleep between polls when nothing changed
    pub poll_interval_ms: u64,

    /// Upper bound for each external stage (0 = unbounded)
    pub stage_timeout_secs: u64,

    /// Dependencies materialized in parallel
    pub materialize_jobs: usize,

    pub freshness: FreshnessPolicy,

    pub overlays: OverlayPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            stage_timeout_secs: 600,
            materialize_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            freshness: FreshnessPolicy::Digest,
            overlays: OverlayPolicy::All,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-stage limit, `None` when unbounded
    pub fn stage_timeout(&self) -> Option<Duration> {
        (self.stage_timeout_secs > 0).then(|| Duration::from_secs(self.stage_timeout_secs))
    }
}

/// An external command: program plus fixed leading arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolConfig {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: vec![],
        }
    }
}

/// External tools driven by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Bytecode compiler
    pub compiler: ToolConfig,

    /// Conditional-compilation preprocessor
    pub preprocessor: ToolConfig,

    /// Source-to-JS transpiler
    pub transpiler: ToolConfig,

    /// JS bundler
    pub bundler: ToolConfig,

    /// Flag used to hand the persistent input store to the bundler
    pub bundler_store_flag: Option<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: ToolConfig::new("javac"),
            preprocessor: ToolConfig::new("gwt-incompatible-stripper"),
            transpiler: ToolConfig::new("j2cl"),
            bundler: ToolConfig::new("closure-compiler"),
            bundler_store_flag: Some("--persistent_input_store".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[project]"));
        assert!(toml.contains("[watch]"));
        assert!(toml.contains("compilation_level = \"bundle\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.project.output_file, "app.js");
        assert_eq!(config.bundle.dependency_mode, DependencyMode::Strict);
        assert_eq!(config.watch.overlays, OverlayPolicy::All);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [project]
            sources = ["src/main/java"]
            entry_points = ["app.App"]

            [bundle]
            compilation_level = "whitespace_only"
            dependency_mode = "loose"

            [toolchain.transpiler]
            program = "/opt/j2cl/bin/j2cl"
            args = ["-XX:fast"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.project.sources, vec![PathBuf::from("src/main/java")]);
        assert_eq!(
            config.bundle.compilation_level,
            CompilationLevel::WhitespaceOnly
        );
        assert_eq!(config.bundle.dependency_mode, DependencyMode::Loose);
        assert_eq!(config.toolchain.transpiler.program, "/opt/j2cl/bin/j2cl");
        assert_eq!(config.toolchain.compiler.program, "javac"); // default preserved
    }

    #[test]
    fn compilation_level_flags() {
        assert_eq!(CompilationLevel::Bundle.as_flag(), "BUNDLE");
        assert_eq!(CompilationLevel::WhitespaceOnly.to_string(), "WHITESPACE_ONLY");
        assert_eq!(DependencyMode::Loose.as_flag(), "LOOSE");
    }

    #[test]
    fn zero_stage_timeout_is_unbounded() {
        let mut watch = WatchConfig::default();
        assert_eq!(watch.stage_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(watch.poll_interval(), Duration::from_millis(100));

        watch.stage_timeout_secs = 0;
        assert_eq!(watch.stage_timeout(), None);
    }
}
