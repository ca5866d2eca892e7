//! CLI argument definitions using clap derive

use crate::config::CompilationLevel;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// devloop - incremental Java to JavaScript dev builds
///
/// Watches Java sources, recompiles and transpiles what changed and
/// re-bundles the result, caching transpiled dependencies between runs.
#[derive(Parser, Debug)]
#[command(name = "devloop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DEVLOOP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, then rebuild on every source change until Ctrl-C
    Watch(BuildArgs),

    /// Build every source once and exit
    Build(BuildArgs),

    /// Build the adapter suites of the given test classes once
    Test(TestArgs),

    /// Inspect or clear the artifact cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Project overrides shared by the build commands
#[derive(Parser, Debug, Default, Clone)]
pub struct BuildArgs {
    /// Source root (repeatable; replaces project.sources)
    #[arg(long = "src")]
    pub sources: Vec<PathBuf>,

    /// Dependency jar (repeatable; replaces project.classpath)
    #[arg(long)]
    pub classpath: Vec<PathBuf>,

    /// Prebuilt JavaScript archive (repeatable; replaces project.js_classpath)
    #[arg(long)]
    pub js_classpath: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Bundle entry point namespace (repeatable)
    #[arg(short, long = "entry-point")]
    pub entry_points: Vec<String>,

    /// Artifact cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Bundler define, e.g. `app.DEBUG=true` (repeatable, appended)
    #[arg(long = "define")]
    pub defines: Vec<String>,

    /// Bundler externs file (repeatable, appended)
    #[arg(long)]
    pub externs: Vec<PathBuf>,

    /// Compilation level
    #[arg(short = 'O', long = "compilation-level", value_enum)]
    pub compilation_level: Option<CompilationLevel>,
}

#[derive(Parser, Debug)]
pub struct TestArgs {
    /// Fully qualified test class (repeatable)
    #[arg(short, long = "test", required = true)]
    pub tests: Vec<String>,

    #[command(flatten)]
    pub build: BuildArgs,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default devloop.toml
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached artifacts
    List {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show cache location and totals
    Info,

    /// Remove every cached artifact
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
