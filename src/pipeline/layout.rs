//! Startup validation and on-disk layout of a build
//!
//! Everything here runs before the first cycle; any error is fatal.

use crate::config::{Config, ConfigManager};
use crate::error::{DevloopError, DevloopResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Subdirectory of the output root receiving transpiled scripts
const SCRIPTS_DIR: &str = "sources";
/// Subdirectory of the output root for devloop's own state
const WORK_DIR: &str = ".devloop";

/// Resolved directories for one project
#[derive(Debug, Clone)]
pub struct BuildLayout {
    pub output_dir: PathBuf,
    /// Transpile output, bundled as loose scripts
    pub scripts_dir: PathBuf,
    pub output_file: PathBuf,
    pub classes_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Parent of per-invocation scratch directories
    pub scratch_root: PathBuf,
    /// JSON copy of the persistent input store for the bundler
    pub store_file: PathBuf,
}

impl BuildLayout {
    /// Compute the layout for `config` without touching the filesystem
    pub fn resolve(config: &Config) -> Self {
        let project = &config.project;
        let output_dir = project.output_dir.clone();
        let work_dir = output_dir.join(WORK_DIR);

        Self {
            scripts_dir: output_dir.join(SCRIPTS_DIR),
            output_file: output_dir.join(&project.output_file),
            classes_dir: project
                .classes_dir
                .clone()
                .unwrap_or_else(|| work_dir.join("classes")),
            generated_dir: project
                .generated_dir
                .clone()
                .unwrap_or_else(|| work_dir.join("generated")),
            cache_dir: project
                .cache_dir
                .clone()
                .unwrap_or_else(ConfigManager::default_cache_dir),
            scratch_root: work_dir.join("scratch"),
            store_file: work_dir.join("input-store.json"),
            output_dir,
        }
    }

    /// Validate the project inputs and create every output directory
    pub fn prepare(config: &Config) -> DevloopResult<Self> {
        validate_inputs(config)?;

        let layout = Self::resolve(config);
        for dir in [
            &layout.output_dir,
            &layout.scripts_dir,
            &layout.classes_dir,
            &layout.generated_dir,
            &layout.scratch_root,
        ] {
            ensure_dir(dir)?;
        }
        if let Some(parent) = layout.output_file.parent() {
            ensure_dir(parent)?;
        }
        debug!("Build layout: {:?}", layout);
        Ok(layout)
    }

    /// Classpath seen by the compiler and transpiler: dependencies, then class output
    pub fn bytecode_classpath(&self, config: &Config) -> Vec<PathBuf> {
        let mut classpath = config.project.classpath.clone();
        classpath.push(self.classes_dir.clone());
        classpath
    }
}

/// Check the preconditions that make a build possible at all
pub fn validate_inputs(config: &Config) -> DevloopResult<()> {
    let project = &config.project;
    if project.sources.is_empty() {
        return Err(DevloopError::ConfigMissing("project.sources"));
    }
    if project.entry_points.is_empty() {
        return Err(DevloopError::ConfigMissing("project.entry_points"));
    }
    for root in &project.sources {
        if !root.is_dir() {
            return Err(DevloopError::SourceRootNotFound(root.clone()));
        }
    }
    for archive in &project.js_classpath {
        if !archive.is_file() {
            return Err(DevloopError::ArchiveNotFound(archive.clone()));
        }
    }
    for entry in &project.classpath {
        if !entry.exists() {
            return Err(DevloopError::ClasspathEntryNotFound(entry.clone()));
        }
    }
    Ok(())
}

/// Create `dir` if needed; an existing non-directory is an error
pub fn ensure_dir(dir: &Path) -> DevloopResult<()> {
    if dir.exists() {
        if dir.is_dir() {
            return Ok(());
        }
        return Err(DevloopError::NotADirectory(dir.to_path_buf()));
    }
    fs::create_dir_all(dir).map_err(|e| DevloopError::DirCreate {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// A uniquely named scratch directory, removed on drop
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(root: &Path) -> DevloopResult<Self> {
        let path = root.join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&path).map_err(|e| DevloopError::DirCreate {
            path: path.clone(),
            source: e,
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, child: &str) -> PathBuf {
        self.path.join(child)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove scratch dir {}: {}", self.path.display(), e);
            }
        }
    }
}
