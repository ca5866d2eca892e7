//! Bundler command-line plan
//!
//! The fixed part of the argument list is computed once at startup; each
//! cycle only needs the archive list and the loose-script glob appended.

use crate::config::schema::BundleConfig;
use crate::config::CompilationLevel;
use crate::toolchain::BundleRequest;
use std::path::{Path, PathBuf};

/// Always set in bundle mode: there is no loader to fetch missing inputs
const DISABLE_DEBUG_LOADER: &str = "goog.ENABLE_DEBUG_LOADER=false";

#[derive(Debug, Clone)]
pub struct BundlePlan {
    base: Vec<String>,
    archives: Vec<PathBuf>,
    loose_glob: String,
    output_file: PathBuf,
}

impl BundlePlan {
    /// Build the fixed arguments.
    ///
    /// `scripts_dir` is the transpile output directory whose `*.js` files are
    /// passed as loose inputs.
    pub fn new(
        config: &BundleConfig,
        entry_points: &[String],
        output_file: &Path,
        scripts_dir: &Path,
    ) -> Self {
        let mut base = vec![
            "--compilation_level".to_string(),
            config.compilation_level.as_flag().to_string(),
            "--js_output_file".to_string(),
            output_file.to_string_lossy().into_owned(),
            "--dependency_mode".to_string(),
            config.dependency_mode.as_flag().to_string(),
            "--language_out".to_string(),
            config.language_out.clone(),
        ];
        if config.compilation_level == CompilationLevel::Bundle {
            base.push("--define".to_string());
            base.push(DISABLE_DEBUG_LOADER.to_string());
        }
        for define in &config.defines {
            base.push("--define".to_string());
            base.push(define.clone());
        }
        for entry_point in entry_points {
            base.push("--entry_point".to_string());
            base.push(entry_point.clone());
        }
        for extern_file in &config.externs {
            base.push("--externs".to_string());
            base.push(extern_file.to_string_lossy().into_owned());
        }

        Self {
            base,
            archives: Vec::new(),
            loose_glob: format!("{}/**/*.js", scripts_dir.to_string_lossy()),
            output_file: output_file.to_path_buf(),
        }
    }

    /// Add a prebuilt or materialized archive input
    pub fn add_archive(&mut self, path: &Path) {
        self.archives.push(path.to_path_buf());
    }

    pub fn archives(&self) -> &[PathBuf] {
        &self.archives
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Full argument list for one bundle invocation
    pub fn request(&self) -> BundleRequest {
        let mut args = self.base.clone();
        for archive in &self.archives {
            args.push("--jszip".to_string());
            args.push(archive.to_string_lossy().into_owned());
        }
        args.push("--js".to_string());
        args.push(self.loose_glob.clone());

        BundleRequest {
            args,
            output_file: self.output_file.clone(),
        }
    }
}
