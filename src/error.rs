//! Error types for devloop
//!
//! All modules use `DevloopResult<T>` as their return type. Stage failures
//! inside a build cycle are turned into cycle outcomes by the orchestrator;
//! only startup precondition violations reach `main` as fatal errors.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for devloop operations
pub type DevloopResult<T> = Result<T, DevloopError>;

/// All errors that can occur in devloop
#[derive(Error, Debug)]
pub enum DevloopError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Missing required setting: {0}")]
    ConfigMissing(&'static str),

    #[error("Prebuilt archive does not exist: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("Classpath entry does not exist: {0}")]
    ClasspathEntryNotFound(PathBuf),

    #[error("Source root does not exist: {0}")]
    SourceRootNotFound(PathBuf),

    #[error("Path already exists but is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to create directory {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    // Toolchain errors
    #[error("Failed to launch {tool}: {source}")]
    CommandFailed {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed: {stderr}")]
    CommandExecution { tool: String, stderr: String },

    #[error("Build failed while {stage}: {reason}")]
    BuildFailed { stage: String, reason: String },

    #[error("{stage} did not finish within {}s", .limit.as_secs())]
    StageTimeout { stage: String, limit: Duration },

    // Cache errors
    #[error("Archive error in {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to publish cache entry {path}: {source}")]
    CachePublish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl DevloopError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a launch failure for an external tool
    pub fn command_failed(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            source,
        }
    }

    /// Create an execution failure for an external tool
    pub fn command_exec(tool: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            tool: tool.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an archive error for the given file
    pub fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a startup precondition violation.
    ///
    /// Fatal errors terminate the process before the build loop starts;
    /// everything else is contained to one cycle or one dependency.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. }
                | Self::ConfigNotFound(_)
                | Self::ConfigMissing(_)
                | Self::ArchiveNotFound(_)
                | Self::ClasspathEntryNotFound(_)
                | Self::SourceRootNotFound(_)
                | Self::NotADirectory(_)
                | Self::DirCreate { .. }
                | Self::Pattern { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ArchiveNotFound(_) => {
                Some("Every js_classpath entry must be an existing archive (e.g. bootstrap.js.zip)")
            }
            Self::ClasspathEntryNotFound(_) => Some("Check the [project] classpath in devloop.toml"),
            Self::ConfigMissing(_) => Some("Run: devloop config init"),
            Self::ConfigNotFound(_) => Some("Create it with: devloop --config <path> config init"),
            Self::CommandFailed { .. } => Some("Check the [toolchain] programs in devloop.toml"),
            Self::StageTimeout { .. } => Some("Raise [watch] stage_timeout_secs, or set it to 0"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DevloopError::ArchiveNotFound(PathBuf::from("/lib/jre.js.zip"));
        assert!(err.to_string().contains("does not exist"));
        assert!(err.to_string().contains("jre.js.zip"));
    }

    #[test]
    fn error_hint() {
        let err = DevloopError::ConfigMissing("project.sources");
        assert_eq!(err.hint(), Some("Run: devloop config init"));
    }

    #[test]
    fn error_fatal() {
        assert!(DevloopError::ClasspathEntryNotFound(PathBuf::from("a.jar")).is_fatal());
        assert!(!DevloopError::command_exec("javac", "boom").is_fatal());
    }

    #[test]
    fn stage_timeout_display() {
        let err = DevloopError::StageTimeout {
            stage: "bundler".to_string(),
            limit: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "bundler did not finish within 30s");
    }
}
