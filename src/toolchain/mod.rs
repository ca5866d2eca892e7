//! External toolchain abstraction
//!
//! The build pipeline talks to four collaborators: a bytecode compiler, a
//! source preprocessor, a transpiler and a bundler. Each is a trait so the
//! orchestrator can be driven by fakes in tests; the production
//! implementations in [`process`] shell out to the configured programs.

mod factory;
pub mod process;

pub use factory::create_toolchain;

use crate::bundle::PersistentInputStore;
use crate::error::{DevloopError, DevloopResult};
use crate::source::RootedFile;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines kept in failure summaries.
const ERROR_TAIL_LINES: usize = 50;

/// Result of running a tool that reports only pass/fail plus output
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    pub success: bool,
    /// Combined stdout and stderr lines
    pub output: Vec<String>,
}

impl ToolOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            output: Vec::new(),
        }
    }

    pub fn failed(output: Vec<String>) -> Self {
        Self {
            success: false,
            output,
        }
    }

    /// Last lines of output, for error messages
    pub fn tail(&self) -> String {
        error_tail(&self.output)
    }
}

/// Inputs to the bytecode compile stage
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub sources: Vec<PathBuf>,
    pub classpath: Vec<PathBuf>,
    pub classes_dir: PathBuf,
    /// Where annotation processors write generated sources
    pub generated_dir: PathBuf,
}

/// Inputs to one transpile invocation
#[derive(Debug, Clone)]
pub struct TranspileRequest {
    pub sources: Vec<PathBuf>,
    pub overlays: Vec<RootedFile>,
    pub classpath: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Private directory the implementation may use for staging files
    pub scratch_dir: PathBuf,
    pub declare_legacy_namespaces: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One diagnostic reported by the transpiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
}

impl Problem {
    /// Parse a diagnostic line of the form `Error: ...` or `Warning: ...`
    pub fn parse(line: &str) -> Option<Self> {
        let (severity, rest) = if let Some(rest) = line.strip_prefix("Error:") {
            (Severity::Error, rest)
        } else if let Some(rest) = line.strip_prefix("Warning:") {
            (Severity::Warning, rest)
        } else {
            return None;
        };
        Some(Self {
            severity,
            message: rest.trim().to_string(),
        })
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "error: {}", self.message),
            Severity::Warning => write!(f, "warning: {}", self.message),
        }
    }
}

/// Exit code and diagnostics of a transpile invocation
#[derive(Debug, Clone, Default)]
pub struct TranspileOutcome {
    pub exit_code: i32,
    pub problems: Vec<Problem>,
}

impl TranspileOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.problems.iter().any(|p| p.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter().filter(|p| p.severity == Severity::Error)
    }
}

/// Inputs to the bundle stage
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Full bundler argument list, excluding the input store
    pub args: Vec<String>,
    pub output_file: PathBuf,
}

/// Compiles first-party sources to bytecode
#[async_trait]
pub trait BytecodeCompiler: Send + Sync {
    async fn compile(&self, request: &CompileRequest) -> DevloopResult<ToolOutcome>;
}

/// Strips constructs the transpiler cannot handle
#[async_trait]
pub trait Preprocessor: Send + Sync {
    /// Write processed copies of `inputs` below `out_dir`
    async fn preprocess(&self, inputs: &[PathBuf], out_dir: &std::path::Path)
        -> DevloopResult<ToolOutcome>;
}

/// Translates sources to script
#[async_trait]
pub trait Transpiler: Send + Sync {
    /// Drop any state carried over from a previous invocation; called before
    /// every transpile, first-party or dependency
    async fn reset(&self) -> DevloopResult<()> {
        Ok(())
    }

    async fn transpile(&self, request: &TranspileRequest) -> DevloopResult<TranspileOutcome>;
}

/// Links scripts into the output bundle
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn bundle(
        &self,
        request: &BundleRequest,
        store: &PersistentInputStore,
    ) -> DevloopResult<ToolOutcome>;
}

/// The four collaborators, shareable across tasks
#[derive(Clone)]
pub struct Toolchain {
    pub compiler: Arc<dyn BytecodeCompiler>,
    pub preprocessor: Arc<dyn Preprocessor>,
    pub transpiler: Arc<dyn Transpiler>,
    pub bundler: Arc<dyn Bundler>,
}

/// Run a stage future, failing with [`DevloopError::StageTimeout`] past `limit`.
///
/// `None` means unbounded. Dropping the future on timeout kills any child
/// process it spawned.
pub async fn with_timeout<T, F>(stage: &str, limit: Option<Duration>, fut: F) -> DevloopResult<T>
where
    F: Future<Output = DevloopResult<T>>,
{
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| DevloopError::StageTimeout {
                stage: stage.to_string(),
                limit,
            })?,
    }
}

/// Last [`ERROR_TAIL_LINES`] lines of tool output, joined.
pub(crate) fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Lines are decoded lossily, so bytes that are not UTF-8 never stop the
/// drain. A stream is only abandoned at EOF or on a read error.
///
/// Returns all collected lines. This is a standalone async function (not
/// behind `async_trait`) to avoid lifetime issues with the `dyn Fn` callback.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(&str) + Send + Sync),
) -> Vec<String> {
    let mut all_output = Vec::new();
    let (Some(stderr), Some(stdout)) = (child.stderr.take(), child.stdout.take()) else {
        return all_output;
    };

    let mut stderr_reader = BufReader::new(stderr);
    let mut stdout_reader = BufReader::new(stdout);
    // read_until keeps partial bytes in the buffer when select! cancels it
    let mut stderr_buf = Vec::new();
    let mut stdout_buf = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            read = stderr_reader.read_until(b'\n', &mut stderr_buf), if !stderr_done => {
                stderr_done = !take_line(read, &mut stderr_buf, on_output, &mut all_output);
            }
            read = stdout_reader.read_until(b'\n', &mut stdout_buf), if !stdout_done => {
                stdout_done = !take_line(read, &mut stdout_buf, on_output, &mut all_output);
            }
        }
    }

    all_output
}

/// Emit whatever `buf` holds as one line; returns false once the stream ended.
fn take_line(
    read: std::io::Result<usize>,
    buf: &mut Vec<u8>,
    on_output: &(dyn Fn(&str) + Send + Sync),
    all_output: &mut Vec<String>,
) -> bool {
    let more = match read {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("Stopped reading tool output: {}", e);
            false
        }
    };
    if !buf.is_empty() {
        let text = String::from_utf8_lossy(buf);
        let line = text.trim_end_matches(['\n', '\r']).to_string();
        buf.clear();
        on_output(&line);
        all_output.push(line);
    }
    more
}
