//! Toolchain implementations that run the configured external programs
//!
//! Every invocation pipes stdout/stderr through [`stream_child_output`] into
//! the debug log, and sets `kill_on_drop` so a stage timeout that drops the
//! future also terminates the child.

use super::{
    stream_child_output, BundleRequest, Bundler, BytecodeCompiler, CompileRequest, Preprocessor,
    Problem, ToolOutcome, TranspileOutcome, TranspileRequest, Transpiler,
};
use crate::archive::{entry_name, ArchiveWriter};
use crate::bundle::PersistentInputStore;
use crate::config::ToolConfig;
use crate::error::{DevloopError, DevloopResult};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// File the transpiler reads overlays from
const OVERLAY_ARCHIVE: &str = "native-sources.zip";

/// One configured external program
#[derive(Debug, Clone)]
struct ProcessTool {
    /// Role name used in logs and errors
    role: &'static str,
    config: ToolConfig,
}

impl ProcessTool {
    fn new(role: &'static str, config: ToolConfig) -> Self {
        Self { role, config }
    }

    /// Run the program with its configured args followed by `args`.
    ///
    /// Returns the exit code (`-1` when killed by a signal) and all output lines.
    async fn exec(&self, args: Vec<OsString>) -> DevloopResult<(i32, Vec<String>)> {
        debug!(
            "Executing {}: {} {:?} {:?}",
            self.role, self.config.program, self.config.args, args
        );

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DevloopError::command_failed(&self.config.program, e))?;

        let role = self.role;
        let output = stream_child_output(&mut child, &|line: &str| debug!(tool = role, "{}", line)).await;

        let status = child
            .wait()
            .await
            .map_err(|e| DevloopError::command_failed(&self.config.program, e))?;

        Ok((status.code().unwrap_or(-1), output))
    }

    async fn run(&self, args: Vec<OsString>) -> DevloopResult<ToolOutcome> {
        let (code, output) = self.exec(args).await?;
        Ok(ToolOutcome {
            success: code == 0,
            output,
        })
    }
}

/// Join paths with the platform's path list separator
fn classpath_arg(entries: &[PathBuf]) -> DevloopResult<OsString> {
    std::env::join_paths(entries)
        .map_err(|e| DevloopError::User(format!("invalid classpath entry: {}", e)))
}

fn paths_to_args<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Vec<OsString> {
    paths.into_iter().map(|p| p.as_os_str().to_owned()).collect()
}

/// Bytecode compiler driven by a javac-compatible command line
pub struct CommandCompiler {
    tool: ProcessTool,
}

impl CommandCompiler {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            tool: ProcessTool::new("compiler", config),
        }
    }

    fn args(request: &CompileRequest) -> DevloopResult<Vec<OsString>> {
        let mut args: Vec<OsString> = vec!["-implicit:none".into()];
        if !request.classpath.is_empty() {
            args.push("-cp".into());
            args.push(classpath_arg(&request.classpath)?);
        }
        args.push("-d".into());
        args.push(request.classes_dir.clone().into_os_string());
        args.push("-s".into());
        args.push(request.generated_dir.clone().into_os_string());
        args.extend(paths_to_args(&request.sources));
        Ok(args)
    }
}

#[async_trait]
impl BytecodeCompiler for CommandCompiler {
    async fn compile(&self, request: &CompileRequest) -> DevloopResult<ToolOutcome> {
        self.tool.run(Self::args(request)?).await
    }
}

/// Preprocessor taking `-d <out_dir> <inputs...>`
pub struct CommandPreprocessor {
    tool: ProcessTool,
}

impl CommandPreprocessor {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            tool: ProcessTool::new("preprocessor", config),
        }
    }
}

#[async_trait]
impl Preprocessor for CommandPreprocessor {
    async fn preprocess(&self, inputs: &[PathBuf], out_dir: &Path) -> DevloopResult<ToolOutcome> {
        if inputs.is_empty() {
            return Ok(ToolOutcome::succeeded());
        }
        let mut args: Vec<OsString> = vec!["-d".into(), out_dir.as_os_str().to_owned()];
        args.extend(paths_to_args(inputs));
        self.tool.run(args).await
    }
}

/// Transpiler command line; overlays are handed over as one zip archive
pub struct CommandTranspiler {
    tool: ProcessTool,
}

impl CommandTranspiler {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            tool: ProcessTool::new("transpiler", config),
        }
    }

    /// Pack overlays into `<scratch>/native-sources.zip`, keyed by root-relative path
    fn stage_overlays(request: &TranspileRequest) -> DevloopResult<Option<PathBuf>> {
        if request.overlays.is_empty() {
            return Ok(None);
        }
        std::fs::create_dir_all(&request.scratch_dir).map_err(|e| {
            DevloopError::io(format!("creating {}", request.scratch_dir.display()), e)
        })?;

        let archive = request.scratch_dir.join(OVERLAY_ARCHIVE);
        let mut writer = ArchiveWriter::create(&archive)?;
        for overlay in &request.overlays {
            writer.add_file(&entry_name(&overlay.relative), &overlay.path)?;
        }
        writer.finish()?;
        Ok(Some(archive))
    }

    fn args(request: &TranspileRequest, overlays: Option<PathBuf>) -> DevloopResult<Vec<OsString>> {
        let mut args: Vec<OsString> = Vec::new();
        if !request.classpath.is_empty() {
            args.push("-cp".into());
            args.push(classpath_arg(&request.classpath)?);
        }
        args.push("-d".into());
        args.push(request.output_dir.clone().into_os_string());
        if request.declare_legacy_namespaces {
            args.push("-declarelegacynamespaces".into());
        }
        if let Some(overlays) = overlays {
            args.push("-nativesourcepath".into());
            args.push(overlays.into_os_string());
        }
        args.extend(paths_to_args(&request.sources));
        Ok(args)
    }
}

#[async_trait]
impl Transpiler for CommandTranspiler {
    async fn transpile(&self, request: &TranspileRequest) -> DevloopResult<TranspileOutcome> {
        let overlays = Self::stage_overlays(request)?;
        let (exit_code, output) = self.tool.exec(Self::args(request, overlays)?).await?;
        let problems = output.iter().filter_map(|l| Problem::parse(l)).collect();
        Ok(TranspileOutcome {
            exit_code,
            problems,
        })
    }
}

/// Bundler command line, optionally fed the persistent input store as a JSON file
pub struct CommandBundler {
    tool: ProcessTool,
    store_flag: Option<String>,
    store_file: PathBuf,
}

impl CommandBundler {
    pub fn new(config: ToolConfig, store_flag: Option<String>, store_file: PathBuf) -> Self {
        Self {
            tool: ProcessTool::new("bundler", config),
            store_flag,
            store_file,
        }
    }
}

#[async_trait]
impl Bundler for CommandBundler {
    async fn bundle(
        &self,
        request: &BundleRequest,
        store: &PersistentInputStore,
    ) -> DevloopResult<ToolOutcome> {
        let mut args: Vec<OsString> = request.args.iter().map(OsString::from).collect();
        if let Some(flag) = &self.store_flag {
            store.write_manifest(&self.store_file)?;
            args.push(flag.into());
            args.push(self.store_file.clone().into_os_string());
        }

        let outcome = self.tool.run(args).await?;
        if outcome.success {
            info!("Bundle written to {}", request.output_file.display());
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn compiler_args() {
        let request = CompileRequest {
            sources: vec![PathBuf::from("src/Foo.java")],
            classpath: vec![PathBuf::from("a.jar"), PathBuf::from("classes")],
            classes_dir: PathBuf::from("classes"),
            generated_dir: PathBuf::from("gen"),
        };
        let args = strings(&CommandCompiler::args(&request).unwrap());
        let sep = if cfg!(windows) { ";" } else { ":" };

        assert_eq!(
            args,
            vec![
                "-implicit:none".to_string(),
                "-cp".to_string(),
                format!("a.jar{}classes", sep),
                "-d".to_string(),
                "classes".to_string(),
                "-s".to_string(),
                "gen".to_string(),
                "src/Foo.java".to_string(),
            ]
        );
    }

    #[test]
    fn transpiler_args_with_overlays() {
        let dir = TempDir::new().unwrap();
        let overlay = dir.path().join("Foo.native.js");
        std::fs::write(&overlay, "// native").unwrap();

        let request = TranspileRequest {
            sources: vec![PathBuf::from("Foo.java")],
            overlays: vec![crate::source::RootedFile {
                path: overlay,
                relative: PathBuf::from("com/example/Foo.native.js"),
            }],
            classpath: Vec::new(),
            output_dir: PathBuf::from("out"),
            scratch_dir: dir.path().join("scratch"),
            declare_legacy_namespaces: true,
        };

        let staged = CommandTranspiler::stage_overlays(&request).unwrap().unwrap();
        let reader = crate::archive::ArchiveReader::open(&staged).unwrap();
        assert_eq!(reader.file_names(), vec!["com/example/Foo.native.js"]);

        let args = strings(&CommandTranspiler::args(&request, Some(staged.clone())).unwrap());
        assert_eq!(args[0], "-d");
        assert!(args.contains(&"-declarelegacynamespaces".to_string()));
        let idx = args.iter().position(|a| a == "-nativesourcepath").unwrap();
        assert_eq!(args[idx + 1], staged.to_string_lossy());
        assert_eq!(args.last().unwrap(), "Foo.java");
    }

    #[test]
    fn no_overlays_no_archive() {
        let dir = TempDir::new().unwrap();
        let request = TranspileRequest {
            sources: vec![PathBuf::from("Foo.java")],
            overlays: Vec::new(),
            classpath: Vec::new(),
            output_dir: PathBuf::from("out"),
            scratch_dir: dir.path().join("scratch"),
            declare_legacy_namespaces: false,
        };
        assert!(CommandTranspiler::stage_overlays(&request).unwrap().is_none());
        assert!(!dir.path().join("scratch").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exec_collects_output_and_exit_code() {
        let tool = ProcessTool::new(
            "transpiler",
            ToolConfig {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), "echo 'Error: bad' >&2; exit 3".to_string()],
            },
        );
        let (code, output) = tool.exec(Vec::new()).await.unwrap();
        assert_eq!(code, 3);
        assert_eq!(output, vec!["Error: bad".to_string()]);
    }

    #[tokio::test]
    async fn missing_program_is_launch_error() {
        let tool = ProcessTool::new("compiler", ToolConfig::new("devloop-no-such-program"));
        let err = tool.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, DevloopError::CommandFailed { .. }));
    }
}
