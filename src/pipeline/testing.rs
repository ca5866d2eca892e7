//! In-process fake toolchain for pipeline tests

use crate::bundle::PersistentInputStore;
use crate::error::DevloopResult;
use crate::source::RootedFile;
use crate::toolchain::{
    BundleRequest, Bundler, BytecodeCompiler, CompileRequest, Preprocessor, Problem, Severity,
    ToolOutcome, Toolchain, TranspileOutcome, TranspileRequest, Transpiler,
};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Source marker that makes the fake compiler fail
pub const COMPILE_ERROR: &str = "COMPILE_ERROR";
/// Source marker that makes the fake transpiler fail
pub const TRANSPILE_ERROR: &str = "TRANSPILE_ERROR";
/// Source marker removed by the fake preprocessor
pub const STRIPPED: &str = "@GwtIncompatible";

#[derive(Default)]
pub struct FakeTools {
    pub compiles: AtomicUsize,
    pub preprocesses: AtomicUsize,
    pub transpiles: AtomicUsize,
    pub resets: AtomicUsize,
    pub bundles: AtomicUsize,
    pub fail_compile: AtomicBool,
    pub fail_preprocess: AtomicBool,
    pub fail_transpile: AtomicBool,
    pub fail_bundle: AtomicBool,
    pub last_overlays: Mutex<Vec<RootedFile>>,
    pub last_bundle_args: Mutex<Vec<String>>,
    pub last_store_len: AtomicUsize,
}

impl FakeTools {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn toolchain(self: &Arc<Self>) -> Toolchain {
        Toolchain {
            compiler: self.clone(),
            preprocessor: self.clone(),
            transpiler: self.clone(),
            bundler: self.clone(),
        }
    }

    pub fn transpile_count(&self) -> usize {
        self.transpiles.load(Ordering::SeqCst)
    }

    pub fn preprocess_count(&self) -> usize {
        self.preprocesses.load(Ordering::SeqCst)
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }
}

fn contains(path: &Path, marker: &str) -> bool {
    fs::read_to_string(path).is_ok_and(|s| s.contains(marker))
}

#[async_trait]
impl BytecodeCompiler for FakeTools {
    async fn compile(&self, request: &CompileRequest) -> DevloopResult<ToolOutcome> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if self.fail_compile.load(Ordering::SeqCst)
            || request.sources.iter().any(|s| contains(s, COMPILE_ERROR))
        {
            return Ok(ToolOutcome::failed(vec!["Foo.java:1: error".to_string()]));
        }
        Ok(ToolOutcome::succeeded())
    }
}

#[async_trait]
impl Preprocessor for FakeTools {
    async fn preprocess(&self, inputs: &[PathBuf], out_dir: &Path) -> DevloopResult<ToolOutcome> {
        self.preprocesses.fetch_add(1, Ordering::SeqCst);
        if self.fail_preprocess.load(Ordering::SeqCst) {
            return Ok(ToolOutcome::failed(vec!["preprocess failed".to_string()]));
        }
        fs::create_dir_all(out_dir).unwrap();
        for input in inputs {
            if contains(input, STRIPPED) {
                continue;
            }
            fs::copy(input, out_dir.join(input.file_name().unwrap())).unwrap();
        }
        Ok(ToolOutcome::succeeded())
    }
}

#[async_trait]
impl Transpiler for FakeTools {
    async fn reset(&self) -> DevloopResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn transpile(&self, request: &TranspileRequest) -> DevloopResult<TranspileOutcome> {
        self.transpiles.fetch_add(1, Ordering::SeqCst);
        *self.last_overlays.lock().unwrap() = request.overlays.clone();

        if self.fail_transpile.load(Ordering::SeqCst)
            || request.sources.iter().any(|s| contains(s, TRANSPILE_ERROR))
        {
            return Ok(TranspileOutcome {
                exit_code: 1,
                problems: vec![Problem {
                    severity: Severity::Error,
                    message: "cannot transpile".to_string(),
                }],
            });
        }

        fs::create_dir_all(&request.output_dir).unwrap();
        for source in &request.sources {
            let stem = source.file_stem().unwrap().to_string_lossy();
            let body = fs::read_to_string(source).unwrap();
            fs::write(
                request.output_dir.join(format!("{}.java.js", stem)),
                format!("// transpiled\n{}", body),
            )
            .unwrap();
        }
        Ok(TranspileOutcome::default())
    }
}

#[async_trait]
impl Bundler for FakeTools {
    async fn bundle(
        &self,
        request: &BundleRequest,
        store: &PersistentInputStore,
    ) -> DevloopResult<ToolOutcome> {
        self.bundles.fetch_add(1, Ordering::SeqCst);
        *self.last_bundle_args.lock().unwrap() = request.args.clone();
        self.last_store_len.store(store.len(), Ordering::SeqCst);
        if self.fail_bundle.load(Ordering::SeqCst) {
            return Ok(ToolOutcome::failed(vec!["ERROR - missing provide".to_string()]));
        }
        fs::write(&request.output_file, "// bundle").unwrap();
        Ok(ToolOutcome::succeeded())
    }
}
