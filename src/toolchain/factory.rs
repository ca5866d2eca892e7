//! Toolchain factory

use crate::config::schema::ToolchainConfig;
use crate::toolchain::process::{
    CommandBundler, CommandCompiler, CommandPreprocessor, CommandTranspiler,
};
use crate::toolchain::Toolchain;
use std::path::PathBuf;
use std::sync::Arc;

/// Create the process-backed toolchain described by `[toolchain]`.
///
/// `store_file` is where the bundler's persistent input store is written
/// before each bundle invocation.
pub fn create_toolchain(config: &ToolchainConfig, store_file: PathBuf) -> Toolchain {
    Toolchain {
        compiler: Arc::new(CommandCompiler::new(config.compiler.clone())),
        preprocessor: Arc::new(CommandPreprocessor::new(config.preprocessor.clone())),
        transpiler: Arc::new(CommandTranspiler::new(config.transpiler.clone())),
        bundler: Arc::new(CommandBundler::new(
            config.bundler.clone(),
            config.bundler_store_flag.clone(),
            store_file,
        )),
    }
}
