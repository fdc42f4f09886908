//! Engine backends that materialize and run evaluations inside a jail.

mod node;

pub use node::NodeBackend;

use crate::error::Error;
use crate::types::Capabilities;
use async_trait::async_trait;
use std::path::Path;

/// Bootstrap written into the jail, relative to its root
pub(crate) const BOOTSTRAP_FILE: &str = "tmp/bootstrap.js";
/// Injected globals, relative to the jail root
pub(crate) const GLOBALS_FILE: &str = "tmp/globals.json";
/// Completion value left behind by the bootstrap, relative to the jail root
pub(crate) const RESULT_FILE: &str = "tmp/result.out";
/// Exit code the bootstrap uses for scripts that failed to evaluate
pub(crate) const EVAL_FAILURE_CODE: i32 = 70;

/// A script engine the sandbox can drive.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// File extension for source files
    fn file_extension(&self) -> &str;

    /// Command that runs an evaluation
    fn run_command(&self) -> &str;

    /// Arguments for the run command, relative to the jail root
    fn run_args(&self) -> Vec<String>;

    /// Where the sandbox writes the script source, relative to the jail root
    fn source_file(&self) -> String {
        format!("tmp/source.{}", self.file_extension())
    }

    /// Check that the engine binary is available
    async fn check_tools(&self) -> Result<(), Error>;

    /// Write the bootstrap that builds the restricted evaluation context
    /// for the given grants and runs the script in it
    async fn write_bootstrap(
        &self,
        jail_dir: &Path,
        capabilities: &Capabilities,
        has_globals: bool,
    ) -> Result<(), Error>;
}
