//! Mutable per-job execution state.

use std::collections::HashMap;
use std::path::PathBuf;

use gale_protocol::BuildResult;

/// State threaded through the interpretation of one command tree.
///
/// Created when a build message arrives and dropped when the job terminates;
/// never shared across jobs.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Running pass/fail status the `runIf` gates are evaluated against.
    pub running: BuildResult,
    /// Variables layered on top of the OS environment for subprocesses.
    pub env: HashMap<String, String>,
    /// Current working directory, anchored at the job's pipeline directory.
    pub wd: PathBuf,
}

impl ExecutionContext {
    pub fn new(pipeline_dir: PathBuf) -> Self {
        Self {
            running: BuildResult::Passed,
            env: HashMap::new(),
            wd: pipeline_dir,
        }
    }
}
