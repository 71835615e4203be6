//! Build session: the command-tree interpreter.
//!
//! One session runs one job. It evaluates the recursive command tree under
//! an [`ExecutionContext`], gates every node on `runIf` against the current
//! running status, rebases and sandbox-checks working directories, and
//! reports the job's lifecycle transitions on the outbound channel.

pub mod commands;
pub mod context;
pub mod registry;
pub mod vars;

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use gale_protocol::{AgentMessage, AgentState, BuildCommand, BuildResult, BuildSpec, RunIf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::artifacts::ArtifactClient;
use crate::config::Config;
use crate::console::{Console, ConsoleConfig};
use crate::nunit;
pub use context::ExecutionContext;
pub use registry::CommandRegistry;
pub use vars::BuildVars;

/// Interpreter for one build job.
pub struct BuildSession {
    pub(crate) build_id: String,
    pipeline_dir: PathBuf,
    sandbox: PathBuf,
    pub(crate) console: Console,
    pub(crate) artifacts: ArtifactClient,
    registry: CommandRegistry,
    vars: BuildVars,
    reports: mpsc::Sender<AgentMessage>,
    pub(crate) cancel: CancellationToken,
    pub(crate) ctx: ExecutionContext,
    /// Set on sandbox violations; short-circuits the rest of the tree.
    fatal: bool,
    pub(crate) test_totals: nunit::TestResults,
}

impl BuildSession {
    pub fn new(
        config: &Config,
        http: reqwest::Client,
        build: &BuildSpec,
        reports: mpsc::Sender<AgentMessage>,
        cancel: CancellationToken,
    ) -> Self {
        let console = Console::new(
            http.clone(),
            ConsoleConfig::new(&build.console_url)
                .flush_interval_ms(config.console_flush_interval_ms),
        );
        let artifacts = ArtifactClient::new(http, &build.artifact_url);
        let pipeline_dir = config.pipeline_dir(&build.pipeline_name);

        Self {
            build_id: build.build_id.clone(),
            ctx: ExecutionContext::new(pipeline_dir.clone()),
            pipeline_dir,
            sandbox: config.working_dir.clone(),
            console,
            artifacts,
            registry: CommandRegistry::builtin(),
            vars: BuildVars {
                agent_location: config.working_dir.display().to_string(),
                agent_hostname: config.hostname.clone(),
            },
            reports,
            cancel,
            fatal: false,
            test_totals: nunit::TestResults::new(),
        }
    }

    /// Execute the job's root command and report the lifecycle transitions.
    pub async fn run(&mut self, root: &BuildCommand) -> BuildResult {
        info!("build {} starting", self.build_id);
        self.report(AgentMessage::ReportCurrentStatus {
            state: AgentState::Building,
        })
        .await;

        match tokio::fs::create_dir_all(&self.pipeline_dir).await {
            Ok(()) => self.process(root).await,
            Err(e) => {
                self.console
                    .write(&format!("ERROR: cannot create pipeline directory: {e}"));
                self.ctx.running = BuildResult::Failed;
            }
        }

        let result = if self.cancel.is_cancelled() || self.fatal {
            BuildResult::Failed
        } else {
            self.ctx.running
        };
        info!("build {} completed: {result}", self.build_id);

        self.report(AgentMessage::ReportCompleted {
            build_id: self.build_id.clone(),
            result,
        })
        .await;

        // Pending console data is flushed on job teardown.
        self.console.close().await;

        self.report(AgentMessage::ReportCurrentStatus {
            state: AgentState::Idle,
        })
        .await;

        result
    }

    /// Evaluate one command under the current context.
    pub(crate) fn process<'a>(
        &'a mut self,
        cmd: &'a BuildCommand,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if self.cancel.is_cancelled() || self.fatal {
                return;
            }
            if !self.should_run(cmd.run_if) {
                return;
            }
            if let Some(test) = &cmd.test {
                if !self.probe(test).await {
                    return;
                }
            }

            let cmd = self.interpolate(cmd);

            let saved_wd = self.ctx.wd.clone();
            if let Some(dir) = &cmd.working_dir {
                match self.rebase(dir) {
                    Ok(wd) => self.ctx.wd = wd,
                    Err(message) => {
                        self.console.write(&format!("ERROR: {message}"));
                        self.ctx.running = BuildResult::Failed;
                        self.fatal = true;
                        return;
                    }
                }
            }

            let outcome = self.dispatch(&cmd).await;
            self.ctx.wd = saved_wd;

            match outcome {
                Ok(true) => {}
                Ok(false) => self.ctx.running = BuildResult::Failed,
                Err(e) => {
                    self.console.write(&format!("ERROR: {e}"));
                    self.ctx.running = BuildResult::Failed;
                }
            }
        })
    }

    fn should_run(&self, run_if: RunIf) -> bool {
        match run_if {
            RunIf::Passed => self.ctx.running == BuildResult::Passed,
            RunIf::Failed => self.ctx.running == BuildResult::Failed,
            RunIf::Any => true,
        }
    }

    /// Evaluate a `test` predicate. The probe shares secrets and the
    /// environment overlay with the job but leaves the running status
    /// untouched.
    async fn probe(&mut self, test: &BuildCommand) -> bool {
        let saved = self.ctx.running;
        self.ctx.running = BuildResult::Passed;
        self.process(test).await;
        let truthy = self.ctx.running == BuildResult::Passed;
        self.ctx.running = saved;
        truthy
    }

    /// Clone `cmd` with build variables expanded in its args and working
    /// directory. Children are interpolated when their turn comes.
    fn interpolate(&self, cmd: &BuildCommand) -> BuildCommand {
        let mut cmd = cmd.clone();
        for arg in &mut cmd.args {
            *arg = self.vars.expand(arg);
        }
        if let Some(dir) = &cmd.working_dir {
            cmd.working_dir = Some(self.vars.expand(dir));
        }
        cmd
    }

    /// Resolve `dir` against the current working directory and reject
    /// results that escape the sandbox root.
    fn rebase(&self, dir: &str) -> Result<PathBuf, String> {
        let resolved = normalize(&self.ctx.wd.join(dir));
        if resolved.starts_with(&self.sandbox) {
            Ok(resolved)
        } else {
            Err(format!(
                "working directory '{dir}' is outside the agent sandbox"
            ))
        }
    }

    async fn dispatch(&mut self, cmd: &BuildCommand) -> crate::Result<bool> {
        match self.registry.get(&cmd.name) {
            Some(handler) => handler(self, cmd).await,
            None => {
                // Exact text existing server-side log assertions match,
                // typo included.
                self.console.write(&format!(
                    "WARN: Golang Agent does not support build comamnd '{}'",
                    cmd.name
                ));
                Ok(true)
            }
        }
    }

    /// Push a state transition to the server. Transport errors are logged
    /// and swallowed; they never abort the job.
    async fn report(&self, message: AgentMessage) {
        if self.reports.send(message).await.is_err() {
            warn!("state report dropped: transport closed");
        }
    }
}

/// Lexically normalize a path, resolving `.` and `..` components without
/// touching the filesystem (intermediate directories may not exist yet).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
