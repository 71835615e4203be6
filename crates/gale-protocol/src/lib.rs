//! Wire protocol shared between the Gale server and its build agents.
//!
//! A build job is expressed as a recursive tree of [`BuildCommand`] nodes.
//! The server sends the tree inside a [`ServerMessage::Build`] envelope; the
//! agent interprets it and reports lifecycle transitions back with
//! [`AgentMessage`] envelopes. Both envelopes are internally tagged JSON so
//! either side can dispatch on the `type` field without peeking at payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod commands;

/// Condition gating a command against the job's running status.
///
/// The gate is evaluated against the status at the moment of dispatch, not
/// the status the job started with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunIf {
    #[default]
    Passed,
    Failed,
    Any,
}

/// One node in a build command tree.
///
/// `name` selects the handler, `args` are positional strings, and `children`
/// carry nested commands for container commands such as `compose`. The
/// optional `test` command acts as a predicate: the node only runs when its
/// test executes without failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCommand {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub run_if: RunIf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<Box<BuildCommand>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BuildCommand>,
}

impl BuildCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            working_dir: None,
            run_if: RunIf::default(),
            test: None,
            children: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory, resolved against the enclosing command's
    /// directory when the tree is interpreted.
    pub fn setwd(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn run_if(mut self, run_if: RunIf) -> Self {
        self.run_if = run_if;
        self
    }

    pub fn with_test(mut self, test: BuildCommand) -> Self {
        self.test = Some(Box::new(test));
        self
    }

    pub fn with_children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = BuildCommand>,
    {
        self.children = children.into_iter().collect();
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    // Constructors for the built-in command set.

    pub fn compose<I>(children: I) -> Self
    where
        I: IntoIterator<Item = BuildCommand>,
    {
        Self::new(commands::COMPOSE).with_children(children)
    }

    pub fn echo<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(commands::ECHO).with_args(args)
    }

    pub fn exec<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all = vec![program.into()];
        all.extend(args.into_iter().map(Into::into));
        Self::new(commands::EXEC).with_args(all)
    }

    pub fn export(
        name: impl Into<String>,
        value: impl Into<String>,
        secure: impl Into<String>,
    ) -> Self {
        Self::new(commands::EXPORT).with_args([name.into(), value.into(), secure.into()])
    }

    /// Export the agent's current value of an OS environment variable.
    pub fn export_env(name: impl Into<String>) -> Self {
        Self::new(commands::EXPORT).with_args([name.into()])
    }

    pub fn mkdirs(path: impl Into<String>) -> Self {
        Self::new(commands::MKDIRS).with_args([path.into()])
    }

    pub fn cleandir<I, S>(keep: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(commands::CLEANDIR).with_args(keep)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(commands::FAIL).with_args([message.into()])
    }

    pub fn secret(plain: impl Into<String>) -> Self {
        Self::new(commands::SECRET).with_args([plain.into()])
    }

    pub fn secret_with_mask(plain: impl Into<String>, mask: impl Into<String>) -> Self {
        Self::new(commands::SECRET).with_args([plain.into(), mask.into()])
    }

    pub fn upload_artifact(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::new(commands::UPLOAD_ARTIFACT).with_args([source.into(), destination.into()])
    }

    pub fn download_artifact(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self::new(commands::DOWNLOAD_ARTIFACT).with_args([source.into(), destination.into()])
    }

    pub fn generate_test_report<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(commands::GENERATE_TEST_REPORT).with_args(sources)
    }

    pub fn end() -> Self {
        Self::new(commands::END)
    }
}

/// Agent lifecycle state as reported to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    Idle,
    Building,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Idle => f.write_str("Idle"),
            AgentState::Building => f.write_str("Building"),
        }
    }
}

/// Terminal outcome of a build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildResult {
    Passed,
    Failed,
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildResult::Passed => f.write_str("Passed"),
            BuildResult::Failed => f.write_str("Failed"),
        }
    }
}

/// A build job assignment.
///
/// `console_url` and `artifact_url` are the ingestion endpoints the agent
/// streams the job's console log to and exchanges artifacts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    pub build_id: String,
    pub pipeline_name: String,
    pub console_url: String,
    pub artifact_url: String,
    pub root: BuildCommand,
}

/// Messages the server sends to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Build(BuildSpec),
    Cancel { build_id: String },
    Reregister,
    Ping,
}

/// Messages an agent sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum AgentMessage {
    Ping,
    Register {
        agent_id: String,
        hostname: String,
    },
    ReportCurrentStatus {
        state: AgentState,
    },
    ReportCompleting {
        build_id: String,
        result: BuildResult,
    },
    ReportCompleted {
        build_id: String,
        result: BuildResult,
    },
}
