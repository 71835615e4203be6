//! Gale Agent - build agent for the Gale CI server.
//!
//! The agent connects to a central server over a duplex WebSocket channel,
//! registers itself, and executes build jobs expressed as recursive trees of
//! declarative build commands. For each job it:
//! - streams a timestamped, secret-masked console log back to the server,
//! - runs subprocesses with the job's environment overlay,
//! - uploads produced artifacts as checksummed zip archives,
//! - reports lifecycle transitions (Building, Passed/Failed, Idle).
//!
//! Only one job runs at a time; cancellation terminates any in-flight
//! subprocess and skips the remaining commands.

pub mod artifacts;
pub mod config;
pub mod connection;
pub mod console;
pub mod executor;
pub mod nunit;
pub mod session;

pub use config::Config;
pub use connection::Client;
pub use console::{Console, SecretTable};
pub use session::BuildSession;

/// Agent result type
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Execution error: {0}")]
    Execution(#[from] executor::ExecError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] artifacts::ArtifactError),

    #[error("Build error: {0}")]
    Build(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
