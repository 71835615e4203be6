//! Subprocess execution.
//!
//! Runs external commands with the job's environment overlay and streams
//! their output through the job console.

pub mod process;

pub use process::{run, ExecError, ExecRequest};
