//! Job console streaming.
//!
//! Everything a job prints - command output, subprocess streams, error
//! lines - flows through one [`Console`] per job, which timestamps and
//! secret-masks each line and delivers the accumulated buffer to the
//! server's console ingestion endpoint.

pub mod secrets;
pub mod writer;

pub use secrets::{SecretTable, DEFAULT_MASK};
pub use writer::{Console, ConsoleConfig};
