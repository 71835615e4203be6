//! Connection management.
//!
//! Handles the WebSocket channel to the Gale server: registration, the
//! inbound message pump, the one-job-at-a-time guard, and outbound state
//! reports and pings.

pub mod client;

pub use client::{Client, WsStream};
