// src/exec/mod.rs

//! Hand-off layer between the scheduler and whatever executes tasks.
//!
//! - [`backend`] provides the `AssignmentSink` trait and a channel-backed
//!   implementation for production hosts.
//! - [`simulated`] provides an in-memory executor for the CLI.

pub mod backend;
pub mod simulated;

pub use backend::{AssignmentSink, ChannelAssignmentSink, SinkFuture};
pub use simulated::SimulatedExecutor;
