// src/engine/mod.rs

//! Control loop for taskdag.
//!
//! This module ties together:
//! - the workflow store and the per-workflow runtime contexts
//! - the per-workflow scheduler ticks
//! - the event loop that reacts to:
//!   - timer ticks
//!   - workflow submission / removal / stop requests
//!   - cluster snapshot changes
//!   - externally reported job states (timeouts, completions)
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell that
//! runs workflow ticks in parallel is implemented in [`runtime`].

use std::sync::Arc;

use crate::config::model::WorkflowDefinition;
use crate::dag::TaskState;
use crate::rebalance::{ClusterSnapshot, CurrentStateOutput};

/// Why a tick was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReason {
    /// Recurring timer.
    Timer,
    /// A workflow was submitted, stopped or removed.
    ConfigChange,
    /// Cluster snapshot or observed state changed.
    ClusterChange,
    /// A job state was reported from outside.
    StateReport,
    Manual,
}

/// Options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerOptions {
    /// Run a tick right after every change notification.
    pub tick_on_change: bool,
    /// Exit once every workflow is terminal and a tick produced no
    /// assignments.
    pub exit_when_idle: bool,
    /// Exit after this many ticks.
    pub max_ticks: Option<u64>,
}

/// Events flowing into the control loop.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Tick {
        reason: TickReason,
    },
    /// A workflow was submitted (already validated).
    WorkflowSubmitted(Arc<WorkflowDefinition>),
    WorkflowRemoved {
        workflow: String,
    },
    /// Wind a submitted workflow down: running jobs go `STOPPING`, then
    /// `STOPPED` once their replicas are gone.
    WorkflowStopRequested {
        workflow: String,
    },
    /// Fresh cluster snapshot and observed current state.
    ClusterChanged {
        snapshot: Arc<ClusterSnapshot>,
        current_state: Arc<CurrentStateOutput>,
    },
    /// A job state written by an external collaborator, e.g. `TIMED_OUT`.
    JobStateReported {
        workflow: String,
        job: String,
        state: TaskState,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod runtime;

pub use self::core::{CoreCommand, CoreController, CoreStep, WorkflowTick, WorkflowTickOutput};
pub use runtime::Runtime;
