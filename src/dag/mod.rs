// src/dag/mod.rs

//! Job DAG representation and scheduling.
//!
//! - [`graph`] holds the immutable dependency graph of a workflow.
//! - [`state`] defines the job/workflow lifecycle states.
//! - [`context`] holds the mutable per-workflow runtime state.
//! - [`readiness`] decides whether a job or workflow may be scheduled.
//! - [`scheduler`] runs one tick over one workflow.
//! - [`scheduler_step`] defines the result type for a tick.

pub mod context;
pub mod graph;
pub mod readiness;
pub mod scheduler;
pub mod scheduler_step;
pub mod state;

pub use context::{JobStateSnapshot, StateTransition, WorkflowContext};
pub use graph::{JobDag, JobDagBuilder};
pub use readiness::{
    JobReadiness, ParentSummary, check_job_readiness, evaluate_job_readiness,
    is_job_ready_to_schedule, is_workflow_ready_for_schedule, is_workflow_stopped,
    mark_job_failed,
};
pub use scheduler::WorkflowScheduler;
pub use scheduler_step::{SchedulerStep, SkipReason};
pub use state::{TargetState, TaskState, aggregate_workflow_state};
