// src/dag/scheduler_step.rs

//! Result type of one scheduler tick over one workflow.

use crate::dag::context::StateTransition;
use crate::rebalance::ResourceAssignment;

/// Why a workflow produced no scheduling decisions this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `start_time` is still in the future.
    NotYetStarted,
}

/// Structured result of a single scheduler tick.
///
/// Useful for tests that step a workflow manually and make assertions about
/// what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    pub workflow: String,
    /// Assignments to hand to the execution layer, one per resource.
    pub assignments: Vec<ResourceAssignment>,
    /// Jobs moved to `IN_PROGRESS` in this tick.
    pub newly_scheduled: Vec<String>,
    /// Jobs marked `FAILED` in this tick, by dependency propagation or from
    /// observed task errors.
    pub newly_failed: Vec<String>,
    /// Jobs named by the DAG that have no job config.
    pub config_missing: Vec<String>,
    /// Resources whose assignment could not be computed; their observed
    /// state is left untouched until the next tick.
    pub assignment_failures: Vec<String>,
    /// Every state change recorded during the tick, in order.
    pub transitions: Vec<StateTransition>,
    pub skipped: Option<SkipReason>,
}

impl SchedulerStep {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            ..Self::default()
        }
    }

    pub fn assignment_for(&self, resource: &str) -> Option<&ResourceAssignment> {
        self.assignments.iter().find(|a| a.resource == resource)
    }
}
