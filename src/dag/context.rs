// src/dag/context.rs

//! Mutable runtime state of one workflow.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::dag::graph::JobDag;
use crate::dag::state::TaskState;
use crate::errors::{Result, TaskdagError};

/// A recorded state change, published after every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub workflow: String,
    /// `None` for a workflow-level transition.
    pub job: Option<String>,
    pub from: TaskState,
    pub to: TaskState,
    pub cause: Option<String>,
}

/// Job states as they were at the start of a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStateSnapshot {
    states: BTreeMap<String, TaskState>,
}

impl JobStateSnapshot {
    pub fn get(&self, job: &str) -> Option<TaskState> {
        self.states.get(job).copied()
    }
}

/// Per-workflow runtime context: job name -> state, plus the aggregate state.
///
/// Only the scheduler loop writes to a context. Everyone else works on a
/// clone (see [`WorkflowContext::snapshot`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowContext {
    workflow: String,
    workflow_state: TaskState,
    job_states: BTreeMap<String, TaskState>,
    failure_causes: BTreeMap<String, String>,
    transitions: Vec<StateTransition>,
}

impl WorkflowContext {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            workflow_state: TaskState::NotStarted,
            job_states: BTreeMap::new(),
            failure_causes: BTreeMap::new(),
            transitions: Vec::new(),
        }
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn workflow_state(&self) -> TaskState {
        self.workflow_state
    }

    /// Recorded state of `job`; `None` if the job never entered the context.
    pub fn job_state(&self, job: &str) -> Option<TaskState> {
        self.job_states.get(job).copied()
    }

    pub fn job_states(&self) -> impl Iterator<Item = (&str, TaskState)> {
        self.job_states.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Why `job` was marked failed, if a cause was recorded.
    pub fn failure_cause(&self, job: &str) -> Option<&str> {
        self.failure_causes.get(job).map(String::as_str)
    }

    /// Copy of the job states for consistent reads during one tick.
    pub fn snapshot(&self) -> JobStateSnapshot {
        JobStateSnapshot {
            states: self.job_states.clone(),
        }
    }

    /// Number of DAG jobs that are started but not finished
    /// (`IN_PROGRESS` or `STOPPING`). Always computed from the current map.
    pub fn incomplete_job_count(&self, dag: &JobDag) -> usize {
        dag.all_nodes()
            .filter(|job| self.job_state(job).is_some_and(TaskState::is_incomplete))
            .count()
    }

    /// Move `job` to `state`, enforcing forward-only transitions.
    ///
    /// Returns `Ok(true)` if the state changed and `Ok(false)` if the job was
    /// already in `state`.
    pub fn set_job_state(&mut self, job: &str, state: TaskState) -> Result<bool> {
        self.set_job_state_with_cause(job, state, None)
    }

    pub fn set_job_state_with_cause(
        &mut self,
        job: &str,
        state: TaskState,
        cause: Option<&str>,
    ) -> Result<bool> {
        let from = self.job_state(job).unwrap_or_default();

        if from == state {
            return Ok(false);
        }
        if !from.can_transition_to(state) {
            return Err(TaskdagError::InvalidTransition {
                job: job.to_string(),
                from,
                to: state,
            });
        }

        self.job_states.insert(job.to_string(), state);
        if let Some(cause) = cause {
            self.failure_causes.insert(job.to_string(), cause.to_string());
        }

        info!(
            workflow = %self.workflow,
            job = %job,
            from = %from,
            to = %state,
            "job state transition"
        );

        self.transitions.push(StateTransition {
            workflow: self.workflow.clone(),
            job: Some(job.to_string()),
            from,
            to: state,
            cause: cause.map(str::to_string),
        });

        Ok(true)
    }

    /// Set the aggregate workflow state. Terminal workflow states are sticky.
    pub fn set_workflow_state(&mut self, state: TaskState) -> bool {
        let from = self.workflow_state;
        if from == state {
            return false;
        }
        if from.is_terminal() {
            debug!(
                workflow = %self.workflow,
                from = %from,
                to = %state,
                "ignoring workflow transition out of a terminal state"
            );
            return false;
        }

        self.workflow_state = state;
        info!(
            workflow = %self.workflow,
            from = %from,
            to = %state,
            "workflow state transition"
        );
        self.transitions.push(StateTransition {
            workflow: self.workflow.clone(),
            job: None,
            from,
            to: state,
            cause: None,
        });
        true
    }

    /// Take the transitions recorded since the last drain.
    pub fn drain_transitions(&mut self) -> Vec<StateTransition> {
        std::mem::take(&mut self.transitions)
    }
}
