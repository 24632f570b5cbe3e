// src/dag/state.rs

//! Lifecycle states shared by jobs and workflows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job or of a whole workflow.
///
/// ```text
/// NOT_STARTED -> IN_PROGRESS -> COMPLETED | FAILED | TIMED_OUT
///                IN_PROGRESS -> STOPPING  -> STOPPED
/// ```
///
/// `NOT_STARTED -> FAILED` is also allowed: a job whose parent failed is
/// marked failed without ever running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    NotStarted,
    InProgress,
    Stopping,
    Stopped,
    Completed,
    Failed,
    TimedOut,
}

impl TaskState {
    /// `COMPLETED`, `FAILED`, `TIMED_OUT` and `STOPPED`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::TimedOut | TaskState::Stopped
        )
    }

    /// Started but not yet terminal. These count against `parallel_jobs`.
    pub fn is_incomplete(self) -> bool {
        matches!(self, TaskState::InProgress | TaskState::Stopping)
    }

    /// Whether moving from `self` to `next` follows a forward edge.
    ///
    /// Cancellation always passes through `STOPPING`. Re-asserting the current
    /// state is accepted as a no-op.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;

        if self == next {
            return true;
        }

        match self {
            NotStarted => matches!(next, InProgress | Failed),
            InProgress => matches!(next, Completed | Failed | TimedOut | Stopping),
            Stopping => next == Stopped,
            Stopped | Completed | Failed | TimedOut => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::NotStarted => "NOT_STARTED",
            TaskState::InProgress => "IN_PROGRESS",
            TaskState::Stopping => "STOPPING",
            TaskState::Stopped => "STOPPED",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
            TaskState::TimedOut => "TIMED_OUT",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NOT_STARTED" => Ok(TaskState::NotStarted),
            "IN_PROGRESS" => Ok(TaskState::InProgress),
            "STOPPING" => Ok(TaskState::Stopping),
            "STOPPED" => Ok(TaskState::Stopped),
            "COMPLETED" => Ok(TaskState::Completed),
            "FAILED" => Ok(TaskState::Failed),
            "TIMED_OUT" => Ok(TaskState::TimedOut),
            other => Err(format!("invalid task state: {other}")),
        }
    }
}

/// Requested state of a workflow, set by whoever submits or controls it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// Schedule jobs normally.
    #[default]
    Start,
    /// Wind the workflow down: in-progress jobs move to `STOPPING`, then `STOPPED`.
    Stop,
}

/// Derive a workflow's aggregate state from its jobs' states.
///
/// Jobs missing from `job_states` count as `NOT_STARTED`.
pub fn aggregate_workflow_state<I>(job_states: I) -> TaskState
where
    I: IntoIterator<Item = Option<TaskState>>,
{
    let mut any_started = false;
    let mut all_terminal = true;
    let mut any_failed = false;
    let mut any_timed_out = false;
    let mut any_stopped = false;

    for state in job_states {
        let state = state.unwrap_or_default();
        if state != TaskState::NotStarted {
            any_started = true;
        }
        if !state.is_terminal() {
            all_terminal = false;
        }
        match state {
            TaskState::Failed => any_failed = true,
            TaskState::TimedOut => any_timed_out = true,
            TaskState::Stopped => any_stopped = true,
            _ => {}
        }
    }

    if !any_started {
        TaskState::NotStarted
    } else if !all_terminal {
        TaskState::InProgress
    } else if any_failed {
        TaskState::Failed
    } else if any_timed_out {
        TaskState::TimedOut
    } else if any_stopped {
        TaskState::Stopped
    } else {
        TaskState::Completed
    }
}
