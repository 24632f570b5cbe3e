// src/dag/readiness.rs

//! Readiness checks for jobs and workflows.
//!
//! [`evaluate_job_readiness`] is the pure classification; it only reads.
//! [`is_job_ready_to_schedule`] applies its one side effect: a job whose
//! parent failed (and which does not ignore that) is marked `FAILED`.
//!
//! Failure propagation is lazy. Marking a job failed does not touch its
//! children; they see the failure the next time they are evaluated, so a
//! failure settles one DAG level per tick.

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::config::model::{WorkflowConfig, WorkflowDefinition};
use crate::dag::context::{JobStateSnapshot, WorkflowContext};
use crate::dag::state::TaskState;
use crate::errors::{Result, TaskdagError};

/// Parent states of one job, bucketed the way readiness needs them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParentSummary {
    /// Parents absent from the context or `NOT_STARTED`.
    pub not_started: usize,
    /// Parents `FAILED` or `TIMED_OUT`.
    pub failed_or_timed_out: usize,
    /// Parents started but not `COMPLETED` (and not failed).
    pub incomplete: usize,
}

/// Outcome of evaluating one job for this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReadiness {
    Ready,
    /// At least one parent has not started. Blocks exactly like an
    /// in-progress parent.
    ParentsNotStarted(usize),
    /// The DAG names the job but no job config exists.
    ConfigMissing,
    /// Parents failed or timed out and the job does not ignore that; the job
    /// must be marked `FAILED`.
    DependencyFailed(usize),
    /// Job queue is at its `parallel_jobs` limit.
    ParallelismExhausted { incomplete: usize, limit: usize },
    /// Generic workflow: some parent is still running.
    ParentsIncomplete(usize),
}

impl JobReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, JobReadiness::Ready)
    }
}

/// Bucket the direct parents of `job` by their state in `states`.
pub fn summarize_parents(job: &str, workflow: &WorkflowDefinition, states: &JobStateSnapshot) -> ParentSummary {
    let mut summary = ParentSummary::default();

    for parent in workflow.dag.direct_parents(job) {
        match states.get(parent) {
            None | Some(TaskState::NotStarted) => summary.not_started += 1,
            Some(TaskState::Failed) | Some(TaskState::TimedOut) => summary.failed_or_timed_out += 1,
            Some(TaskState::Completed) => {}
            Some(_) => summary.incomplete += 1,
        }
    }

    summary
}

/// Decide whether `job` may be scheduled now, without side effects.
///
/// `incomplete_all_count` is the number of jobs in the workflow that are
/// currently started but unfinished, including jobs started earlier in the
/// same tick.
pub fn evaluate_job_readiness(
    job: &str,
    workflow: &WorkflowDefinition,
    states: &JobStateSnapshot,
    incomplete_all_count: usize,
) -> JobReadiness {
    let parents = summarize_parents(job, workflow, states);

    if parents.not_started > 0 {
        debug!(
            workflow = %workflow.name,
            job = %job,
            not_started_parents = parents.not_started,
            "job is not ready to start"
        );
        return JobReadiness::ParentsNotStarted(parents.not_started);
    }

    let job_config = match workflow.job_config(job) {
        Ok(config) => config,
        Err(err) => {
            error!(
                workflow = %workflow.name,
                job = %job,
                error = %err,
                "job is not ready to start"
            );
            return JobReadiness::ConfigMissing;
        }
    };

    if parents.failed_or_timed_out > 0 && !job_config.ignore_dependent_job_failure {
        debug!(
            workflow = %workflow.name,
            job = %job,
            failed_parents = parents.failed_or_timed_out,
            "job is not ready to start; a parent failed"
        );
        return JobReadiness::DependencyFailed(parents.failed_or_timed_out);
    }

    if workflow.config.job_queue {
        let limit = workflow.config.parallel_jobs;
        if incomplete_all_count >= limit {
            debug!(
                workflow = %workflow.name,
                job = %job,
                incomplete_jobs = incomplete_all_count,
                parallel_jobs = limit,
                "job is not ready to schedule; job queue is full"
            );
            return JobReadiness::ParallelismExhausted {
                incomplete: incomplete_all_count,
                limit,
            };
        }
    } else if parents.incomplete > 0 {
        debug!(
            workflow = %workflow.name,
            job = %job,
            unfinished_parents = parents.incomplete,
            "job is not ready to start; parents still running"
        );
        return JobReadiness::ParentsIncomplete(parents.incomplete);
    }

    JobReadiness::Ready
}

/// Evaluate `job` against `snapshot` and apply the one side effect readiness
/// has: a job whose parent failure is not ignored is marked `FAILED` in
/// `context`.
///
/// The scheduler passes the snapshot it took at the start of its DAG walk;
/// [`is_job_ready_to_schedule`] passes the context's current states.
pub fn check_job_readiness(
    job: &str,
    workflow: &WorkflowDefinition,
    snapshot: &JobStateSnapshot,
    context: &mut WorkflowContext,
    incomplete_all_count: usize,
) -> Result<JobReadiness> {
    let readiness = evaluate_job_readiness(job, workflow, snapshot, incomplete_all_count);

    if let JobReadiness::DependencyFailed(count) = readiness {
        let cause = format!("{count} parent job(s) failed or timed out");
        mark_job_failed(job, Some(&cause), workflow, context)?;
    }

    Ok(readiness)
}

/// Readiness check against the context's current states, marking the job
/// `FAILED` when a parent failure propagates to it.
pub fn is_job_ready_to_schedule(
    job: &str,
    workflow: &WorkflowDefinition,
    context: &mut WorkflowContext,
    incomplete_all_count: usize,
) -> bool {
    let snapshot = context.snapshot();
    match check_job_readiness(job, workflow, &snapshot, context, incomplete_all_count) {
        Ok(readiness) => readiness.is_ready(),
        Err(err) => {
            warn!(workflow = %workflow.name, job = %job, error = %err, "could not mark job failed");
            false
        }
    }
}

/// Mark `job` as `FAILED` in `context`.
///
/// Children are not visited; they pick the failure up on their own next
/// evaluation. Returns `Ok(false)` if the job was already failed.
pub fn mark_job_failed(
    job: &str,
    cause: Option<&str>,
    workflow: &WorkflowDefinition,
    context: &mut WorkflowContext,
) -> Result<bool> {
    if !workflow.dag.contains(job) {
        return Err(TaskdagError::UnknownJob {
            workflow: workflow.name.clone(),
            job: job.to_string(),
        });
    }
    context.set_job_state_with_cause(job, TaskState::Failed, cause)
}

/// A workflow is ready once its `start_time` (if any) is not in the future.
pub fn is_workflow_ready_for_schedule(config: &WorkflowConfig, now: DateTime<Utc>) -> bool {
    config.start_time.is_none_or(|start| start <= now)
}

/// True iff no job of the workflow is `IN_PROGRESS` or `STOPPING`.
pub fn is_workflow_stopped(context: &WorkflowContext, workflow: &WorkflowDefinition) -> bool {
    !workflow.dag.all_nodes().any(|job| {
        matches!(
            context.job_state(job),
            Some(TaskState::InProgress) | Some(TaskState::Stopping)
        )
    })
}
