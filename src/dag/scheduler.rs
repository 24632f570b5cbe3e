// src/dag/scheduler.rs

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::model::WorkflowDefinition;
use crate::dag::context::WorkflowContext;
use crate::dag::readiness::{
    JobReadiness, check_job_readiness, is_workflow_ready_for_schedule, is_workflow_stopped,
};
use crate::dag::scheduler_step::{SchedulerStep, SkipReason};
use crate::dag::state::{TargetState, TaskState, aggregate_workflow_state};
use crate::errors::{Result, TaskdagError};
use crate::rebalance::{
    ClusterSnapshot, CurrentStateOutput, IdealState, RebalancerRegistry, ReplicaState, Resource,
    build_empty_assignment,
};

/// Schedules one workflow for one tick.
///
/// The scheduler borrows everything it reads (definition, strategies, cluster
/// snapshot, observed state) and writes only to the [`WorkflowContext`] passed
/// to [`WorkflowScheduler::tick`]. The caller owns that context for the
/// duration of the tick.
///
/// A tick:
/// 1. tears everything down if the workflow already reached a terminal state;
/// 2. winds jobs down if the workflow's target state is `stop`;
/// 3. skips the workflow if its `start_time` is in the future;
/// 4. folds observed partition states into `IN_PROGRESS` jobs;
/// 5. walks the DAG in node order: assigns running jobs, evaluates readiness
///    of not-started jobs against the job states at this point, and tears
///    down finished jobs that still have replicas;
/// 6. derives the aggregate workflow state.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowScheduler<'a> {
    workflow: &'a WorkflowDefinition,
    registry: &'a RebalancerRegistry,
    cluster: &'a ClusterSnapshot,
    current_state: &'a CurrentStateOutput,
}

impl<'a> WorkflowScheduler<'a> {
    pub fn new(
        workflow: &'a WorkflowDefinition,
        registry: &'a RebalancerRegistry,
        cluster: &'a ClusterSnapshot,
        current_state: &'a CurrentStateOutput,
    ) -> Self {
        Self {
            workflow,
            registry,
            cluster,
            current_state,
        }
    }

    /// Run one tick at wall-clock time `now`.
    pub fn tick(&self, context: &mut WorkflowContext, now: DateTime<Utc>) -> Result<SchedulerStep> {
        if context.workflow() != self.workflow.name {
            return Err(TaskdagError::ConfigError(format!(
                "context for workflow '{}' used to schedule workflow '{}'",
                context.workflow(),
                self.workflow.name
            )));
        }

        let mut step = SchedulerStep::new(&self.workflow.name);

        if context.workflow_state().is_terminal() {
            debug!(
                workflow = %self.workflow.name,
                state = %context.workflow_state(),
                "workflow is terminal; tearing down remaining replicas"
            );
            self.teardown_all(&mut step);
            step.transitions = context.drain_transitions();
            return Ok(step);
        }

        if self.workflow.config.target_state == TargetState::Stop {
            self.wind_down(context, &mut step)?;
            step.transitions = context.drain_transitions();
            return Ok(step);
        }

        if !is_workflow_ready_for_schedule(&self.workflow.config, now) {
            debug!(
                workflow = %self.workflow.name,
                start_time = ?self.workflow.config.start_time,
                "workflow not ready for schedule yet"
            );
            step.skipped = Some(SkipReason::NotYetStarted);
            step.transitions = context.drain_transitions();
            return Ok(step);
        }

        self.update_job_progress(context, &mut step)?;
        self.schedule_jobs(context, &mut step)?;

        let aggregate =
            aggregate_workflow_state(self.workflow.dag.all_nodes().map(|job| context.job_state(job)));
        context.set_workflow_state(aggregate);

        step.transitions = context.drain_transitions();
        Ok(step)
    }

    /// Complete or fail `IN_PROGRESS` jobs based on their observed partitions.
    ///
    /// A job is `COMPLETED` once every partition has a replica observed
    /// `COMPLETED` (a job without partitions completes right away) and
    /// `FAILED` as soon as any replica reports `TASK_ERROR`.
    fn update_job_progress(&self, context: &mut WorkflowContext, step: &mut SchedulerStep) -> Result<()> {
        for job in self.workflow.dag.all_nodes() {
            if context.job_state(job) != Some(TaskState::InProgress) {
                continue;
            }
            let Some(job_config) = self.workflow.jobs.get(job) else {
                continue;
            };

            let resource = self.workflow.resource_name(job);
            let mut all_completed = true;
            let mut error_at = None;

            for partition in &job_config.partitions {
                let observed = self.current_state.state_map(&resource, partition);
                if let Some((instance, _)) = observed
                    .iter()
                    .find(|(_, state)| **state == ReplicaState::TaskError)
                {
                    error_at = Some(format!("partition '{partition}' failed on instance '{instance}'"));
                    break;
                }
                if !observed.values().any(|state| *state == ReplicaState::Completed) {
                    all_completed = false;
                }
            }

            if let Some(cause) = error_at {
                context.set_job_state_with_cause(job, TaskState::Failed, Some(&cause))?;
                step.newly_failed.push(job.to_string());
            } else if all_completed {
                context.set_job_state(job, TaskState::Completed)?;
            }
        }
        Ok(())
    }

    fn schedule_jobs(&self, context: &mut WorkflowContext, step: &mut SchedulerStep) -> Result<()> {
        // Readiness reads parent states as they were before any job of this
        // tick was started or failed.
        let snapshot = context.snapshot();
        let mut incomplete = context.incomplete_job_count(&self.workflow.dag);

        for job in self.workflow.dag.all_nodes() {
            match context.job_state(job).unwrap_or_default() {
                TaskState::NotStarted => {
                    let readiness =
                        check_job_readiness(job, self.workflow, &snapshot, context, incomplete)?;
                    match readiness {
                        JobReadiness::Ready => {
                            context.set_job_state(job, TaskState::InProgress)?;
                            incomplete += 1;
                            info!(workflow = %self.workflow.name, job = %job, "scheduling job");
                            step.newly_scheduled.push(job.to_string());
                            self.assign_job(job, step);
                        }
                        JobReadiness::DependencyFailed(_) => {
                            step.newly_failed.push(job.to_string());
                        }
                        JobReadiness::ConfigMissing => {
                            step.config_missing.push(job.to_string());
                        }
                        JobReadiness::ParentsNotStarted(_)
                        | JobReadiness::ParallelismExhausted { .. }
                        | JobReadiness::ParentsIncomplete(_) => {}
                    }
                }
                TaskState::InProgress => self.assign_job(job, step),
                TaskState::Stopping => self.stop_job(job, context, step)?,
                TaskState::Completed | TaskState::Failed | TaskState::TimedOut | TaskState::Stopped => {
                    self.teardown_job(job, step);
                }
            }
        }

        Ok(())
    }

    /// Cooperative stop: `IN_PROGRESS` -> `STOPPING` now, `STOPPING` ->
    /// `STOPPED` once no replica of the job is observed any more.
    fn wind_down(&self, context: &mut WorkflowContext, step: &mut SchedulerStep) -> Result<()> {
        for job in self.workflow.dag.all_nodes() {
            match context.job_state(job) {
                Some(TaskState::InProgress) => {
                    context.set_job_state(job, TaskState::Stopping)?;
                    self.teardown_job(job, step);
                }
                Some(TaskState::Stopping) => self.stop_job(job, context, step)?,
                Some(state) if state.is_terminal() => self.teardown_job(job, step),
                _ => {}
            }
        }

        if is_workflow_stopped(context, self.workflow) {
            info!(workflow = %self.workflow.name, "workflow stopped");
            context.set_workflow_state(TaskState::Stopped);
        } else {
            context.set_workflow_state(TaskState::Stopping);
        }

        Ok(())
    }

    fn stop_job(&self, job: &str, context: &mut WorkflowContext, step: &mut SchedulerStep) -> Result<()> {
        let resource = self.workflow.resource_name(job);
        if self.current_state.has_replicas(&resource) {
            self.teardown_job(job, step);
        } else {
            context.set_job_state(job, TaskState::Stopped)?;
        }
        Ok(())
    }

    fn assign_job(&self, job: &str, step: &mut SchedulerStep) {
        let job_config = match self.workflow.job_config(job) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "no assignment computed");
                step.config_missing.push(job.to_string());
                return;
            }
        };

        let resource_name = self.workflow.resource_name(job);
        let ideal = self
            .cluster
            .ideal_state(&resource_name)
            .cloned()
            .unwrap_or_else(|| IdealState::for_job(&resource_name, job_config));
        let resource = Resource::for_job(&resource_name, job_config);

        match self
            .registry
            .compute_assignment(self.cluster, ideal, &resource, self.current_state)
        {
            Ok(assignment) => step.assignments.push(assignment),
            Err(err) => {
                warn!(
                    workflow = %self.workflow.name,
                    job = %job,
                    resource = %resource_name,
                    error = %err,
                    "assignment computation failed; keeping current state until next tick"
                );
                step.assignment_failures.push(resource_name);
            }
        }
    }

    fn teardown_job(&self, job: &str, step: &mut SchedulerStep) {
        let resource = self.workflow.resource_name(job);
        if !self.current_state.has_replicas(&resource) {
            return;
        }
        debug!(workflow = %self.workflow.name, job = %job, "tearing down job resource");
        step.assignments
            .push(build_empty_assignment(&resource, self.current_state));
    }

    fn teardown_all(&self, step: &mut SchedulerStep) {
        for job in self.workflow.dag.all_nodes() {
            self.teardown_job(job, step);
        }
    }
}
