// src/engine/core.rs

//! Pure core of the control loop.
//!
//! [`CoreController`] consumes [`ControllerEvent`]s and produces:
//! - an updated store of workflows and runtime contexts
//! - a list of commands describing what the IO shell should do next
//!
//! It is the only writer of workflow contexts. A tick is split in two so the
//! shell can run workflows in parallel:
//! - [`CoreController::begin_tick`] hands out one [`WorkflowTick`] per
//!   schedulable workflow, each carrying its own copy of the context;
//! - [`CoreController::finish_tick`] commits the returned contexts.
//!
//! [`CoreController::tick`] does both sequentially and is what tests use.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::model::WorkflowDefinition;
use crate::dag::{
    SchedulerStep, StateTransition, TargetState, TaskState, WorkflowContext, WorkflowScheduler,
};
use crate::engine::{ControllerEvent, ControllerOptions, TickReason};
use crate::errors::{Result, TaskdagError};
use crate::rebalance::{ClusterSnapshot, CurrentStateOutput, RebalancerRegistry, ResourceAssignment};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Run a scheduling tick over every workflow.
    RunTick(TickReason),
    /// Hand these assignments to the execution layer.
    ApplyAssignments(Vec<ResourceAssignment>),
    /// State transitions recorded during a tick.
    PublishTransitions(Vec<StateTransition>),
    /// Request that the loop exits.
    RequestExit,
}

/// Decision returned by the core after handling one event or one tick.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn keep_running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// One workflow's share of a tick. Owns its context copy, so it can run on
/// any thread.
#[derive(Debug)]
pub struct WorkflowTick {
    definition: Arc<WorkflowDefinition>,
    context: WorkflowContext,
    registry: Arc<RebalancerRegistry>,
    cluster: Arc<ClusterSnapshot>,
    current_state: Arc<CurrentStateOutput>,
    now: DateTime<Utc>,
}

/// Result of running a [`WorkflowTick`].
#[derive(Debug)]
pub struct WorkflowTickOutput {
    pub workflow: String,
    pub result: Result<(WorkflowContext, SchedulerStep)>,
}

impl WorkflowTick {
    pub fn workflow(&self) -> &str {
        &self.definition.name
    }

    pub fn run(self) -> WorkflowTickOutput {
        let mut context = self.context;
        let scheduler = WorkflowScheduler::new(
            &self.definition,
            &self.registry,
            &self.cluster,
            &self.current_state,
        );
        let result = scheduler
            .tick(&mut context, self.now)
            .map(|step| (context, step));

        WorkflowTickOutput {
            workflow: self.definition.name.clone(),
            result,
        }
    }
}

/// Pure core state.
///
/// Owns the workflow store, the context store, the latest cluster inputs and
/// the rebalancer registry. It has **no** channels, no Tokio types, and does
/// not perform any IO.
#[derive(Debug)]
pub struct CoreController {
    workflows: BTreeMap<String, Arc<WorkflowDefinition>>,
    contexts: BTreeMap<String, WorkflowContext>,
    registry: Arc<RebalancerRegistry>,
    cluster: Arc<ClusterSnapshot>,
    current_state: Arc<CurrentStateOutput>,
    options: ControllerOptions,
    ticks: u64,
}

impl CoreController {
    pub fn new(registry: RebalancerRegistry, options: ControllerOptions) -> Self {
        Self {
            workflows: BTreeMap::new(),
            contexts: BTreeMap::new(),
            registry: Arc::new(registry),
            cluster: Arc::new(ClusterSnapshot::default()),
            current_state: Arc::new(CurrentStateOutput::default()),
            options,
            ticks: 0,
        }
    }

    pub fn options(&self) -> ControllerOptions {
        self.options
    }

    pub fn context(&self, workflow: &str) -> Option<&WorkflowContext> {
        self.contexts.get(workflow)
    }

    pub fn workflow(&self, workflow: &str) -> Option<&Arc<WorkflowDefinition>> {
        self.workflows.get(workflow)
    }

    pub fn workflow_names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// True when there is at least one workflow and every workflow has
    /// reached a terminal state.
    pub fn is_idle(&self) -> bool {
        !self.contexts.is_empty()
            && self
                .contexts
                .values()
                .all(|ctx| ctx.workflow_state().is_terminal())
    }

    /// Accept a validated workflow.
    ///
    /// A workflow whose name is still active is rejected; a terminal one is
    /// replaced and starts over with a fresh context.
    pub fn submit_workflow(&mut self, definition: Arc<WorkflowDefinition>) -> Result<()> {
        let name = definition.name.clone();

        if let Some(existing) = self.contexts.get(&name) {
            if !existing.workflow_state().is_terminal() {
                return Err(TaskdagError::ConfigError(format!(
                    "workflow '{name}' is already submitted and not finished"
                )));
            }
            info!(workflow = %name, "resubmitting finished workflow with a fresh context");
        }

        info!(workflow = %name, jobs = definition.dag.len(), "workflow submitted");
        self.contexts.insert(name.clone(), WorkflowContext::new(&name));
        self.workflows.insert(name, definition);
        Ok(())
    }

    /// Forget a workflow and its context.
    pub fn remove_workflow(&mut self, workflow: &str) -> Result<()> {
        if self.workflows.remove(workflow).is_none() {
            return Err(TaskdagError::UnknownWorkflow(workflow.to_string()));
        }
        self.contexts.remove(workflow);
        info!(workflow = %workflow, "workflow removed");
        Ok(())
    }

    /// Switch a workflow's target state to `stop`. The next tick winds it
    /// down.
    ///
    /// Returns `Ok(false)` when the workflow is already stopping or has
    /// finished.
    pub fn stop_workflow(&mut self, workflow: &str) -> Result<bool> {
        let definition = self
            .workflows
            .get_mut(workflow)
            .ok_or_else(|| TaskdagError::UnknownWorkflow(workflow.to_string()))?;

        let finished = self
            .contexts
            .get(workflow)
            .is_some_and(|ctx| ctx.workflow_state().is_terminal());
        if finished || definition.config.target_state == TargetState::Stop {
            debug!(workflow = %workflow, "stop request has nothing to do");
            return Ok(false);
        }

        Arc::make_mut(definition).config.target_state = TargetState::Stop;
        info!(workflow = %workflow, "workflow stop requested");
        Ok(true)
    }

    pub fn update_cluster(&mut self, snapshot: Arc<ClusterSnapshot>, current_state: Arc<CurrentStateOutput>) {
        debug!(
            live_instances = snapshot.live_instances.len(),
            "cluster snapshot updated"
        );
        self.cluster = snapshot;
        self.current_state = current_state;
    }

    /// Record a job state written by an external collaborator.
    pub fn report_job_state(&mut self, workflow: &str, job: &str, state: TaskState) -> Result<bool> {
        let definition = self
            .workflows
            .get(workflow)
            .ok_or_else(|| TaskdagError::UnknownWorkflow(workflow.to_string()))?;
        if !definition.dag.contains(job) {
            return Err(TaskdagError::UnknownJob {
                workflow: workflow.to_string(),
                job: job.to_string(),
            });
        }
        let context = self
            .contexts
            .entry(workflow.to_string())
            .or_insert_with(|| WorkflowContext::new(workflow));
        context.set_job_state(job, state)
    }

    /// Handle a single event, updating core state and returning the resulting
    /// commands for the IO shell. Ticks are returned as
    /// [`CoreCommand::RunTick`] rather than run here.
    pub fn step(&mut self, event: ControllerEvent) -> CoreStep {
        match event {
            ControllerEvent::Tick { reason } => CoreStep::keep_running(vec![CoreCommand::RunTick(reason)]),
            ControllerEvent::WorkflowSubmitted(definition) => {
                if let Err(err) = self.submit_workflow(definition) {
                    warn!(error = %err, "workflow submission rejected");
                    return CoreStep::keep_running(Vec::new());
                }
                self.tick_on_change(TickReason::ConfigChange)
            }
            ControllerEvent::WorkflowRemoved { workflow } => {
                if let Err(err) = self.remove_workflow(&workflow) {
                    warn!(error = %err, "workflow removal ignored");
                    return CoreStep::keep_running(Vec::new());
                }
                self.tick_on_change(TickReason::ConfigChange)
            }
            ControllerEvent::WorkflowStopRequested { workflow } => {
                match self.stop_workflow(&workflow) {
                    Ok(true) => self.tick_on_change(TickReason::ConfigChange),
                    Ok(false) => CoreStep::keep_running(Vec::new()),
                    Err(err) => {
                        warn!(error = %err, "workflow stop request ignored");
                        CoreStep::keep_running(Vec::new())
                    }
                }
            }
            ControllerEvent::ClusterChanged {
                snapshot,
                current_state,
            } => {
                self.update_cluster(snapshot, current_state);
                self.tick_on_change(TickReason::ClusterChange)
            }
            ControllerEvent::JobStateReported {
                workflow,
                job,
                state,
            } => match self.report_job_state(&workflow, &job, state) {
                Ok(_) => self.tick_on_change(TickReason::StateReport),
                Err(err) => {
                    warn!(workflow = %workflow, job = %job, error = %err, "job state report ignored");
                    CoreStep::keep_running(Vec::new())
                }
            },
            ControllerEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }

    fn tick_on_change(&self, reason: TickReason) -> CoreStep {
        if self.options.tick_on_change {
            CoreStep::keep_running(vec![CoreCommand::RunTick(reason)])
        } else {
            CoreStep::keep_running(Vec::new())
        }
    }

    /// Hand out one [`WorkflowTick`] per known workflow.
    ///
    /// Each tick carries a copy of its workflow's context; the stored contexts
    /// are not touched until [`CoreController::finish_tick`].
    pub fn begin_tick(&mut self, now: DateTime<Utc>) -> Vec<WorkflowTick> {
        self.ticks += 1;
        debug!(tick = self.ticks, workflows = self.workflows.len(), "beginning tick");

        self.workflows
            .iter()
            .map(|(name, definition)| WorkflowTick {
                definition: Arc::clone(definition),
                context: self
                    .contexts
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| WorkflowContext::new(name)),
                registry: Arc::clone(&self.registry),
                cluster: Arc::clone(&self.cluster),
                current_state: Arc::clone(&self.current_state),
                now,
            })
            .collect()
    }

    /// Commit the results of a tick.
    ///
    /// A workflow whose tick failed keeps its pre-tick context; the failure is
    /// logged and does not affect other workflows.
    pub fn finish_tick(&mut self, mut outputs: Vec<WorkflowTickOutput>) -> CoreStep {
        outputs.sort_by(|a, b| a.workflow.cmp(&b.workflow));

        let mut assignments = Vec::new();
        let mut transitions = Vec::new();

        for output in outputs {
            match output.result {
                Ok((context, step)) => {
                    if !self.workflows.contains_key(&output.workflow) {
                        debug!(workflow = %output.workflow, "dropping tick result for removed workflow");
                        continue;
                    }
                    self.contexts.insert(output.workflow, context);
                    assignments.extend(step.assignments);
                    transitions.extend(step.transitions);
                }
                Err(err) => {
                    error!(
                        workflow = %output.workflow,
                        error = %err,
                        "workflow tick failed; keeping previous context"
                    );
                }
            }
        }

        let produced_assignments = !assignments.is_empty();
        let mut commands = Vec::new();
        if produced_assignments {
            commands.push(CoreCommand::ApplyAssignments(assignments));
        }
        if !transitions.is_empty() {
            commands.push(CoreCommand::PublishTransitions(transitions));
        }

        let tick_budget_spent = self
            .options
            .max_ticks
            .is_some_and(|max| self.ticks >= max);
        let idle_exit = self.options.exit_when_idle && self.is_idle() && !produced_assignments;

        if tick_budget_spent || idle_exit {
            info!(tick = self.ticks, idle = self.is_idle(), "core requested exit");
            commands.push(CoreCommand::RequestExit);
            return CoreStep {
                commands,
                keep_running: false,
            };
        }

        CoreStep::keep_running(commands)
    }

    /// Run a full tick sequentially.
    pub fn tick(&mut self, now: DateTime<Utc>) -> CoreStep {
        let outputs = self
            .begin_tick(now)
            .into_iter()
            .map(WorkflowTick::run)
            .collect();
        self.finish_tick(outputs)
    }
}
