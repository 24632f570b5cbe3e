// src/engine/runtime.rs

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::criteria::{InstanceSelector, notifications_for};
use crate::errors::Result;
use crate::exec::AssignmentSink;

use super::core::{CoreCommand, CoreController, CoreStep, WorkflowTickOutput};
use super::ControllerEvent;

/// Drives the [`CoreController`] in response to [`ControllerEvent`]s and hands
/// assignments to an [`AssignmentSink`].
///
/// This is a pure IO shell around the core, which contains all the
/// scheduling semantics. This struct handles async IO: reading events from
/// the channel, running per-workflow ticks in parallel on the blocking pool,
/// and forwarding results.
pub struct Runtime<S: AssignmentSink> {
    core: CoreController,
    event_rx: mpsc::Receiver<ControllerEvent>,
    sink: S,
    selector: Option<Arc<dyn InstanceSelector>>,
}

impl<S: AssignmentSink> fmt::Debug for Runtime<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<S: AssignmentSink> Runtime<S> {
    pub fn new(core: CoreController, event_rx: mpsc::Receiver<ControllerEvent>, sink: S) -> Self {
        Self {
            core,
            event_rx,
            sink,
            selector: None,
        }
    }

    /// Resolve notification recipients for job transitions through `selector`.
    pub fn with_selector(mut self, selector: Arc<dyn InstanceSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Main event loop.
    ///
    /// - Consumes `ControllerEvent`s from `event_rx`.
    /// - Feeds them into the core.
    /// - Executes the commands returned by the core (run ticks, apply
    ///   assignments, publish transitions, exit).
    ///
    /// Returns the core so callers can inspect final state.
    pub async fn run(mut self) -> Result<CoreController> {
        info!("taskdag control loop started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("controller event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "control loop received event");

            let step = self.core.step(event);
            if !self.execute_step(step).await? {
                info!("core requested exit; stopping control loop");
                break;
            }
        }

        info!("control loop exiting");
        Ok(self.core)
    }

    /// Execute every command of `step`, including the ones produced by ticks
    /// it triggers. Returns whether the loop should keep running.
    async fn execute_step(&mut self, step: CoreStep) -> Result<bool> {
        let mut keep_running = step.keep_running;
        let mut pending: VecDeque<CoreCommand> = step.commands.into();

        while let Some(command) = pending.pop_front() {
            match command {
                CoreCommand::RunTick(reason) => {
                    debug!(?reason, "running tick");
                    let tick = self.run_tick().await;
                    keep_running &= tick.keep_running;
                    pending.extend(tick.commands);
                }
                CoreCommand::ApplyAssignments(assignments) => {
                    debug!(count = assignments.len(), "handing assignments to sink");
                    self.sink.apply_assignments(assignments).await?;
                }
                CoreCommand::PublishTransitions(transitions) => {
                    debug!(count = transitions.len(), "publishing transitions");
                    if let Some(selector) = &self.selector {
                        let notifications = notifications_for(&transitions, selector.as_ref());
                        if !notifications.is_empty() {
                            self.sink.publish_notifications(notifications).await?;
                        }
                    }
                }
                CoreCommand::RequestExit => {
                    info!("core issued RequestExit command");
                    keep_running = false;
                }
            }
        }

        Ok(keep_running)
    }

    /// Run one tick with every workflow on its own blocking task.
    ///
    /// Each task owns a copy of one workflow's context, so workflows proceed
    /// in parallel while each context still has a single writer.
    async fn run_tick(&mut self) -> CoreStep {
        let ticks = self.core.begin_tick(Utc::now());
        let mut set = JoinSet::new();

        for tick in ticks {
            set.spawn_blocking(move || tick.run());
        }

        let mut outputs: Vec<WorkflowTickOutput> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(output) => outputs.push(output),
                // The core still holds the pre-tick context for that workflow.
                Err(err) => error!(error = %err, "workflow tick task aborted"),
            }
        }

        self.core.finish_tick(outputs)
    }
}
