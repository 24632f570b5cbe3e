// src/exec/simulated.rs

//! In-memory execution layer used by the CLI.
//!
//! Applies assignments to a simulated cluster and feeds the resulting
//! observed state back into the control loop as `ClusterChanged`, much like a
//! real participant would after executing its state transitions.
//!
//! A replica told to be `RUNNING` starts on the first assignment and reports
//! `COMPLETED` when it is assigned `RUNNING` again, so each partition takes
//! two ticks.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::ControllerEvent;
use crate::errors::TaskdagError;
use crate::exec::backend::{AssignmentSink, SinkFuture};
use crate::rebalance::{ClusterSnapshot, CurrentStateOutput, ReplicaState, ResourceAssignment};

#[derive(Debug)]
pub struct SimulatedExecutor {
    cluster: Arc<ClusterSnapshot>,
    current_state: CurrentStateOutput,
    /// Partitions (`resource/partition`) that should fail instead of completing.
    failing: HashSet<String>,
    runtime_tx: mpsc::Sender<ControllerEvent>,
}

impl SimulatedExecutor {
    pub fn new(cluster: ClusterSnapshot, runtime_tx: mpsc::Sender<ControllerEvent>) -> Self {
        Self {
            cluster: Arc::new(cluster),
            current_state: CurrentStateOutput::new(),
            failing: HashSet::new(),
            runtime_tx,
        }
    }

    /// Make `partition` of `resource` report `TASK_ERROR` instead of completing.
    pub fn fail_partition(mut self, resource: &str, partition: &str) -> Self {
        self.failing.insert(format!("{resource}/{partition}"));
        self
    }

    pub fn current_state(&self) -> &CurrentStateOutput {
        &self.current_state
    }

    /// The event announcing the current simulated cluster to the loop.
    pub fn cluster_event(&self) -> ControllerEvent {
        ControllerEvent::ClusterChanged {
            snapshot: Arc::clone(&self.cluster),
            current_state: Arc::new(self.current_state.clone()),
        }
    }

    /// Apply one assignment to the simulated observed state.
    ///
    /// Returns whether any observed replica changed.
    pub fn apply(&mut self, assignment: &ResourceAssignment) -> bool {
        let resource = assignment.resource.as_str();
        let mut changed = false;

        for (partition, replicas) in assignment.iter() {
            for (instance, target) in replicas {
                let observed = self.current_state.state_map(resource, partition).remove(instance);
                let next = match (target, observed.clone()) {
                    (ReplicaState::Dropped, _) => None,
                    (ReplicaState::Running, Some(ReplicaState::Running)) => {
                        if self.failing.contains(&format!("{resource}/{partition}")) {
                            Some(ReplicaState::TaskError)
                        } else {
                            Some(ReplicaState::Completed)
                        }
                    }
                    (ReplicaState::Running, _) => Some(ReplicaState::Running),
                    (other, _) => Some(other.clone()),
                };

                debug!(
                    resource = %resource,
                    partition = %partition,
                    instance = %instance,
                    target = %target,
                    observed = ?next,
                    "simulated replica transition"
                );

                if next == observed {
                    continue;
                }
                changed = true;
                match next {
                    Some(state) => self
                        .current_state
                        .set_state(resource, partition.as_str(), instance.as_str(), state),
                    None => self.current_state.remove_replica(resource, partition, instance),
                }
            }
        }

        changed
    }
}

impl AssignmentSink for SimulatedExecutor {
    fn apply_assignments(&mut self, assignments: Vec<ResourceAssignment>) -> SinkFuture<'_> {
        let mut changed = false;
        for assignment in &assignments {
            changed |= self.apply(assignment);
        }
        // Only report back when something moved; the timer covers the rest.
        let event = changed.then(|| self.cluster_event());
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            let Some(event) = event else {
                return Ok(());
            };
            tx.send(event)
                .await
                .map_err(|e| TaskdagError::ChannelClosed(e.to_string()))
        })
    }
}
