// src/rebalance/mod.rs

//! Assignment computation for job resources.
//!
//! A [`Rebalancer`] maps (cluster snapshot, ideal state, resource, observed
//! current state) to the desired [`ResourceAssignment`]. Concrete job models
//! register their strategy in a [`RebalancerRegistry`] under a job-model key;
//! the scheduler only ever talks to the registry.
//!
//! - [`assignment`] holds the plain data types.
//! - [`generic`] places one replica per partition on the least-loaded live
//!   instance.
//! - [`fixed_target`] follows the ideal state's preference lists.
//! - [`teardown`] builds the all-`DROPPED` assignment used to wind work down.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Result, TaskdagError};

pub mod assignment;
pub mod fixed_target;
pub mod generic;
pub mod teardown;

pub use assignment::{
    ClusterSnapshot, CurrentStateOutput, IdealState, InstanceName, PartitionName, ReplicaState,
    Resource, ResourceAssignment,
};
pub use fixed_target::FixedTargetRebalancer;
pub use generic::GenericTaskRebalancer;
pub use teardown::build_empty_assignment;

/// Placement strategy for one job model.
///
/// Implementations must be pure with respect to their inputs: no liveness
/// checks of their own, no I/O. The caller supplies an up-to-date snapshot.
pub trait Rebalancer: Send + Sync + fmt::Debug {
    /// Desired long-lived layout. Placement happens in
    /// [`Rebalancer::compute_best_possible_partition_state`], so by default the
    /// ideal state passes through unchanged.
    fn compute_new_ideal_state(
        &self,
        _resource: &str,
        current_ideal: IdealState,
        _current_state: &CurrentStateOutput,
        _cluster: &ClusterSnapshot,
    ) -> IdealState {
        current_ideal
    }

    /// Target replica states for every partition of `resource` this tick.
    ///
    /// The result may only mention partitions of `resource` and instances that
    /// are live in `cluster`.
    fn compute_best_possible_partition_state(
        &self,
        cluster: &ClusterSnapshot,
        ideal: &IdealState,
        resource: &Resource,
        current_state: &CurrentStateOutput,
    ) -> anyhow::Result<ResourceAssignment>;
}

/// Strategy table keyed by job-model identifier.
#[derive(Debug, Clone, Default)]
pub struct RebalancerRegistry {
    strategies: HashMap<String, Arc<dyn Rebalancer>>,
}

impl RebalancerRegistry {
    /// Empty registry; see [`RebalancerRegistry::with_builtin`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `generic` and `fixed-target` job models.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(GenericTaskRebalancer::JOB_MODEL, GenericTaskRebalancer);
        registry.register(FixedTargetRebalancer::JOB_MODEL, FixedTargetRebalancer);
        registry
    }

    /// Register (or replace) the strategy for `job_model`.
    pub fn register<R>(&mut self, job_model: impl Into<String>, rebalancer: R)
    where
        R: Rebalancer + 'static,
    {
        self.strategies.insert(job_model.into(), Arc::new(rebalancer));
    }

    pub fn get(&self, job_model: &str) -> Option<&Arc<dyn Rebalancer>> {
        self.strategies.get(job_model)
    }

    pub fn job_models(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    /// Run the strategy for `ideal.job_model` and check the result against the
    /// assignment contract.
    ///
    /// Any failure (unknown model, strategy error, contract violation) means
    /// "no assignment this tick"; the caller leaves the observed state alone.
    pub fn compute_assignment(
        &self,
        cluster: &ClusterSnapshot,
        ideal: IdealState,
        resource: &Resource,
        current_state: &CurrentStateOutput,
    ) -> Result<ResourceAssignment> {
        let strategy = self
            .get(&ideal.job_model)
            .ok_or_else(|| TaskdagError::UnknownJobModel(ideal.job_model.clone()))?;

        let ideal = strategy.compute_new_ideal_state(&resource.name, ideal, current_state, cluster);
        let assignment = strategy
            .compute_best_possible_partition_state(cluster, &ideal, resource, current_state)
            .map_err(|source| TaskdagError::Assignment {
                resource: resource.name.clone(),
                source,
            })?;

        validate_assignment(&assignment, resource, cluster)?;

        debug!(
            resource = %resource.name,
            job_model = %ideal.job_model,
            partitions = assignment.len(),
            "computed best possible assignment"
        );

        Ok(assignment)
    }
}

/// Check that an assignment only references known partitions and live instances.
pub fn validate_assignment(
    assignment: &ResourceAssignment,
    resource: &Resource,
    cluster: &ClusterSnapshot,
) -> Result<()> {
    if assignment.resource != resource.name {
        return Err(TaskdagError::AssignmentContract {
            resource: resource.name.clone(),
            reason: format!("assignment is for resource '{}'", assignment.resource),
        });
    }

    for (partition, replicas) in assignment.iter() {
        if !resource.has_partition(partition) {
            return Err(TaskdagError::AssignmentContract {
                resource: resource.name.clone(),
                reason: format!("unknown partition '{partition}'"),
            });
        }
        if let Some(instance) = replicas.keys().find(|i| !cluster.is_live(i)) {
            return Err(TaskdagError::AssignmentContract {
                resource: resource.name.clone(),
                reason: format!("partition '{partition}' assigned to non-live instance '{instance}'"),
            });
        }
    }

    Ok(())
}
