// src/rebalance/fixed_target.rs

use std::collections::BTreeMap;

use tracing::debug;

use crate::rebalance::Rebalancer;
use crate::rebalance::assignment::{
    ClusterSnapshot, CurrentStateOutput, IdealState, ReplicaState, Resource, ResourceAssignment,
};

/// Places each partition on the first live instance of its preference list.
///
/// Replicas observed on any other live instance are dropped. A partition whose
/// preferred instances are all down is left out of the assignment until one
/// of them comes back.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedTargetRebalancer;

impl FixedTargetRebalancer {
    pub const JOB_MODEL: &'static str = "fixed-target";
}

impl Rebalancer for FixedTargetRebalancer {
    fn compute_best_possible_partition_state(
        &self,
        cluster: &ClusterSnapshot,
        ideal: &IdealState,
        resource: &Resource,
        current_state: &CurrentStateOutput,
    ) -> anyhow::Result<ResourceAssignment> {
        let mut assignment = ResourceAssignment::new(&resource.name);

        for partition in &resource.partitions {
            let target = ideal
                .preference_list(partition)
                .iter()
                .find(|instance| cluster.is_live(instance));

            let observed = current_state.state_map(&resource.name, partition);
            let mut replica_map = BTreeMap::new();

            for instance in observed.keys() {
                if cluster.is_live(instance) && Some(instance) != target {
                    replica_map.insert(instance.clone(), ReplicaState::Dropped);
                }
            }

            match target {
                Some(instance) => {
                    let state = match observed.get(instance) {
                        Some(ReplicaState::Completed) => ReplicaState::Completed,
                        Some(ReplicaState::TaskError) => ReplicaState::TaskError,
                        _ => ReplicaState::Running,
                    };
                    replica_map.insert(instance.clone(), state);
                }
                None => {
                    debug!(
                        resource = %resource.name,
                        partition = %partition,
                        "no live instance in preference list"
                    );
                }
            }

            if !replica_map.is_empty() {
                assignment.add_replica_map(partition.as_str(), replica_map);
            }
        }

        Ok(assignment)
    }
}
