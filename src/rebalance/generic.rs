// src/rebalance/generic.rs

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::rebalance::Rebalancer;
use crate::rebalance::assignment::{
    ClusterSnapshot, CurrentStateOutput, IdealState, InstanceName, ReplicaState, Resource,
    ResourceAssignment,
};

/// One replica per partition, placed on the least-loaded live instance.
///
/// Per partition:
/// - a replica observed on a live instance stays where it is (sticky) and
///   keeps `COMPLETED` / `TASK_ERROR` if it already reached one of them,
///   otherwise it is told to be `RUNNING`;
/// - further replicas of the same partition on live instances are dropped;
/// - partitions without a live replica go to the live instance holding the
///   fewest partitions of this resource, respecting the per-instance cap.
///
/// Ties are broken by instance name so repeated ticks agree.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericTaskRebalancer;

impl GenericTaskRebalancer {
    pub const JOB_MODEL: &'static str = "generic";
}

impl Rebalancer for GenericTaskRebalancer {
    fn compute_best_possible_partition_state(
        &self,
        cluster: &ClusterSnapshot,
        _ideal: &IdealState,
        resource: &Resource,
        current_state: &CurrentStateOutput,
    ) -> anyhow::Result<ResourceAssignment> {
        let mut assignment = ResourceAssignment::new(&resource.name);
        let mut load: HashMap<&str, usize> = cluster
            .live_instances
            .iter()
            .map(|i| (i.as_str(), 0))
            .collect();
        let mut unplaced = Vec::new();

        // Pass 1: keep existing live replicas.
        for partition in &resource.partitions {
            let observed = current_state.state_map(&resource.name, partition);
            let mut replica_map: BTreeMap<InstanceName, ReplicaState> = BTreeMap::new();
            let mut kept = false;

            for (instance, state) in observed {
                if !cluster.is_live(&instance) {
                    continue;
                }
                if kept {
                    replica_map.insert(instance, ReplicaState::Dropped);
                    continue;
                }
                let target = match state {
                    ReplicaState::Completed => ReplicaState::Completed,
                    ReplicaState::TaskError => ReplicaState::TaskError,
                    ReplicaState::Dropped => continue,
                    _ => ReplicaState::Running,
                };
                if let Some(count) = load.get_mut(instance.as_str()) {
                    *count += 1;
                }
                replica_map.insert(instance, target);
                kept = true;
            }

            if !kept {
                unplaced.push(partition.as_str());
            }
            if !replica_map.is_empty() {
                assignment.add_replica_map(partition.as_str(), replica_map);
            }
        }

        // Pass 2: place the rest.
        for partition in unplaced {
            let choice = load
                .iter()
                .filter(|(_, count)| {
                    resource
                        .max_partitions_per_instance
                        .is_none_or(|cap| **count < cap)
                })
                .min_by(|(a_name, a_count), (b_name, b_count)| {
                    a_count.cmp(b_count).then_with(|| a_name.cmp(b_name))
                })
                .map(|(name, _)| *name);

            let Some(instance) = choice else {
                warn!(
                    resource = %resource.name,
                    partition = %partition,
                    "no live instance with spare capacity; partition left unassigned"
                );
                continue;
            };

            if let Some(count) = load.get_mut(instance) {
                *count += 1;
            }

            let mut replica_map = assignment
                .replica_map(partition)
                .cloned()
                .unwrap_or_default();
            replica_map.insert(instance.to_string(), ReplicaState::Running);
            assignment.add_replica_map(partition, replica_map);

            debug!(
                resource = %resource.name,
                partition = %partition,
                instance = %instance,
                "placed partition"
            );
        }

        Ok(assignment)
    }
}
