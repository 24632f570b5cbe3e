// src/rebalance/teardown.rs

use std::collections::BTreeMap;

use crate::rebalance::assignment::{CurrentStateOutput, ReplicaState, ResourceAssignment};

/// Assignment that drops every replica currently observed for `resource`.
///
/// Once the execution layer has converged nothing is observed any more and
/// the result has no partitions, so applying it again is a no-op.
pub fn build_empty_assignment(resource: &str, current_state: &CurrentStateOutput) -> ResourceAssignment {
    let mut assignment = ResourceAssignment::new(resource);

    for partition in current_state.mapped_partitions(resource) {
        let replica_map: BTreeMap<_, _> = current_state
            .state_map(resource, partition)
            .into_keys()
            .map(|instance| (instance, ReplicaState::Dropped))
            .collect();
        assignment.add_replica_map(partition, replica_map);
    }

    assignment
}
