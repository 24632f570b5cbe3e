// src/rebalance/assignment.rs

//! Cluster-side data the rebalancers read and produce.
//!
//! Everything here is a plain value. The scheduler receives fresh snapshots
//! each tick and never mutates them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::config::model::{DEFAULT_JOB_MODEL, JobConfig};

pub type InstanceName = String;
pub type PartitionName = String;

/// State of one replica of one partition on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReplicaState {
    Init,
    Running,
    Completed,
    TaskError,
    Stopped,
    /// Terminal marker telling the execution layer to tear the replica down.
    Dropped,
    /// States of other state models (e.g. `MASTER`, `SLAVE`).
    Other(String),
}

impl ReplicaState {
    pub fn as_str(&self) -> &str {
        match self {
            ReplicaState::Init => "INIT",
            ReplicaState::Running => "RUNNING",
            ReplicaState::Completed => "COMPLETED",
            ReplicaState::TaskError => "TASK_ERROR",
            ReplicaState::Stopped => "STOPPED",
            ReplicaState::Dropped => "DROPPED",
            ReplicaState::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplicaState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "INIT" => ReplicaState::Init,
            "RUNNING" => ReplicaState::Running,
            "COMPLETED" => ReplicaState::Completed,
            "TASK_ERROR" => ReplicaState::TaskError,
            "STOPPED" => ReplicaState::Stopped,
            "DROPPED" => ReplicaState::Dropped,
            other => ReplicaState::Other(other.to_string()),
        })
    }
}

impl From<&str> for ReplicaState {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(state) => state,
            Err(never) => match never {},
        }
    }
}

/// Long-lived intended layout of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdealState {
    pub resource: String,
    /// Key into the rebalancer registry.
    pub job_model: String,
    /// Partition -> preferred instances, most preferred first.
    pub preference_lists: BTreeMap<PartitionName, Vec<InstanceName>>,
}

impl IdealState {
    pub fn new(resource: impl Into<String>, job_model: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            job_model: job_model.into(),
            preference_lists: BTreeMap::new(),
        }
    }

    pub fn with_preference_list<I, S>(mut self, partition: impl Into<String>, instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preference_lists
            .insert(partition.into(), instances.into_iter().map(Into::into).collect());
        self
    }

    /// Default ideal state for a job resource that has none in the cluster:
    /// every partition, no preferences.
    pub fn for_job(resource: impl Into<String>, job: &JobConfig) -> Self {
        let model = if job.job_model.is_empty() {
            DEFAULT_JOB_MODEL.to_string()
        } else {
            job.job_model.clone()
        };
        let mut ideal = Self::new(resource, model);
        for partition in &job.partitions {
            ideal.preference_lists.insert(partition.clone(), Vec::new());
        }
        ideal
    }

    pub fn preference_list(&self, partition: &str) -> &[InstanceName] {
        self.preference_lists
            .get(partition)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A schedulable resource: its name and the partitions that belong to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub partitions: Vec<PartitionName>,
    /// Per-instance placement cap, if any.
    pub max_partitions_per_instance: Option<usize>,
}

impl Resource {
    pub fn new<I, S>(name: impl Into<String>, partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            partitions: partitions.into_iter().map(Into::into).collect(),
            max_partitions_per_instance: None,
        }
    }

    pub fn for_job(name: impl Into<String>, job: &JobConfig) -> Self {
        Self {
            name: name.into(),
            partitions: job.partitions.clone(),
            max_partitions_per_instance: job.max_tasks_per_instance,
        }
    }

    pub fn has_partition(&self, partition: &str) -> bool {
        self.partitions.iter().any(|p| p == partition)
    }
}

/// Point-in-time view of cluster metadata: membership and resource configs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub live_instances: BTreeSet<InstanceName>,
    pub ideal_states: BTreeMap<String, IdealState>,
}

impl ClusterSnapshot {
    pub fn new<I, S>(live_instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            live_instances: live_instances.into_iter().map(Into::into).collect(),
            ideal_states: BTreeMap::new(),
        }
    }

    pub fn is_live(&self, instance: &str) -> bool {
        self.live_instances.contains(instance)
    }

    pub fn ideal_state(&self, resource: &str) -> Option<&IdealState> {
        self.ideal_states.get(resource)
    }

    pub fn with_ideal_state(mut self, ideal: IdealState) -> Self {
        self.ideal_states.insert(ideal.resource.clone(), ideal);
        self
    }
}

/// Observed replica states: resource -> partition -> instance -> state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentStateOutput {
    states: BTreeMap<String, BTreeMap<PartitionName, BTreeMap<InstanceName, ReplicaState>>>,
}

impl CurrentStateOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(
        &mut self,
        resource: impl Into<String>,
        partition: impl Into<String>,
        instance: impl Into<String>,
        state: ReplicaState,
    ) {
        self.states
            .entry(resource.into())
            .or_default()
            .entry(partition.into())
            .or_default()
            .insert(instance.into(), state);
    }

    /// Forget one replica, pruning empty partitions and resources.
    pub fn remove_replica(&mut self, resource: &str, partition: &str, instance: &str) {
        let Some(partitions) = self.states.get_mut(resource) else {
            return;
        };
        if let Some(replicas) = partitions.get_mut(partition) {
            replicas.remove(instance);
            if replicas.is_empty() {
                partitions.remove(partition);
            }
        }
        if partitions.is_empty() {
            self.states.remove(resource);
        }
    }

    /// Partitions of `resource` with at least one observed replica.
    pub fn mapped_partitions(&self, resource: &str) -> impl Iterator<Item = &str> {
        self.states
            .get(resource)
            .into_iter()
            .flat_map(|partitions| partitions.keys().map(String::as_str))
    }

    /// Instance -> state for one partition; empty when nothing is observed.
    pub fn state_map(&self, resource: &str, partition: &str) -> BTreeMap<InstanceName, ReplicaState> {
        self.states
            .get(resource)
            .and_then(|partitions| partitions.get(partition))
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_replicas(&self, resource: &str) -> bool {
        self.states
            .get(resource)
            .is_some_and(|partitions| partitions.values().any(|r| !r.is_empty()))
    }
}

/// Target replica states for one resource, produced fresh every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceAssignment {
    pub resource: String,
    replicas: BTreeMap<PartitionName, BTreeMap<InstanceName, ReplicaState>>,
}

impl ResourceAssignment {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            replicas: BTreeMap::new(),
        }
    }

    pub fn add_replica_map(
        &mut self,
        partition: impl Into<String>,
        replica_map: BTreeMap<InstanceName, ReplicaState>,
    ) {
        self.replicas.insert(partition.into(), replica_map);
    }

    pub fn replica_map(&self, partition: &str) -> Option<&BTreeMap<InstanceName, ReplicaState>> {
        self.replicas.get(partition)
    }

    pub fn partitions(&self) -> impl Iterator<Item = &str> {
        self.replicas.keys().map(String::as_str)
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&PartitionName, &BTreeMap<InstanceName, ReplicaState>)> {
        self.replicas.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }
}
