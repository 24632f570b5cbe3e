use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use taskdag::criteria::{Criteria, InstanceSelector, Notification, SelectedReplica};
use taskdag::exec::{AssignmentSink, SinkFuture};
use taskdag::rebalance::ResourceAssignment;

/// A sink that:
/// - records every assignment handed to it
/// - records every notification published through it
/// - never feeds anything back into the control loop.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub applied: Arc<Mutex<Vec<ResourceAssignment>>>,
    pub notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource names of every recorded assignment, in order.
    pub fn applied_resources(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.resource.clone())
            .collect()
    }
}

impl AssignmentSink for RecordingSink {
    fn apply_assignments(&mut self, assignments: Vec<ResourceAssignment>) -> SinkFuture<'_> {
        let applied = Arc::clone(&self.applied);

        Box::pin(async move {
            applied.lock().unwrap().extend(assignments);
            Ok(())
        })
    }

    fn publish_notifications(&mut self, notifications: Vec<Notification>) -> SinkFuture<'_> {
        let recorded = Arc::clone(&self.notifications);

        Box::pin(async move {
            recorded.lock().unwrap().extend(notifications);
            Ok(())
        })
    }
}

/// Instance selector backed by a fixed resource -> replicas table.
#[derive(Debug, Default)]
pub struct StaticSelector {
    replicas: BTreeMap<String, Vec<SelectedReplica>>,
}

impl StaticSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replica(mut self, resource: &str, partition: &str, instance: &str, state: &str) -> Self {
        self.replicas
            .entry(resource.to_string())
            .or_default()
            .push(SelectedReplica {
                instance_name: instance.to_string(),
                resource: resource.to_string(),
                partition: partition.to_string(),
                state: state.to_string(),
            });
        self
    }
}

impl InstanceSelector for StaticSelector {
    fn select(&self, criteria: &Criteria) -> Vec<SelectedReplica> {
        self.replicas
            .get(&criteria.resource)
            .cloned()
            .unwrap_or_default()
    }
}
