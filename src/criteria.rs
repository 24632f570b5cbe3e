// src/criteria.rs

//! Interface to the criteria-based instance-selection service.
//!
//! Resolving which replicas match a filter lives outside this crate. The
//! scheduler loop only uses it to fan out notifications after job state
//! transitions; scheduling decisions never depend on it.

use crate::config::model::job_resource_name;
use crate::dag::StateTransition;

/// Match-anything pattern.
pub const ANY: &str = "%";

/// Filter over replicas. Each field is a pattern in the selector's syntax;
/// [`ANY`] matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub instance_name: String,
    pub resource: String,
    pub partition: String,
    pub state: String,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            instance_name: ANY.to_string(),
            resource: ANY.to_string(),
            partition: ANY.to_string(),
            state: ANY.to_string(),
        }
    }
}

impl Criteria {
    /// Every replica of one resource.
    pub fn for_resource(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Self::default()
        }
    }
}

/// One matched `(instance, resource, partition, state)` tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedReplica {
    pub instance_name: String,
    pub resource: String,
    pub partition: String,
    pub state: String,
}

pub trait InstanceSelector: Send + Sync {
    fn select(&self, criteria: &Criteria) -> Vec<SelectedReplica>;
}

/// A job transition together with the replicas that should hear about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub transition: StateTransition,
    pub recipients: Vec<SelectedReplica>,
}

/// Resolve recipients for every job-level transition.
///
/// Workflow-level transitions and transitions without recipients produce no
/// notification.
pub fn notifications_for(
    transitions: &[StateTransition],
    selector: &dyn InstanceSelector,
) -> Vec<Notification> {
    transitions
        .iter()
        .filter_map(|transition| {
            let job = transition.job.as_deref()?;
            let criteria = Criteria::for_resource(job_resource_name(&transition.workflow, job));
            let recipients = selector.select(&criteria);
            if recipients.is_empty() {
                None
            } else {
                Some(Notification {
                    transition: transition.clone(),
                    recipients,
                })
            }
        })
        .collect()
}
