// src/config/model.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::dag::{JobDag, TargetState};
use crate::errors::{Result, TaskdagError};

/// Job model used when a job does not name one.
pub const DEFAULT_JOB_MODEL: &str = "generic";

/// One workflow as read from a TOML file, before validation.
///
/// ```toml
/// [workflow]
/// name = "nightly"
/// job_queue = false
/// parallel_jobs = 1
/// start_time = 2026-01-01T00:00:00Z
///
/// [[job]]
/// name = "extract"
/// partitions = ["p0", "p1"]
///
/// [[job]]
/// name = "load"
/// after = ["extract"]
/// ```
///
/// Jobs are an array of tables so that submission order survives parsing;
/// job queues schedule in that order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowFile {
    pub workflow: WorkflowSection,

    #[serde(default)]
    pub job: Vec<RawJob>,
}

/// `[workflow]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    pub name: String,

    #[serde(flatten)]
    pub config: WorkflowConfig,
}

/// One `[[job]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJob {
    pub name: String,

    /// Parent jobs: this job waits for all jobs listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(flatten)]
    pub config: JobConfig,
}

/// Admission-control policy of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowConfig {
    /// Job queues schedule jobs up to `parallel_jobs` at a time instead of
    /// waiting for every parent to complete.
    #[serde(default)]
    pub job_queue: bool,

    /// Maximum number of incomplete jobs in a job queue. Must be >= 1.
    #[serde(default = "default_parallel_jobs")]
    pub parallel_jobs: usize,

    /// Jobs are not scheduled before this instant. Accepts a TOML offset
    /// datetime or an RFC 3339 string.
    #[serde(default, deserialize_with = "deserialize_start_time")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub target_state: TargetState,

    /// Recurrence interval for recurring workflows. Recorded for the host
    /// process; the scheduling core does not act on it.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

fn default_parallel_jobs() -> usize {
    1
}

fn deserialize_start_time<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawStartTime {
        Text(String),
        Native(toml::value::Datetime),
    }

    let text = match Option::<RawStartTime>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(RawStartTime::Text(text)) => text,
        Some(RawStartTime::Native(datetime)) => datetime.to_string(),
    };

    DateTime::parse_from_rfc3339(&text)
        .map(|start| Some(start.with_timezone(&Utc)))
        .map_err(|err| D::Error::custom(format!("invalid start_time '{text}': {err}")))
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            job_queue: false,
            parallel_jobs: default_parallel_jobs(),
            start_time: None,
            target_state: TargetState::Start,
            interval_secs: None,
        }
    }
}

/// Static configuration of a single job. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobConfig {
    /// Work units of the job; each becomes a partition of the job's resource.
    #[serde(default)]
    pub partitions: Vec<String>,

    /// Schedule this job even if a parent failed or timed out.
    #[serde(default)]
    pub ignore_dependent_job_failure: bool,

    /// Timeout enforced by the host process, which reports `TIMED_OUT`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Key into the rebalancer registry.
    #[serde(default = "default_job_model")]
    pub job_model: String,

    /// Upper bound on partitions of this job placed on one instance.
    #[serde(default)]
    pub max_tasks_per_instance: Option<usize>,
}

fn default_job_model() -> String {
    DEFAULT_JOB_MODEL.to_string()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            partitions: Vec::new(),
            ignore_dependent_job_failure: false,
            timeout_secs: None,
            job_model: default_job_model(),
            max_tasks_per_instance: None,
        }
    }
}

/// A submitted workflow: config, dependency graph and job configs.
///
/// Build one through `TryFrom<RawWorkflowFile>` (validated) or
/// [`WorkflowDefinition::new`] when the DAG has already been validated.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    pub config: WorkflowConfig,
    pub dag: JobDag,
    pub jobs: BTreeMap<String, JobConfig>,
}

impl WorkflowDefinition {
    /// Assemble a definition without cross-checking `jobs` against `dag`.
    ///
    /// A DAG node without a job config is allowed here and surfaces as a
    /// configuration-integrity error when the job is evaluated.
    pub fn new(
        name: impl Into<String>,
        config: WorkflowConfig,
        dag: JobDag,
        jobs: BTreeMap<String, JobConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            dag,
            jobs,
        }
    }

    /// Config of `job`, or `ConfigurationMissing` when the DAG names a job
    /// that has none.
    pub fn job_config(&self, job: &str) -> Result<&JobConfig> {
        self.jobs
            .get(job)
            .ok_or_else(|| TaskdagError::ConfigurationMissing {
                workflow: self.name.clone(),
                job: job.to_string(),
            })
    }

    /// Name of the cluster resource that carries the partitions of `job`.
    pub fn resource_name(&self, job: &str) -> String {
        job_resource_name(&self.name, job)
    }
}

/// Jobs are namespaced by workflow: `<workflow>_<job>`.
pub fn job_resource_name(workflow: &str, job: &str) -> String {
    format!("{workflow}_{job}")
}
