#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use taskdag::config::{JobConfig, WorkflowConfig, WorkflowDefinition};
use taskdag::dag::{JobDag, TargetState};
use taskdag::errors::Result;
use taskdag::rebalance::{CurrentStateOutput, ReplicaState};

/// Builder for `WorkflowDefinition` to simplify test setup.
///
/// Jobs keep the order in which they are added, like `[[job]]` entries in a
/// workflow file.
pub struct WorkflowBuilder {
    name: String,
    config: WorkflowConfig,
    jobs: Vec<(String, Vec<String>, Option<JobConfig>)>,
}

impl WorkflowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            config: WorkflowConfig::default(),
            jobs: Vec::new(),
        }
    }

    /// Turn the workflow into a job queue with `parallel_jobs` slots.
    pub fn job_queue(mut self, parallel_jobs: usize) -> Self {
        self.config.job_queue = true;
        self.config.parallel_jobs = parallel_jobs;
        self
    }

    pub fn start_time(mut self, start: DateTime<Utc>) -> Self {
        self.config.start_time = Some(start);
        self
    }

    pub fn target_state(mut self, target: TargetState) -> Self {
        self.config.target_state = target;
        self
    }

    pub fn with_job(mut self, name: &str, job: JobConfigBuilder) -> Self {
        let (after, config) = job.into_parts();
        self.jobs.push((name.to_string(), after, Some(config)));
        self
    }

    /// Add a DAG node that has no job config.
    pub fn with_job_without_config(mut self, name: &str, after: &[&str]) -> Self {
        let after = after.iter().map(|s| s.to_string()).collect();
        self.jobs.push((name.to_string(), after, None));
        self
    }

    pub fn try_build(self) -> Result<WorkflowDefinition> {
        let mut dag = JobDag::builder();
        for (name, _, _) in &self.jobs {
            dag = dag.node(name.clone());
        }
        for (name, after, _) in &self.jobs {
            for parent in after {
                dag = dag.edge(parent.clone(), name.clone());
            }
        }
        let dag = dag.build()?;

        let jobs: BTreeMap<String, JobConfig> = self
            .jobs
            .into_iter()
            .filter_map(|(name, _, config)| config.map(|c| (name, c)))
            .collect();

        Ok(WorkflowDefinition::new(self.name, self.config, dag, jobs))
    }

    pub fn build(self) -> WorkflowDefinition {
        self.try_build()
            .expect("Failed to build valid workflow from builder")
    }
}

/// Builder for `JobConfig` plus the job's parents.
///
/// Jobs start with a single partition `p0` so they do not complete on their
/// own the moment they are scheduled.
pub struct JobConfigBuilder {
    after: Vec<String>,
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn new() -> Self {
        Self {
            after: Vec::new(),
            config: JobConfig {
                partitions: vec!["p0".to_string()],
                ..JobConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.after.push(dep.to_string());
        self
    }

    pub fn partitions(mut self, partitions: &[&str]) -> Self {
        self.config.partitions = partitions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn ignore_dependent_job_failure(mut self) -> Self {
        self.config.ignore_dependent_job_failure = true;
        self
    }

    pub fn job_model(mut self, model: &str) -> Self {
        self.config.job_model = model.to_string();
        self
    }

    pub fn max_tasks_per_instance(mut self, cap: usize) -> Self {
        self.config.max_tasks_per_instance = Some(cap);
        self
    }

    pub fn build(self) -> JobConfig {
        self.config
    }

    fn into_parts(self) -> (Vec<String>, JobConfig) {
        (self.after, self.config)
    }
}

impl Default for JobConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for observed replica states.
#[derive(Default)]
pub struct ObservedStateBuilder {
    state: CurrentStateOutput,
}

impl ObservedStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replica(mut self, resource: &str, partition: &str, instance: &str, state: &str) -> Self {
        self.state
            .set_state(resource, partition, instance, ReplicaState::from(state));
        self
    }

    pub fn build(self) -> CurrentStateOutput {
        self.state
    }
}
