// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};

use crate::config::model::{RawWorkflowFile, WorkflowDefinition};
use crate::dag::JobDag;
use crate::errors::{Result, TaskdagError};

impl TryFrom<RawWorkflowFile> for WorkflowDefinition {
    type Error = TaskdagError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        validate_workflow(&raw)?;

        let mut builder = JobDag::builder();
        for job in &raw.job {
            builder = builder.node(job.name.clone());
        }
        for job in &raw.job {
            for parent in &job.after {
                builder = builder.edge(parent.clone(), job.name.clone());
            }
        }
        // Rejects cycles; unknown parents were already reported above.
        let dag = builder.build()?;

        let jobs: BTreeMap<_, _> = raw
            .job
            .into_iter()
            .map(|job| (job.name, job.config))
            .collect();

        Ok(WorkflowDefinition::new(
            raw.workflow.name,
            raw.workflow.config,
            dag,
            jobs,
        ))
    }
}

/// Run every check on a raw workflow without building it.
pub fn validate_workflow(raw: &RawWorkflowFile) -> Result<()> {
    ensure_has_name(raw)?;
    ensure_has_jobs(raw)?;
    validate_workflow_config(raw)?;
    validate_job_names(raw)?;
    validate_job_dependencies(raw)?;
    Ok(())
}

fn ensure_has_name(raw: &RawWorkflowFile) -> Result<()> {
    if raw.workflow.name.trim().is_empty() {
        return Err(TaskdagError::ConfigError(
            "[workflow].name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn ensure_has_jobs(raw: &RawWorkflowFile) -> Result<()> {
    if raw.job.is_empty() {
        return Err(TaskdagError::ConfigError(format!(
            "workflow '{}' must contain at least one [[job]] entry",
            raw.workflow.name
        )));
    }
    Ok(())
}

fn validate_workflow_config(raw: &RawWorkflowFile) -> Result<()> {
    if raw.workflow.config.parallel_jobs == 0 {
        return Err(TaskdagError::ConfigError(
            "[workflow].parallel_jobs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_job_names(raw: &RawWorkflowFile) -> Result<()> {
    let mut seen = HashSet::new();
    for job in &raw.job {
        if job.name.trim().is_empty() {
            return Err(TaskdagError::ConfigError(format!(
                "workflow '{}' has a job with an empty name",
                raw.workflow.name
            )));
        }
        if !seen.insert(job.name.as_str()) {
            return Err(TaskdagError::ConfigError(format!(
                "job '{}' is declared more than once",
                job.name
            )));
        }
        if job.config.max_tasks_per_instance == Some(0) {
            return Err(TaskdagError::ConfigError(format!(
                "job '{}': max_tasks_per_instance must be >= 1 (got 0)",
                job.name
            )));
        }
    }
    Ok(())
}

fn validate_job_dependencies(raw: &RawWorkflowFile) -> Result<()> {
    let names: HashSet<&str> = raw.job.iter().map(|j| j.name.as_str()).collect();

    for job in &raw.job {
        for parent in &job.after {
            if parent == &job.name {
                return Err(TaskdagError::CyclicDependency(format!(
                    "job '{}' cannot depend on itself in `after`",
                    job.name
                )));
            }
            if !names.contains(parent.as_str()) {
                return Err(TaskdagError::UnknownDependency {
                    job: job.name.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }
    Ok(())
}
