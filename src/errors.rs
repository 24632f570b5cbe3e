// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::dag::TaskState;

#[derive(Error, Debug)]
pub enum TaskdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cycle detected in job DAG: {0}")]
    CyclicDependency(String),

    #[error("job '{job}' depends on unknown job '{parent}'")]
    UnknownDependency { job: String, parent: String },

    #[error("Workflow not found: {0}")]
    UnknownWorkflow(String),

    #[error("job '{job}' is not part of workflow '{workflow}'")]
    UnknownJob { workflow: String, job: String },

    #[error("job config is missing for job '{job}' in workflow '{workflow}'")]
    ConfigurationMissing { workflow: String, job: String },

    #[error("invalid state transition for job '{job}': {from} -> {to}")]
    InvalidTransition {
        job: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("no rebalancer registered for job model '{0}'")]
    UnknownJobModel(String),

    #[error("assignment for resource '{resource}' violates contract: {reason}")]
    AssignmentContract { resource: String, reason: String },

    #[error("assignment computation failed for resource '{resource}': {source}")]
    Assignment {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskdagError>;
