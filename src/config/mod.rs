// src/config/mod.rs

//! Workflow configuration for taskdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a workflow file from disk (`loader.rs`).
//! - Validate it into a [`WorkflowDefinition`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{
    DEFAULT_JOB_MODEL, JobConfig, RawJob, RawWorkflowFile, WorkflowConfig, WorkflowDefinition,
    WorkflowSection, job_resource_name,
};
pub use validate::validate_workflow;
