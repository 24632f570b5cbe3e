// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawWorkflowFile, WorkflowDefinition};
use crate::errors::Result;

/// Load a workflow file from a given path and return the raw `RawWorkflowFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

/// Parse a workflow from TOML text without validating it.
pub fn load_from_str(contents: &str) -> Result<RawWorkflowFile> {
    let raw: RawWorkflowFile = toml::from_str(contents)?;
    Ok(raw)
}

/// Load a workflow file from path and validate it into a submittable
/// [`WorkflowDefinition`].
///
/// Checks for:
/// - empty names and duplicate jobs,
/// - unknown `after` references,
/// - DAG cycles,
/// - `parallel_jobs >= 1`.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowDefinition> {
    let raw = load_from_path(path)?;
    WorkflowDefinition::try_from(raw)
}
