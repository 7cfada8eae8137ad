// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::Result;

/// Read a plan file and return the raw, unvalidated `RawPlanFile`.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] to
/// also check the plan.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlanFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let plan: RawPlanFile = toml::from_str(&contents)?;
    Ok(plan)
}

/// Read and validate a plan file. This is what the CLI uses.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanFile> {
    let raw = load_from_path(&path)?;
    let plan = PlanFile::try_from(raw)?;
    Ok(plan)
}

/// Plan used when `--plan` is not given.
pub fn default_plan_path() -> PathBuf {
    PathBuf::from("Tasktree.toml")
}
