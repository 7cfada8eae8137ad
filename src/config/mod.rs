// src/config/mod.rs

//! Configuration for tasktree.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a plan file from disk (`loader.rs`).
//! - Validate plans (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_plan_path, load_and_validate, load_from_path};
pub use model::{PlanFile, PlanTask, RawPlanFile, SchedulerConfig, Step};
pub use validate::validate_raw_plan;
