// src/plan/mod.rs

//! Running TOML plans on a scheduler.

pub mod runner;
pub mod steps;

pub use runner::{Outcome, PlanRun, TaskReport};
pub use steps::compile;
