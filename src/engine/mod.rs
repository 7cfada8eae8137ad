// src/engine/mod.rs

//! Scheduling engine for tasktree.
//!
//! This module ties together:
//! - the scheduler instance and its public API ([`scheduler`])
//! - the per-type FIFO queues of root tasks ([`registry`])
//! - the execution loop that advances task trees ([`run_loop`])
//!
//! Everything here is single-threaded. The engine never blocks; it hands
//! control back to its [`Host`](crate::host::Host) whenever a task suspends
//! or uses up its time slice.

pub mod registry;
pub mod run_loop;
pub mod scheduler;

pub use registry::{QueueViolation, TypeQueueRegistry};
pub use scheduler::{Scheduler, StartOptions, TaskSnapshot};
