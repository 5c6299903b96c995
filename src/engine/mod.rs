// src/engine/mod.rs

//! Scheduling engine for devdag.
//!
//! This module ties together:
//! - the execution queue and admission controller ([`queue`])
//! - the pure scheduler state machine ([`core`]), which reacts to:
//!   - plan start / completion
//!   - tasks arriving from the planner
//!   - execution results
//!   - operator controls
//! - the async coordinator that drives it ([`coordinator`])
//! - status snapshots for monitoring ([`status`])

pub mod coordinator;
pub mod core;
pub mod queue;
pub mod status;

pub use coordinator::Coordinator;
pub use core::{Admission, CoreCommand, CoreStep, ExecutionOutcome, SchedulerState};
pub use queue::ExecutionQueue;
pub use status::{DetailedStatus, ExecutionStatus, QueueEntry, TaskStatistics};
