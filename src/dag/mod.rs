// src/dag/mod.rs

//! Dependency tracking.
//!
//! - [`tracker`] holds, per task, the dependencies that have not completed
//!   yet, and reports which tasks a completion unblocks.
//! - [`graph`] builds a throwaway `petgraph` view of declared dependencies to
//!   diagnose cycles.

pub mod graph;
pub mod tracker;

pub use graph::{ensure_acyclic, find_cycle_through};
pub use tracker::{DependencyTracker, Readiness};
