// src/dag/mod.rs

//! Task graph and per-run scheduling state.
//!
//! - [`graph`] holds the dependency closure of a set of sink tasks.
//! - [`status`] holds the state machine that decides which tasks are ready,
//!   and which are blocked by a failed upstream.

pub mod graph;
pub mod status;

pub use graph::{Graph, TaskKey};
pub use status::{GraphStatus, TaskState};
