// src/time/mod.rs

//! Time primitives used by datasets and completion checking.
//!
//! - [`range`] holds the half-open [`TimeRange`] and its persisted string form.
//! - [`calendar`] holds the [`Calendar`] collaborator used by calendar-driven
//!   completion checking, plus two simple implementations.

pub mod calendar;
pub mod range;

pub use calendar::{Calendar, IntervalCalendar, UnionCalendar};
pub use range::{TimeRange, Timestamp, resolution};
