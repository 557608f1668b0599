// src/time/range.rs

use std::cmp::{max, min};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DatadagError, Result};

/// Point on the time axis of every dataset.
pub type Timestamp = DateTime<Utc>;

/// Smallest representable step between two rows.
///
/// The data time range of rows `t0..=tn` is `[t0, tn + resolution())`.
pub fn resolution() -> TimeDelta {
    TimeDelta::nanoseconds(1)
}

/// Half-open interval `[start, end)` with `start < end`.
///
/// Persisted as `TimeRange(<rfc3339>, <rfc3339>)`, which round-trips through
/// [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeRange {
    start: Timestamp,
    end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self> {
        if start >= end {
            return Err(DatadagError::InvalidDeclaration(format!(
                "time range start {} must be before its end {}",
                format_ts(&start),
                format_ts(&end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Smallest range containing every given point.
    pub fn spanning(first: Timestamp, last: Timestamp) -> Result<Self> {
        Self::new(first, last + resolution())
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn contains_point(&self, ts: &Timestamp) -> bool {
        self.start <= *ts && *ts < self.end
    }

    /// Whether `other` is a sub-interval of `self`.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn is_adjacent(&self, other: &TimeRange) -> bool {
        self.end == other.start || other.end == self.start
    }

    /// Union of two overlapping or adjacent ranges.
    pub fn union(&self, other: &TimeRange) -> Result<TimeRange> {
        if !self.intersects(other) && !self.is_adjacent(other) {
            return Err(DatadagError::InvalidDeclaration(format!(
                "cannot union disjoint time ranges {self} and {other}"
            )));
        }
        Ok(TimeRange {
            start: min(self.start, other.start),
            end: max(self.end, other.end),
        })
    }

    pub fn intersection(&self, other: &TimeRange) -> Option<TimeRange> {
        if !self.intersects(other) {
            return None;
        }
        Some(TimeRange {
            start: max(self.start, other.start),
            end: min(self.end, other.end),
        })
    }

    /// Same end, start moved back by a non-negative `lookback`.
    pub fn extend_back(&self, lookback: TimeDelta) -> Result<TimeRange> {
        if lookback < TimeDelta::zero() {
            return Err(DatadagError::InvalidDeclaration(format!(
                "lookback must not be negative, got {lookback}"
            )));
        }
        let start = self.start.checked_sub_signed(lookback).ok_or_else(|| {
            DatadagError::InvalidDeclaration(format!(
                "lookback {lookback} reaches before the earliest representable time"
            ))
        })?;
        TimeRange::new(start, self.end)
    }
}

fn format_ts(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(s: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatadagError::InvalidDeclaration(format!("invalid timestamp '{s}': {e}")))
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimeRange({}, {})",
            format_ts(&self.start),
            format_ts(&self.end)
        )
    }
}

impl FromStr for TimeRange {
    type Err = DatadagError;

    fn from_str(s: &str) -> Result<Self> {
        let inner = s
            .trim()
            .strip_prefix("TimeRange(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| {
                DatadagError::InvalidDeclaration(format!("malformed time range '{s}'"))
            })?;
        let (start, end) = inner.split_once(',').ok_or_else(|| {
            DatadagError::InvalidDeclaration(format!("malformed time range '{s}'"))
        })?;
        TimeRange::new(parse_ts(start)?, parse_ts(end)?)
    }
}

impl From<TimeRange> for String {
    fn from(range: TimeRange) -> Self {
        range.to_string()
    }
}

impl TryFrom<String> for TimeRange {
    type Error = DatadagError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
