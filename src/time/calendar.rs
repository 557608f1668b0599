// src/time/calendar.rs

use std::fmt;
use std::sync::Arc;

use chrono::TimeDelta;

use crate::errors::{DatadagError, Result};
use crate::time::range::{TimeRange, Timestamp};

/// Expected-point schedule consulted by calendar-driven completion checks.
pub trait Calendar: Send + Sync + fmt::Debug {
    /// Latest expected point strictly before `as_of`.
    fn latest_point_before(&self, as_of: Timestamp) -> Timestamp;

    /// Expected points inside `range`, ascending.
    fn to_index(&self, range: &TimeRange) -> Vec<Timestamp>;

    /// Member calendars when this calendar is itself a union.
    fn members(&self) -> Option<&[Arc<dyn Calendar>]> {
        None
    }
}

fn nanos_of(delta: TimeDelta) -> i128 {
    i128::from(delta.num_seconds()) * 1_000_000_000 + i128::from(delta.subsec_nanos())
}

fn delta_of(nanos: i128) -> TimeDelta {
    let secs = nanos.div_euclid(1_000_000_000) as i64;
    let rest = nanos.rem_euclid(1_000_000_000) as i64;
    TimeDelta::seconds(secs) + TimeDelta::nanoseconds(rest)
}

/// Fixed grid `origin + k * step` for every integer `k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalCalendar {
    origin: Timestamp,
    step: TimeDelta,
}

impl IntervalCalendar {
    pub fn new(origin: Timestamp, step: TimeDelta) -> Result<Self> {
        if step <= TimeDelta::zero() {
            return Err(DatadagError::InvalidDeclaration(format!(
                "calendar step must be positive, got {step}"
            )));
        }
        Ok(Self { origin, step })
    }

    pub fn daily(origin: Timestamp) -> Self {
        Self {
            origin,
            step: TimeDelta::days(1),
        }
    }

    pub fn step(&self) -> TimeDelta {
        self.step
    }
}

impl Calendar for IntervalCalendar {
    fn latest_point_before(&self, as_of: Timestamp) -> Timestamp {
        let step = nanos_of(self.step);
        let offset = nanos_of(as_of - self.origin);
        let k = (offset - 1).div_euclid(step);
        self.origin + delta_of(k * step)
    }

    fn to_index(&self, range: &TimeRange) -> Vec<Timestamp> {
        let mut points = Vec::new();
        let mut point = self.latest_point_before(range.start()) + self.step;
        while point < range.end() {
            points.push(point);
            point += self.step;
        }
        points
    }
}

/// Union of several calendars: a point is expected when any member expects it.
#[derive(Debug, Clone)]
pub struct UnionCalendar {
    calendars: Vec<Arc<dyn Calendar>>,
}

impl UnionCalendar {
    /// Union of `calendars`, flattening nested unions.
    pub fn merge<I>(calendars: I) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<dyn Calendar>>,
    {
        let mut flat: Vec<Arc<dyn Calendar>> = Vec::new();
        for cal in calendars {
            match cal.members() {
                Some(members) => flat.extend(members.iter().cloned()),
                None => flat.push(cal),
            }
        }
        let mut unique: Vec<Arc<dyn Calendar>> = Vec::with_capacity(flat.len());
        for cal in flat {
            if !unique.iter().any(|seen| Arc::ptr_eq(seen, &cal)) {
                unique.push(cal);
            }
        }
        if unique.is_empty() {
            return Err(DatadagError::InvalidDeclaration(
                "a calendar union needs at least one member".to_string(),
            ));
        }
        Ok(Self { calendars: unique })
    }

    pub fn len(&self) -> usize {
        self.calendars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calendars.is_empty()
    }
}

impl Calendar for UnionCalendar {
    fn latest_point_before(&self, as_of: Timestamp) -> Timestamp {
        self.calendars
            .iter()
            .map(|c| c.latest_point_before(as_of))
            .max()
            .unwrap_or(as_of)
    }

    fn to_index(&self, range: &TimeRange) -> Vec<Timestamp> {
        let mut points: Vec<Timestamp> = self
            .calendars
            .iter()
            .flat_map(|c| c.to_index(range))
            .collect();
        points.sort();
        points.dedup();
        points
    }

    fn members(&self) -> Option<&[Arc<dyn Calendar>]> {
        Some(&self.calendars)
    }
}
