// src/data/frame.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::time::{TimeRange, Timestamp};

/// One row of a frame: column name to value.
pub type Row = BTreeMap<String, f64>;

/// Time-indexed table with one row per timestamp.
///
/// A missing cell is simply absent from its row; non-finite values are never
/// stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame {
    rows: BTreeMap<Timestamp, Row>,
}

fn finite_cells(row: Row) -> Row {
    row.into_iter().filter(|(_, v)| v.is_finite()).collect()
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (Timestamp, Row)>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|(ts, row)| (ts, finite_cells(row)))
                .collect(),
        }
    }

    /// Single-column frame.
    pub fn from_series<I>(column: &str, points: I) -> Self
    where
        I: IntoIterator<Item = (Timestamp, f64)>,
    {
        let mut frame = Self::new();
        for (ts, value) in points {
            frame.insert(ts, column, value);
        }
        frame
    }

    /// Set a cell. The row is created even when `value` is not finite.
    pub fn insert(&mut self, ts: Timestamp, column: &str, value: f64) {
        let row = self.rows.entry(ts).or_default();
        if value.is_finite() {
            row.insert(column.to_string(), value);
        } else {
            row.remove(column);
        }
    }

    pub fn get(&self, ts: &Timestamp, column: &str) -> Option<f64> {
        self.rows.get(ts).and_then(|row| row.get(column)).copied()
    }

    pub fn row(&self, ts: &Timestamp) -> Option<&Row> {
        self.rows.get(ts)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&Timestamp, &Row)> {
        self.rows.iter()
    }

    pub fn index(&self) -> impl Iterator<Item = &Timestamp> {
        self.rows.keys()
    }

    pub fn columns(&self) -> BTreeSet<&str> {
        self.rows
            .values()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_index(&self) -> Option<Timestamp> {
        self.rows.keys().next().copied()
    }

    pub fn last_index(&self) -> Option<Timestamp> {
        self.rows.keys().next_back().copied()
    }

    /// Range actually spanned by the rows; `None` for an empty frame.
    pub fn time_range(&self) -> Option<TimeRange> {
        let first = self.first_index()?;
        let last = self.last_index()?;
        TimeRange::spanning(first, last).ok()
    }

    /// Rows inside `range`.
    pub fn view(&self, range: &TimeRange) -> Frame {
        Frame {
            rows: self
                .rows
                .range(range.start()..range.end())
                .map(|(ts, row)| (*ts, row.clone()))
                .collect(),
        }
    }

    /// Rows at or after `ts`.
    pub fn after(&self, ts: Timestamp) -> Frame {
        Frame {
            rows: self
                .rows
                .range(ts..)
                .map(|(ts, row)| (*ts, row.clone()))
                .collect(),
        }
    }

    /// `self` followed by the rows of `tail` strictly after `self`'s last row.
    ///
    /// Existing rows are never altered.
    pub fn concat(&self, tail: &Frame) -> Frame {
        let mut rows = self.rows.clone();
        let appended = match self.last_index() {
            Some(last) => tail
                .rows
                .range(last..)
                .filter(|(ts, _)| **ts > last)
                .map(|(ts, row)| (*ts, row.clone()))
                .collect::<Vec<_>>(),
            None => tail.rows.iter().map(|(ts, row)| (*ts, row.clone())).collect(),
        };
        rows.extend(appended);
        Frame { rows }
    }

    /// Cell-wise combine where `self` wins and `other` fills the gaps.
    ///
    /// The result carries the union of rows and columns of both frames.
    pub fn combine_first(&self, other: &Frame) -> Frame {
        let mut rows = self.rows.clone();
        for (ts, other_row) in &other.rows {
            let row = rows.entry(*ts).or_default();
            for (column, value) in other_row {
                row.entry(column.clone()).or_insert(*value);
            }
        }
        Frame { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2021, 1, d, 0, 0, 0).unwrap()
    }

    fn series(days: std::ops::RangeInclusive<u32>, value: f64) -> Frame {
        Frame::from_series("x", days.map(|d| (day(d), value)))
    }

    #[test]
    fn time_range_ends_one_resolution_after_last_row() {
        let frame = series(1..=3, 1.0);
        let range = frame.time_range().unwrap();
        assert_eq!(range.start(), day(1));
        assert!(range.contains_point(&day(3)));
        assert!(!range.contains_point(&(day(3) + chrono::TimeDelta::nanoseconds(1))));
        assert!(Frame::new().time_range().is_none());
    }

    #[test]
    fn concat_ignores_overlapping_rows() {
        let head = series(1..=3, 1.0);
        let tail = series(2..=5, 2.0);
        let out = head.concat(&tail);
        assert_eq!(out.len(), 5);
        assert_eq!(out.get(&day(3), "x"), Some(1.0));
        assert_eq!(out.get(&day(4), "x"), Some(2.0));
    }

    #[test]
    fn combine_first_keeps_existing_cells() {
        let mut existing = series(1..=2, 1.0);
        existing.insert(day(2), "x", f64::NAN);
        let mut incoming = series(1..=3, 2.0);
        incoming.insert(day(1), "y", 9.0);

        let out = existing.combine_first(&incoming);
        assert_eq!(out.get(&day(1), "x"), Some(1.0));
        assert_eq!(out.get(&day(2), "x"), Some(2.0));
        assert_eq!(out.get(&day(3), "x"), Some(2.0));
        assert_eq!(out.get(&day(1), "y"), Some(9.0));
    }

    #[test]
    fn view_is_half_open() {
        let frame = series(1..=5, 1.0);
        let range = TimeRange::new(day(2), day(4)).unwrap();
        let view = frame.view(&range);
        assert_eq!(view.index().copied().collect::<Vec<_>>(), vec![day(2), day(3)]);
        assert_eq!(frame.after(day(4)).len(), 2);
    }
}
