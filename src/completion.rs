// src/completion.rs

//! Completion policies: does the stored data satisfy a requested window?

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{DatadagError, Result};
use crate::identity::DatasetMetadata;
use crate::persistence::PersistenceEngine;
use crate::task::Dependency;
use crate::time::{Calendar, TimeRange, UnionCalendar};

#[derive(Clone)]
pub enum CompletionChecker {
    /// Complete once the dataset exists.
    Static,
    /// Complete once the declared range reaches the requested end.
    Irregular,
    /// Complete once the data reaches the latest expected calendar point.
    Calendar(Arc<dyn Calendar>),
}

impl fmt::Debug for CompletionChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionChecker::Static => write!(f, "Static"),
            CompletionChecker::Irregular => write!(f, "Irregular"),
            CompletionChecker::Calendar(cal) => f.debug_tuple("Calendar").field(cal).finish(),
        }
    }
}

impl CompletionChecker {
    pub fn calendar(calendar: impl Calendar + 'static) -> Self {
        CompletionChecker::Calendar(Arc::new(calendar))
    }

    pub fn is_complete(
        &self,
        engine: &dyn PersistenceEngine,
        metadata: &DatasetMetadata,
        requested: Option<&TimeRange>,
    ) -> Result<bool> {
        let complete = match self {
            CompletionChecker::Static => engine.exists(metadata)?,
            CompletionChecker::Irregular => {
                let requested = require_range(metadata, requested)?;
                if !engine.exists(metadata)? {
                    return Ok(false);
                }
                match engine.get_declared_time_range(metadata)? {
                    None => false,
                    Some(declared) => {
                        if !declared.intersects(requested) {
                            return Err(DatadagError::NonOverlappingRequest {
                                declared: declared.to_string(),
                                requested: requested.to_string(),
                            });
                        }
                        declared.end() >= requested.end()
                    }
                }
            }
            CompletionChecker::Calendar(calendar) => {
                let requested = require_range(metadata, requested)?;
                if !engine.exists(metadata)? {
                    return Ok(false);
                }
                match engine.get_data_time_range(metadata)? {
                    None => false,
                    Some(actual) => {
                        let latest = calendar.latest_point_before(requested.end());
                        let required = TimeRange::new(latest, requested.end())?;
                        required.intersects(&actual)
                    }
                }
            }
        };
        debug!(dataset = %metadata, checker = ?self, complete, "checked completion");
        Ok(complete)
    }
}

fn require_range<'a>(
    metadata: &DatasetMetadata,
    requested: Option<&'a TimeRange>,
) -> Result<&'a TimeRange> {
    requested.ok_or_else(|| {
        DatadagError::InvalidDeclaration(format!(
            "time series completion of '{}' needs a requested time range",
            metadata.name()
        ))
    })
}

/// Derive a checker for `task` from its time series dependencies.
///
/// Edges flagged `inherit_frequency = true` are used exclusively when any
/// exist; otherwise every time series edge not flagged `false` is used.
pub fn infer_inherited_checker(
    task: &str,
    dependencies: &BTreeMap<String, Dependency>,
) -> Result<CompletionChecker> {
    let time_series: Vec<(&String, &Dependency)> = dependencies
        .iter()
        .filter(|(_, dep)| dep.task().is_time_series())
        .collect();

    let explicit: Vec<(&String, &Dependency)> = time_series
        .iter()
        .copied()
        .filter(|(_, dep)| dep.inherit_frequency() == Some(true))
        .collect();
    let inheritors = if explicit.is_empty() {
        time_series
            .into_iter()
            .filter(|(_, dep)| dep.inherit_frequency() != Some(false))
            .collect()
    } else {
        explicit
    };

    let mut checkers: Vec<(&String, CompletionChecker)> = Vec::with_capacity(inheritors.len());
    for (edge, dep) in inheritors {
        let checker = dep.task().completion_checker().cloned().ok_or_else(|| {
            DatadagError::NoPolicySource(format!(
                "{task} (dependency '{edge}' has no completion checker)"
            ))
        })?;
        checkers.push((edge, checker));
    }

    match checkers.len() {
        0 => Err(DatadagError::NoPolicySource(task.to_string())),
        1 => Ok(checkers.remove(0).1),
        _ => {
            let calendars: Vec<Arc<dyn Calendar>> = checkers
                .iter()
                .filter_map(|(_, c)| match c {
                    CompletionChecker::Calendar(cal) => Some(cal.clone()),
                    _ => None,
                })
                .collect();
            if calendars.len() == checkers.len() {
                return Ok(CompletionChecker::Calendar(Arc::new(UnionCalendar::merge(
                    calendars,
                )?)));
            }
            if checkers
                .iter()
                .all(|(_, c)| matches!(c, CompletionChecker::Irregular))
            {
                return Ok(CompletionChecker::Irregular);
            }
            let (calendar, irregular): (Vec<_>, Vec<_>) = checkers
                .iter()
                .partition(|(_, c)| matches!(c, CompletionChecker::Calendar(_)));
            Err(DatadagError::InconsistentPolicy {
                calendar: calendar.into_iter().map(|(e, _)| e.to_string()).collect(),
                irregular: irregular.into_iter().map(|(e, _)| e.to_string()).collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, Frame};
    use crate::persistence::MemoryEngine;
    use crate::time::{IntervalCalendar, Timestamp};
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2021, 1, d, 0, 0, 0).unwrap()
    }

    fn stored(engine: &MemoryEngine, days: std::ops::RangeInclusive<u32>, declared_end: u32) -> DatasetMetadata {
        let meta = DatasetMetadata::builder("prices").build().unwrap();
        let frame = Frame::from_series("x", days.clone().map(|d| (day(d), 1.0)));
        let declared = TimeRange::new(day(*days.start()), day(declared_end)).unwrap();
        engine
            .replace(&Dataset::time_series(meta.clone(), frame, Some(declared)).unwrap())
            .unwrap();
        meta
    }

    #[test]
    fn irregular_compares_declared_end() {
        let engine = MemoryEngine::new();
        let meta = stored(&engine, 1..=5, 8);
        let checker = CompletionChecker::Irregular;

        let within = TimeRange::new(day(2), day(8)).unwrap();
        let beyond = TimeRange::new(day(2), day(9)).unwrap();
        assert!(checker.is_complete(&engine, &meta, Some(&within)).unwrap());
        assert!(!checker.is_complete(&engine, &meta, Some(&beyond)).unwrap());

        let disjoint = TimeRange::new(day(20), day(22)).unwrap();
        assert!(matches!(
            checker.is_complete(&engine, &meta, Some(&disjoint)),
            Err(DatadagError::NonOverlappingRequest { .. })
        ));
    }

    #[test]
    fn missing_dataset_is_incomplete() {
        let engine = MemoryEngine::new();
        let meta = DatasetMetadata::builder("absent").build().unwrap();
        let range = TimeRange::new(day(1), day(2)).unwrap();
        for checker in [
            CompletionChecker::Static,
            CompletionChecker::Irregular,
            CompletionChecker::calendar(IntervalCalendar::daily(day(1))),
        ] {
            assert!(!checker.is_complete(&engine, &meta, Some(&range)).unwrap());
        }
    }

    #[test]
    fn calendar_needs_the_latest_expected_point() {
        let engine = MemoryEngine::new();
        let meta = stored(&engine, 1..=5, 6);
        let checker = CompletionChecker::calendar(IntervalCalendar::daily(day(1)));

        // latest point before day 6 is day 5, which is stored
        let up_to_6 = TimeRange::new(day(1), day(6)).unwrap();
        assert!(checker.is_complete(&engine, &meta, Some(&up_to_6)).unwrap());

        let up_to_7 = TimeRange::new(day(1), day(7)).unwrap();
        assert!(!checker.is_complete(&engine, &meta, Some(&up_to_7)).unwrap());
    }
}
