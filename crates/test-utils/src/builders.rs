#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use datadag::data::{Dataset, Frame};
use datadag::identity::{DatasetMetadata, MetadataBuilder, TimeLevel};
use datadag::persistence::EngineState;
use datadag::time::{TimeRange, Timestamp};

/// Midnight UTC on day `d` of January 2024.
pub fn day(d: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0)
        .single()
        .expect("valid test date")
}

/// `[day(first), day(last))`.
pub fn daily_range(first: u32, last: u32) -> TimeRange {
    TimeRange::new(day(first), day(last)).expect("non-empty test range")
}

/// One `value` row per day in `days`, in a column called `value`.
pub fn daily_frame(days: impl IntoIterator<Item = u32>, value: f64) -> Frame {
    Frame::from_series("value", days.into_iter().map(|d| (day(d), value)))
}

pub fn static_metadata(name: &str) -> DatasetMetadata {
    MetadataBuilder::new(name)
        .is_static(true)
        .engine(EngineState::Memory)
        .build()
        .expect("valid static metadata")
}

pub fn time_series_metadata(name: &str) -> DatasetMetadata {
    MetadataBuilder::new(name)
        .time_level(Some(TimeLevel::Name("daily".to_string())))
        .engine(EngineState::Memory)
        .build()
        .expect("valid time series metadata")
}

/// Builder for time series datasets used by persistence tests.
pub struct DatasetBuilder {
    metadata: DatasetMetadata,
    frame: Frame,
    declared: Option<TimeRange>,
}

impl DatasetBuilder {
    pub fn new(metadata: DatasetMetadata) -> Self {
        Self {
            metadata,
            frame: Frame::new(),
            declared: None,
        }
    }

    pub fn rows(mut self, days: impl IntoIterator<Item = u32>, value: f64) -> Self {
        self.frame = self.frame.combine_first(&daily_frame(days, value));
        self
    }

    pub fn declared(mut self, first: u32, last: u32) -> Self {
        self.declared = Some(daily_range(first, last));
        self
    }

    pub fn build(self) -> Dataset {
        Dataset::time_series(self.metadata, self.frame, self.declared)
            .expect("valid test dataset")
    }
}
