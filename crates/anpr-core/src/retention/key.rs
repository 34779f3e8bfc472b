use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::storage::models::Report;

/// Identity of one physical detection event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub number_plate: String,
    pub time_bucket: i64,
    pub vehicle_type: String,
    pub device_name: String,
}

/// Fixed-width bucket index of `date`: floor(epoch millis / width).
/// A zero width is treated as one millisecond.
pub fn time_bucket(date: DateTime<Utc>, bucket_width: Duration) -> i64 {
    let width = i64::try_from(bucket_width.as_millis()).unwrap_or(i64::MAX).max(1);
    date.timestamp_millis().div_euclid(width)
}

pub fn build_key(report: &Report, bucket_width: Duration) -> GroupKey {
    GroupKey {
        number_plate: report.number_plate.clone(),
        time_bucket: time_bucket(report.date, bucket_width),
        vehicle_type: report.vehicle_type.clone(),
        device_name: report.device_name.clone(),
    }
}
