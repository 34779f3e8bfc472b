use ahash::AHashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;

use super::key::{build_key, GroupKey};
use crate::storage::models::{Report, ReportId};

/// Result of partitioning one day's reports.
#[derive(Debug, Default)]
pub struct Selection {
    pub survivors: AHashMap<GroupKey, Report>,
    /// Every report displaced from its group, in the order it was displaced.
    pub duplicates: Vec<Report>,
}

impl Selection {
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty()
    }

    pub fn duplicate_ids(&self) -> Vec<ReportId> {
        self.duplicates.iter().map(|r| r.id).collect()
    }
}

/// Keep the most recent report of each group and collect the rest.
///
/// Input order is not trusted for anything except ties: when two reports in a
/// group share the same `date`, the one seen first stays.
pub fn select_duplicates<I>(reports: I, bucket_width: Duration) -> Selection
where
    I: IntoIterator<Item = Report>,
{
    let mut survivors: AHashMap<GroupKey, Report> = AHashMap::new();
    let mut duplicates = Vec::new();

    for report in reports {
        let key = build_key(&report, bucket_width);
        match survivors.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(report);
            }
            Entry::Occupied(mut slot) => {
                if report.date > slot.get().date {
                    duplicates.push(slot.insert(report));
                } else {
                    duplicates.push(report);
                }
            }
        }
    }

    Selection {
        survivors,
        duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashSet;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    fn report(id: i64, plate: &str, device: &str, date: DateTime<Utc>) -> Report {
        Report {
            id,
            number_plate: plate.to_string(),
            original_number_plate: plate.to_string(),
            vehicle_type: "4 Wheeler".to_string(),
            device_name: device.to_string(),
            date,
            number_plate_image: format!("/uploads/{}-plate.png", id),
            vehicle_image: format!("/uploads/{}-vehicle.png", id),
            created_at: date,
            updated_at: date,
        }
    }

    fn survivor_ids(selection: &Selection) -> HashSet<i64> {
        selection.survivors.values().map(|r| r.id).collect()
    }

    #[test]
    fn test_empty_input() {
        let selection = select_duplicates(Vec::new(), FIVE_MINUTES);
        assert!(selection.survivors.is_empty());
        assert!(selection.is_clean());
    }

    #[test]
    fn test_single_report_survives() {
        let selection = select_duplicates(vec![report(1, "A1", "Cam1", at(9, 0, 0))], FIVE_MINUTES);
        assert_eq!(survivor_ids(&selection), HashSet::from([1]));
        assert!(selection.is_clean());
    }

    #[test]
    fn test_latest_report_wins_regardless_of_order() {
        let reports = vec![
            report(1, "GJ01AB1234", "Cam1", at(10, 2, 0)),
            report(2, "GJ01AB1234", "Cam1", at(10, 0, 0)),
            report(3, "GJ01AB1234", "Cam1", at(10, 7, 0)),
        ];
        let selection = select_duplicates(reports, FIVE_MINUTES);

        assert_eq!(survivor_ids(&selection), HashSet::from([1, 3]));
        assert_eq!(selection.duplicate_ids(), vec![2]);
    }

    #[test]
    fn test_displaced_survivor_is_reported() {
        let reports = vec![
            report(1, "X9", "Cam1", at(8, 0, 0)),
            report(2, "X9", "Cam1", at(8, 1, 0)),
            report(3, "X9", "Cam1", at(8, 2, 0)),
        ];
        let selection = select_duplicates(reports, FIVE_MINUTES);

        assert_eq!(survivor_ids(&selection), HashSet::from([3]));
        assert_eq!(selection.duplicate_ids(), vec![1, 2]);
    }

    #[test]
    fn test_tie_keeps_first_encountered() {
        let same = at(12, 0, 0);
        for _ in 0..3 {
            let selection = select_duplicates(
                vec![report(5, "P1", "Cam1", same), report(4, "P1", "Cam1", same)],
                FIVE_MINUTES,
            );
            assert_eq!(survivor_ids(&selection), HashSet::from([5]));
            assert_eq!(selection.duplicate_ids(), vec![4]);
        }
    }

    #[test]
    fn test_distinct_keys_are_untouched() {
        let reports = vec![
            report(1, "P1", "Cam1", at(7, 0, 0)),
            report(2, "P2", "Cam1", at(7, 0, 0)),
            report(3, "P1", "Cam2", at(7, 0, 0)),
            report(4, "P1", "Cam1", at(7, 30, 0)),
        ];
        let selection = select_duplicates(reports, FIVE_MINUTES);
        assert!(selection.is_clean());
        assert_eq!(survivor_ids(&selection), HashSet::from([1, 2, 3, 4]));
    }

    #[test]
    fn test_one_survivor_per_key() {
        let mut reports = Vec::new();
        for i in 0..40 {
            let plate = if i % 2 == 0 { "EVEN" } else { "ODD" };
            reports.push(report(i, plate, "Cam1", at(6, (i % 15) as u32, 0)));
        }
        let total = reports.len();
        let keys: HashSet<GroupKey> = reports
            .iter()
            .map(|r| build_key(r, FIVE_MINUTES))
            .collect();

        let selection = select_duplicates(reports, FIVE_MINUTES);

        assert_eq!(selection.survivors.len(), keys.len());
        assert_eq!(
            selection.survivors.len() + selection.duplicates.len(),
            total
        );
        for duplicate in &selection.duplicates {
            let survivor = &selection.survivors[&build_key(duplicate, FIVE_MINUTES)];
            assert_ne!(survivor.id, duplicate.id);
            assert!(survivor.date >= duplicate.date);
        }
    }

    #[test]
    fn test_selection_is_idempotent() {
        let reports = vec![
            report(1, "P1", "Cam1", at(11, 0, 0)),
            report(2, "P1", "Cam1", at(11, 3, 0)),
            report(3, "P1", "Cam1", at(11, 3, 0)),
            report(4, "P2", "Cam1", at(11, 3, 0)),
        ];
        let first = select_duplicates(reports.clone(), FIVE_MINUTES);
        let second = select_duplicates(reports, FIVE_MINUTES);

        assert_eq!(survivor_ids(&first), survivor_ids(&second));
        assert_eq!(first.duplicate_ids(), second.duplicate_ids());
    }
}
