use anpr_core::storage::models::*;
use anpr_core::storage::queries::day_bounds;
use anpr_core::storage::{Database, ReportStore};
use anpr_core::Error;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn make_test_report(plate: &str, device: &str, date: DateTime<Utc>) -> NewReport {
    NewReport {
        number_plate: plate.to_string(),
        original_number_plate: None,
        vehicle_type: "4 Wheeler".to_string(),
        device_name: device.to_string(),
        date: Some(date),
        number_plate_image: format!("/uploads/{}-plate.png", plate),
        vehicle_image: format!("/uploads/{}-vehicle.png", plate),
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_insert_and_get_report() {
    let db = Database::open_in_memory().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 3).unwrap();

    let stored = db
        .insert_report(&make_test_report("GJ01AB1234", "Cam1", at), now)
        .unwrap();
    assert!(stored.id > 0);
    assert_eq!(stored.date, at);
    assert_eq!(stored.created_at, now);
    assert_eq!(stored.original_number_plate, "GJ01AB1234");

    let fetched = db.get_report(stored.id).unwrap().unwrap();
    assert_eq!(fetched, stored);
    assert!(db.get_report(stored.id + 100).unwrap().is_none());
}

#[test]
fn test_fetch_reports_for_day_uses_event_time() {
    let db = Database::open_in_memory().unwrap();
    let now = Utc::now();
    db.insert_report(
        &make_test_report("A1", "Cam1", Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
        now,
    )
    .unwrap();
    db.insert_report(
        &make_test_report("A2", "Cam1", Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap()),
        now,
    )
    .unwrap();
    db.insert_report(
        &make_test_report("A3", "Cam1", Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()),
        now,
    )
    .unwrap();

    let reports = db.fetch_reports_for_day(day(2024, 5, 1), utc()).unwrap();
    let mut plates: Vec<_> = reports.iter().map(|r| r.number_plate.clone()).collect();
    plates.sort();
    assert_eq!(plates, vec!["A1", "A2"]);

    assert!(db
        .fetch_reports_for_day(day(2024, 4, 30), utc())
        .unwrap()
        .is_empty());
}

#[test]
fn test_fetch_reports_for_day_with_offset() {
    let db = Database::open_in_memory().unwrap();
    // 20:00 UTC on May 1st is May 2nd at +05:30.
    db.insert_report(
        &make_test_report("B1", "Cam1", Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()),
        Utc::now(),
    )
    .unwrap();

    let ist = FixedOffset::east_opt(330 * 60).unwrap();
    assert_eq!(
        db.fetch_reports_for_day(day(2024, 5, 2), ist).unwrap().len(),
        1
    );
    assert!(db
        .fetch_reports_for_day(day(2024, 5, 1), ist)
        .unwrap()
        .is_empty());
}

#[test]
fn test_day_bounds() {
    let (start, end) = day_bounds(day(2024, 5, 2), FixedOffset::east_opt(330 * 60).unwrap());
    assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 1, 18, 30, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2024, 5, 2, 18, 30, 0).unwrap());
}

#[test]
fn test_delete_reports_by_ids_reports_partial_success() {
    let db = Database::open_in_memory().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let a = db.insert_report(&make_test_report("C1", "Cam1", at), at).unwrap();
    let b = db.insert_report(&make_test_report("C2", "Cam1", at), at).unwrap();

    let deleted = db.delete_reports_by_ids(&[a.id, 9_999, b.id]).unwrap();
    assert_eq!(deleted, vec![a.id, b.id]);
    assert_eq!(db.count_reports().unwrap(), 0);

    assert!(db.delete_reports_by_ids(&[]).unwrap().is_empty());
}

#[test]
fn test_list_reports_filters_and_pages() {
    let db = Database::open_in_memory().unwrap();
    let now = Utc::now();
    for minute in 0..5 {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap();
        db.insert_report(&make_test_report("MH12DE1433", "Gate", at), now)
            .unwrap();
    }
    db.insert_report(
        &make_test_report("KA01ZZ0001", "Exit", Utc.with_ymd_and_hms(2024, 5, 3, 9, 0, 0).unwrap()),
        now,
    )
    .unwrap();

    let (all, total) = db.list_reports(&ReportFilter::default(), utc()).unwrap();
    assert_eq!(total, 6);
    assert_eq!(all.len(), 6);
    assert_eq!(all[0].number_plate, "KA01ZZ0001");
    assert!(all.windows(2).all(|w| w[0].date >= w[1].date));

    let filter = ReportFilter {
        device_name: Some("Gate".to_string()),
        offset: 1,
        limit: Some(2),
        ..ReportFilter::default()
    };
    let (page, total) = db.list_reports(&filter, utc()).unwrap();
    assert_eq!(total, 5);
    assert_eq!(page.len(), 2);
    assert_eq!(
        page[0].date,
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 3, 0).unwrap()
    );

    let filter = ReportFilter {
        plate: Some("mh12".to_string()),
        day: Some(day(2024, 5, 1)),
        ..ReportFilter::default()
    };
    let (_, total) = db.list_reports(&filter, utc()).unwrap();
    assert_eq!(total, 5);
}

#[test]
fn test_update_report_keeps_event_time() {
    let db = Database::open_in_memory().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let stored = db.insert_report(&make_test_report("D1", "Cam1", at), at).unwrap();

    let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let update = ReportUpdate {
        number_plate: Some("d-2".to_string()),
        vehicle_image: Some("/uploads/new.png".to_string()),
        ..ReportUpdate::default()
    };
    let (previous, updated) = db.update_report(stored.id, &update, later).unwrap().unwrap();

    assert_eq!(previous, stored);
    assert_eq!(updated.number_plate, "D2");
    assert_eq!(updated.original_number_plate, "d-2");
    assert_eq!(updated.vehicle_image, "/uploads/new.png");
    assert_eq!(updated.date, at);
    assert_eq!(updated.updated_at, later);
    assert_eq!(db.get_report(stored.id).unwrap().unwrap(), updated);

    assert!(db.update_report(404, &update, later).unwrap().is_none());
}

#[test]
fn test_delete_report_returns_row() {
    let db = Database::open_in_memory().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let stored = db.insert_report(&make_test_report("E1", "Cam1", at), at).unwrap();

    assert_eq!(db.delete_report(stored.id).unwrap(), Some(stored.clone()));
    assert_eq!(db.delete_report(stored.id).unwrap(), None);
}

#[test]
fn test_invalid_row_is_rejected_at_boundary() {
    let db = Database::open_in_memory().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    db.connection()
        .unwrap()
        .execute(
            "INSERT INTO report (number_plate, original_number_plate, vehicle_type, \
             device_name, event_at, number_plate_image, vehicle_image, created_at, updated_at) \
             VALUES ('F1', '', '4 Wheeler', 'Cam1', ?1, '', 'v.png', ?1, ?1)",
            rusqlite::params![at.timestamp_millis()],
        )
        .unwrap();

    let err = db.fetch_reports_for_day(day(2024, 5, 1), utc()).unwrap_err();
    assert!(matches!(err, Error::InvalidRecord { .. }));
    assert!(err.is_store_error());
}

#[test]
fn test_truncate_all() {
    let db = Database::open_in_memory().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    db.insert_report(&make_test_report("G1", "Cam1", at), at).unwrap();
    db.truncate_all().unwrap();
    assert_eq!(db.count_reports().unwrap(), 0);
}

#[test]
fn test_reopen_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports.db");
    let path = path.to_str().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    {
        let db = Database::open(path).unwrap();
        db.insert_report(&make_test_report("H1", "Cam1", at), at).unwrap();
    }
    let db = Database::open(path).unwrap();
    assert_eq!(db.count_reports().unwrap(), 1);
}
