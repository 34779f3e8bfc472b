use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::models::*;
use super::sqlite::Database;
use crate::error::{Error, Result};

/// Store operations the retention engine depends on.
pub trait ReportStore: Send + Sync {
    /// Every report whose event time falls inside `day` (at `offset`), in any order.
    fn fetch_reports_for_day(&self, day: NaiveDate, offset: FixedOffset) -> Result<Vec<Report>>;

    /// Delete the given ids in one transaction and return the ids actually removed.
    /// A result shorter than `ids` is a partial success, not an error.
    fn delete_reports_by_ids(&self, ids: &[ReportId]) -> Result<Vec<ReportId>>;
}

const REPORT_COLUMNS: &str = "id, number_plate, original_number_plate, vehicle_type, \
     device_name, event_at, number_plate_image, vehicle_image, created_at, updated_at";

fn read_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        number_plate: row.get(1)?,
        original_number_plate: row.get(2)?,
        vehicle_type: row.get(3)?,
        device_name: row.get(4)?,
        event_at: row.get(5)?,
        number_plate_image: row.get(6)?,
        vehicle_image: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn into_reports(rows: Vec<ReportRow>) -> Result<Vec<Report>> {
    rows.into_iter().map(Report::try_from).collect()
}

/// UTC bounds `[start, end)` of a calendar day at the given offset.
pub fn day_bounds(day: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = day.and_time(NaiveTime::MIN);
    let start = Utc.from_utc_datetime(
        &(local_midnight - Duration::seconds(offset.local_minus_utc() as i64)),
    );
    (start, start + Duration::days(1))
}

fn select_report(conn: &Connection, id: ReportId) -> Result<Option<Report>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM report WHERE id = ?1", REPORT_COLUMNS),
            params![id],
            read_row,
        )
        .optional()?;
    row.map(Report::try_from).transpose()
}

impl Database {
    pub fn insert_report(&self, report: &NewReport, now: DateTime<Utc>) -> Result<Report> {
        let original = report
            .original_number_plate
            .clone()
            .unwrap_or_else(|| report.number_plate.clone());
        let event_at = report.date.unwrap_or(now);

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO report \
             (number_plate, original_number_plate, vehicle_type, device_name, event_at, \
              number_plate_image, vehicle_image, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                report.number_plate,
                original,
                report.vehicle_type,
                report.device_name,
                event_at.timestamp_millis(),
                report.number_plate_image,
                report.vehicle_image,
                now.timestamp_millis(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        select_report(&conn, id)?.ok_or(Error::NotFound(id))
    }

    pub fn get_report(&self, id: ReportId) -> Result<Option<Report>> {
        let conn = self.connection()?;
        select_report(&conn, id)
    }

    /// List reports newest first. Returns (page, total matching count).
    pub fn list_reports(
        &self,
        filter: &ReportFilter,
        offset: FixedOffset,
    ) -> Result<(Vec<Report>, i64)> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(day) = filter.day {
            let (start, end) = day_bounds(day, offset);
            clauses.push("event_at >= ? AND event_at < ?");
            values.push(start.timestamp_millis().into());
            values.push(end.timestamp_millis().into());
        }
        if let Some(device) = &filter.device_name {
            clauses.push("device_name = ?");
            values.push(device.clone().into());
        }
        if let Some(plate) = &filter.plate {
            clauses.push("number_plate LIKE ?");
            values.push(format!("%{}%", normalize_plate(plate)).into());
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let conn = self.connection()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM report{}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let mut page_values = values;
        page_values.push(filter.limit.unwrap_or(-1).into());
        page_values.push(filter.offset.max(0).into());

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM report{} ORDER BY event_at DESC, id DESC LIMIT ? OFFSET ?",
            REPORT_COLUMNS, where_sql
        ))?;
        let rows = stmt
            .query_map(params_from_iter(page_values.iter()), read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((into_reports(rows)?, total))
    }

    pub fn count_reports(&self) -> Result<i64> {
        let count = self
            .connection()?
            .query_row("SELECT COUNT(*) FROM report", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Apply a partial update. Returns (previous, updated), or None if the id is unknown.
    pub fn update_report(
        &self,
        id: ReportId,
        update: &ReportUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<(Report, Report)>> {
        let conn = self.connection()?;
        let tx = conn.unchecked_transaction()?;

        let previous = match select_report(&tx, id)? {
            Some(report) => report,
            None => return Ok(None),
        };
        let mut updated = previous.clone();
        update.apply_to(&mut updated, now);

        tx.execute(
            "UPDATE report SET number_plate = ?1, original_number_plate = ?2, \
             vehicle_type = ?3, device_name = ?4, number_plate_image = ?5, \
             vehicle_image = ?6, updated_at = ?7 WHERE id = ?8",
            params![
                updated.number_plate,
                updated.original_number_plate,
                updated.vehicle_type,
                updated.device_name,
                updated.number_plate_image,
                updated.vehicle_image,
                updated.updated_at.timestamp_millis(),
                id,
            ],
        )?;
        tx.commit()?;
        debug!("Updated report {}", id);
        Ok(Some((previous, updated)))
    }

    /// Delete one report and return it, or None if it did not exist.
    pub fn delete_report(&self, id: ReportId) -> Result<Option<Report>> {
        let conn = self.connection()?;
        let tx = conn.unchecked_transaction()?;
        let existing = select_report(&tx, id)?;
        if existing.is_some() {
            tx.execute("DELETE FROM report WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(existing)
    }
}

impl ReportStore for Database {
    fn fetch_reports_for_day(&self, day: NaiveDate, offset: FixedOffset) -> Result<Vec<Report>> {
        let (start, end) = day_bounds(day, offset);
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM report WHERE event_at >= ?1 AND event_at < ?2",
            REPORT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![start.timestamp_millis(), end.timestamp_millis()],
                read_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("Fetched {} reports for {}", rows.len(), day);
        into_reports(rows)
    }

    fn delete_reports_by_ids(&self, ids: &[ReportId]) -> Result<Vec<ReportId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.connection()?;
        let tx = conn.unchecked_transaction()?;
        let mut deleted = Vec::with_capacity(ids.len());
        {
            let mut stmt = tx.prepare_cached("DELETE FROM report WHERE id = ?1")?;
            for id in ids {
                if stmt.execute(params![id])? > 0 {
                    deleted.push(*id);
                }
            }
        }
        tx.commit()?;

        if deleted.len() < ids.len() {
            warn!(
                "Requested deletion of {} reports but only {} were present",
                ids.len(),
                deleted.len()
            );
        }
        Ok(deleted)
    }
}
