use anpr_core::Report;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: i64,
    number_plate: &'a str,
    original_number_plate: &'a str,
    vehicle_type: &'a str,
    device_name: &'a str,
    date: String,
    number_plate_image: &'a str,
    vehicle_image: &'a str,
}

impl<'a> From<&'a Report> for CsvRow<'a> {
    fn from(report: &'a Report) -> Self {
        CsvRow {
            id: report.id,
            number_plate: &report.number_plate,
            original_number_plate: &report.original_number_plate,
            vehicle_type: &report.vehicle_type,
            device_name: &report.device_name,
            date: report.date.to_rfc3339(),
            number_plate_image: &report.number_plate_image,
            vehicle_image: &report.vehicle_image,
        }
    }
}

/// Write `reports` to `path` as CSV with a header row. Returns rows written.
pub fn write_csv(reports: &[Report], path: &Path) -> anyhow::Result<usize> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for report in reports {
        writer.serialize(CsvRow::from(report))?;
    }
    writer.flush()?;
    Ok(reports.len())
}
