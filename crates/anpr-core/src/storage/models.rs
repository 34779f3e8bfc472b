use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub type ReportId = i64;

/// One ANPR detection as stored in the `report` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    /// Plate text after normalization; used for grouping.
    pub number_plate: String,
    pub original_number_plate: String,
    pub vehicle_type: String,
    pub device_name: String,
    /// Moment of detection.
    pub date: DateTime<Utc>,
    pub number_plate_image: String,
    pub vehicle_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// The two image references owned by this report.
    pub fn image_refs(&self) -> [&str; 2] {
        [&self.number_plate_image, &self.vehicle_image]
    }
}

/// Untyped row as read from SQLite, validated into a `Report` by `TryFrom`.
#[derive(Debug)]
pub(crate) struct ReportRow {
    pub id: i64,
    pub number_plate: String,
    pub original_number_plate: String,
    pub vehicle_type: String,
    pub device_name: String,
    pub event_at: i64,
    pub number_plate_image: String,
    pub vehicle_image: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<ReportRow> for Report {
    type Error = Error;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let invalid = move |reason: &str| Error::InvalidRecord {
            id,
            reason: reason.to_string(),
        };

        for (field, value) in [
            ("number_plate", &row.number_plate),
            ("vehicle_type", &row.vehicle_type),
            ("device_name", &row.device_name),
            ("number_plate_image", &row.number_plate_image),
            ("vehicle_image", &row.vehicle_image),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(&format!("{} is blank", field)));
            }
        }

        let date = DateTime::from_timestamp_millis(row.event_at)
            .ok_or_else(|| invalid("event timestamp out of range"))?;
        let created_at = DateTime::from_timestamp_millis(row.created_at)
            .ok_or_else(|| invalid("created_at out of range"))?;
        let updated_at = DateTime::from_timestamp_millis(row.updated_at)
            .ok_or_else(|| invalid("updated_at out of range"))?;

        let original_number_plate = if row.original_number_plate.trim().is_empty() {
            row.number_plate.clone()
        } else {
            row.original_number_plate
        };

        Ok(Report {
            id: row.id,
            number_plate: row.number_plate,
            original_number_plate,
            vehicle_type: row.vehicle_type,
            device_name: row.device_name,
            date,
            number_plate_image: row.number_plate_image,
            vehicle_image: row.vehicle_image,
            created_at,
            updated_at,
        })
    }
}

/// A report as submitted by a camera device, before it has an id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub number_plate: String,
    #[serde(default)]
    pub original_number_plate: Option<String>,
    pub vehicle_type: String,
    pub device_name: String,
    /// Detection time; ingestion stamps the current time when absent.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(alias = "numberPlateImg")]
    pub number_plate_image: String,
    #[serde(alias = "vehicleImg")]
    pub vehicle_image: String,
}

impl NewReport {
    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            &self.number_plate,
            &self.vehicle_type,
            &self.device_name,
            &self.number_plate_image,
            &self.vehicle_image,
        ];
        if required.iter().any(|value| value.trim().is_empty()) {
            return Err(Error::Validation("All fields are mandatory!".to_string()));
        }
        if normalize_plate(&self.number_plate).is_empty() {
            return Err(Error::Validation(format!(
                "number plate '{}' has no alphanumeric characters",
                self.number_plate
            )));
        }
        Ok(())
    }

    /// Trim every field, normalize the plate and fill in the defaults.
    pub fn prepared(self, now: DateTime<Utc>) -> Result<NewReport, Error> {
        self.validate()?;
        let original = self
            .original_number_plate
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| self.number_plate.trim())
            .to_string();

        Ok(NewReport {
            number_plate: normalize_plate(&self.number_plate),
            original_number_plate: Some(original),
            vehicle_type: self.vehicle_type.trim().to_string(),
            device_name: self.device_name.trim().to_string(),
            date: Some(self.date.unwrap_or(now)),
            number_plate_image: self.number_plate_image.trim().to_string(),
            vehicle_image: self.vehicle_image.trim().to_string(),
        })
    }
}

/// Partial edit of a report. Absent or blank fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportUpdate {
    pub number_plate: Option<String>,
    pub vehicle_type: Option<String>,
    pub device_name: Option<String>,
    #[serde(alias = "numberPlateImg")]
    pub number_plate_image: Option<String>,
    #[serde(alias = "vehicleImg")]
    pub vehicle_image: Option<String>,
}

fn provided(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ReportUpdate {
    pub fn is_empty(&self) -> bool {
        provided(&self.number_plate).is_none()
            && provided(&self.vehicle_type).is_none()
            && provided(&self.device_name).is_none()
            && provided(&self.number_plate_image).is_none()
            && provided(&self.vehicle_image).is_none()
    }

    pub fn apply_to(&self, report: &mut Report, now: DateTime<Utc>) {
        if let Some(plate) = provided(&self.number_plate) {
            let normalized = normalize_plate(plate);
            if !normalized.is_empty() {
                report.number_plate = normalized;
                report.original_number_plate = plate.to_string();
            }
        }
        if let Some(vehicle_type) = provided(&self.vehicle_type) {
            report.vehicle_type = vehicle_type.to_string();
        }
        if let Some(device_name) = provided(&self.device_name) {
            report.device_name = device_name.to_string();
        }
        if let Some(image) = provided(&self.number_plate_image) {
            report.number_plate_image = image.to_string();
        }
        if let Some(image) = provided(&self.vehicle_image) {
            report.vehicle_image = image.to_string();
        }
        report.updated_at = now;
    }
}

/// Listing filter. `limit = None` returns everything after `offset`.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub day: Option<NaiveDate>,
    pub device_name: Option<String>,
    /// Substring match against the normalized plate.
    pub plate: Option<String>,
    pub offset: i64,
    pub limit: Option<i64>,
}

/// Uppercase ASCII alphanumerics only: `gj-01 ab 1234` becomes `GJ01AB1234`.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_report() -> Report {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        Report {
            id: 7,
            number_plate: "GJ01AB1234".to_string(),
            original_number_plate: "GJ 01 AB 1234".to_string(),
            vehicle_type: "4 Wheeler".to_string(),
            device_name: "Cam1".to_string(),
            date: at,
            number_plate_image: "/uploads/plate.png".to_string(),
            vehicle_image: "/uploads/vehicle.png".to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_normalize_plate() {
        assert_eq!(normalize_plate("gj-01 ab 1234"), "GJ01AB1234");
        assert_eq!(normalize_plate("  "), "");
        assert_eq!(normalize_plate("MH12\tDE1433"), "MH12DE1433");
    }

    #[test]
    fn test_new_report_requires_all_fields() {
        let report = NewReport {
            number_plate: "GJ01AB1234".to_string(),
            vehicle_type: "4 Wheeler".to_string(),
            device_name: " ".to_string(),
            number_plate_image: "a.png".to_string(),
            vehicle_image: "b.png".to_string(),
            ..NewReport::default()
        };
        assert!(matches!(report.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_prepared_fills_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let prepared = NewReport {
            number_plate: " gj 01 ab 1234 ".to_string(),
            vehicle_type: "4 Wheeler ".to_string(),
            device_name: "Cam1".to_string(),
            number_plate_image: "a.png".to_string(),
            vehicle_image: "b.png".to_string(),
            ..NewReport::default()
        }
        .prepared(now)
        .unwrap();

        assert_eq!(prepared.number_plate, "GJ01AB1234");
        assert_eq!(prepared.original_number_plate.as_deref(), Some("gj 01 ab 1234"));
        assert_eq!(prepared.vehicle_type, "4 Wheeler");
        assert_eq!(prepared.date, Some(now));
    }

    #[test]
    fn test_update_keeps_blank_fields() {
        let mut report = sample_report();
        let later = report.updated_at + chrono::Duration::minutes(5);
        let update = ReportUpdate {
            number_plate: Some("".to_string()),
            device_name: Some("Cam2".to_string()),
            ..ReportUpdate::default()
        };
        update.apply_to(&mut report, later);

        assert_eq!(report.number_plate, "GJ01AB1234");
        assert_eq!(report.device_name, "Cam2");
        assert_eq!(report.updated_at, later);
        assert_eq!(report.date, sample_report().date);
    }

    #[test]
    fn test_row_with_blank_plate_is_rejected() {
        let row = ReportRow {
            id: 3,
            number_plate: "".to_string(),
            original_number_plate: "".to_string(),
            vehicle_type: "Bike".to_string(),
            device_name: "Cam1".to_string(),
            event_at: 1_700_000_000_000,
            number_plate_image: "a.png".to_string(),
            vehicle_image: "b.png".to_string(),
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        };
        let err = Report::try_from(row).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { id: 3, .. }));
    }

    #[test]
    fn test_new_report_accepts_legacy_field_names() {
        let json = r#"{
            "numberPlate": "GJ01AB1234",
            "vehicleType": "4 Wheeler",
            "deviceName": "Cam1",
            "numberPlateImg": "/uploads/p.png",
            "vehicleImg": "/uploads/v.png"
        }"#;
        let report: NewReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.number_plate_image, "/uploads/p.png");
        assert_eq!(report.vehicle_image, "/uploads/v.png");
        assert!(report.date.is_none());
    }
}
