use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::Metric;

/// Why a single report (or a single meter sheet) was left out of a batch.
///
/// These never abort a batch. The aggregators record them as warnings next
/// to the file they came from and move on to the next report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// The sheet lacks one or more columns the extraction profile requires.
    #[error("The file does not have the required format. Missing columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    /// The header cell has no `YYYY-MM-DD` substring.
    #[error("No report date found in header")]
    DateNotFound,

    /// A cell was read but its value is not numeric.
    #[error("{field}: expected a number, found {found}")]
    FieldType { field: Metric, found: String },

    /// The cell coordinate lies outside the sheet.
    #[error("{field}: missing cell at row {row}, column '{column}'")]
    MissingCell {
        field: Metric,
        row: usize,
        column: String,
    },

    /// The extraction profile has no coordinate for the field.
    #[error("{0}: no cell configured in the extraction profile")]
    Unmapped(Metric),

    /// The workbook has no sheet with the selected name.
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// The workbook could not be opened or parsed.
    #[error("Could not read workbook: {0}")]
    Unreadable(String),

    /// Another report with the same billing date was already kept.
    #[error("Duplicate report date {0}; only the first report was kept")]
    DuplicateDate(NaiveDate),

    /// Nothing usable was left for a view after filtering.
    #[error("No data available for the selected period")]
    NoData,
}

impl RecordError {
    /// The field a field-level error refers to, if any.
    pub fn field(&self) -> Option<Metric> {
        match self {
            RecordError::FieldType { field, .. } | RecordError::MissingCell { field, .. } => {
                Some(*field)
            }
            RecordError::Unmapped(field) => Some(*field),
            _ => None,
        }
    }
}

/// All process-level errors produced by the billing dashboard.
#[derive(Error, Debug)]
pub enum BillingError {
    /// A workbook could not be opened or one of its sheets could not be read.
    #[error("Failed to read workbook {path}: {message}")]
    WorkbookRead { path: PathBuf, message: String },

    /// A year/month bound could not be parsed or the range is inverted.
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    /// An extraction profile name or profile file was not understood.
    #[error("Invalid extraction profile: {0}")]
    InvalidProfile(String),

    /// No workbooks were found under the given inputs.
    #[error("No workbook files found in {0}")]
    NoInputFiles(PathBuf),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A per-report failure surfaced where a single report was requested.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the billing crates.
pub type Result<T> = std::result::Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_schema() {
        let err = RecordError::Schema {
            missing: vec!["Unnamed: 1".to_string(), "Unnamed: 3".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "The file does not have the required format. Missing columns: Unnamed: 1, Unnamed: 3"
        );
    }

    #[test]
    fn test_error_display_field_type() {
        let err = RecordError::FieldType {
            field: Metric::PeakEnergy,
            found: "text \"abc\"".to_string(),
        };
        assert_eq!(err.to_string(), "Peak: expected a number, found text \"abc\"");
        assert_eq!(err.field(), Some(Metric::PeakEnergy));
    }

    #[test]
    fn test_error_display_missing_cell() {
        let err = RecordError::MissingCell {
            field: Metric::DiscountAmount,
            row: 40,
            column: "Unnamed: 3".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Discount"));
        assert!(msg.contains("row 40"));
        assert!(msg.contains("'Unnamed: 3'"));
    }

    #[test]
    fn test_error_field_none_for_report_level() {
        assert_eq!(RecordError::DateNotFound.field(), None);
        assert_eq!(RecordError::NoData.field(), None);
    }

    #[test]
    fn test_error_display_duplicate_date() {
        let err = RecordError::DuplicateDate(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(
            err.to_string(),
            "Duplicate report date 2024-03-15; only the first report was kept"
        );
        assert_eq!(RecordError::Unmapped(Metric::PeakPower).field(), Some(Metric::PeakPower));
    }

    #[test]
    fn test_error_display_workbook_read() {
        let err = BillingError::WorkbookRead {
            path: PathBuf::from("/reports/2024-01.xlsx"),
            message: "invalid zip header".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read workbook"));
        assert!(msg.contains("/reports/2024-01.xlsx"));
        assert!(msg.contains("invalid zip header"));
    }

    #[test]
    fn test_error_display_invalid_range() {
        let err = BillingError::InvalidRange("2024-13".to_string());
        assert_eq!(err.to_string(), "Invalid date range: 2024-13");
    }

    #[test]
    fn test_error_from_record() {
        let err: BillingError = RecordError::NoData.into();
        assert_eq!(err.to_string(), "No data available for the selected period");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: BillingError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: BillingError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
