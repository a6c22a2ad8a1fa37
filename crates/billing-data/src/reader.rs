//! Workbook discovery and loading.
//!
//! Finds spreadsheet files under the given inputs, opens them with
//! `calamine` and lays every sheet out as a [`Grid`]. A [`Report`] is the
//! one sheet of a workbook that the active extraction profile reads.

use std::path::{Path, PathBuf};

use billing_core::data_processors::DateExtractor;
use billing_core::error::{BillingError, RecordError, Result};
use billing_core::models::{CellValue, FileWarning, Grid};
use billing_core::profiles::{ExtractionProfile, SheetScope};
use billing_core::time_utils::natural_cmp;
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// File extensions `calamine` can open.
pub const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

// ── Discovery ─────────────────────────────────────────────────────────────────

fn is_workbook(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    // Office lock files (`~$report.xlsx`).
    if name.starts_with("~$") {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|w| w.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Find all workbook files recursively under `data_path`, sorted by path.
pub fn find_workbook_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Input path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_workbook(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Expand files and directories into a de-duplicated list of workbooks.
///
/// Files named explicitly are kept even when their extension is unusual;
/// directories are walked for known extensions.
pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else {
            files.extend(find_workbook_files(input));
        }
    }
    files.sort();
    files.dedup();

    if files.is_empty() {
        let shown = inputs.first().cloned().unwrap_or_else(|| PathBuf::from("."));
        return Err(BillingError::NoInputFiles(shown));
    }
    Ok(files)
}

// ── Workbook ──────────────────────────────────────────────────────────────────

/// One named sheet of a workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub grid: Grid,
}

/// A loaded workbook with every sheet in workbook order.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    /// Unique handle, the path the workbook was read from.
    pub source_id: String,
    /// Display label, the file name.
    pub label: String,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Open `path` and read its sheets.
    ///
    /// Only a workbook that cannot be opened at all is an error. A sheet
    /// that fails to read is left out and returned as a warning.
    pub fn open(path: &Path) -> Result<(Self, Vec<FileWarning>)> {
        let mut workbook = open_workbook_auto(path).map_err(|e| BillingError::WorkbookRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut ranges = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&name).map_err(|e| e.to_string());
            ranges.push((name, range));
        }
        Ok(Self::from_ranges(path, ranges))
    }

    /// Assemble a workbook from per-sheet read results, in workbook order.
    pub fn from_ranges(
        path: &Path,
        ranges: Vec<(String, std::result::Result<Range<Data>, String>)>,
    ) -> (Self, Vec<FileWarning>) {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut sheets = Vec::new();
        let mut warnings = Vec::new();
        for (name, range) in ranges {
            match range {
                Ok(range) => sheets.push(Sheet {
                    grid: Grid::from_rows(range_to_rows(&range)),
                    name,
                }),
                Err(message) => {
                    warn!("{} - {} will be excluded: {}", label, name, message);
                    warnings.push(FileWarning {
                        source: label.clone(),
                        sheet: Some(name),
                        error: RecordError::Unreadable(message),
                    });
                }
            }
        }

        debug!("Loaded {} ({} sheets)", label, sheets.len());
        let workbook = Self {
            source_id: path.display().to_string(),
            label,
            sheets,
        };
        (workbook, warnings)
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }
}

/// Open every path; unreadable workbooks become warnings.
///
/// Workbooks come back in natural label order.
pub fn load_workbooks(paths: &[PathBuf]) -> (Vec<Workbook>, Vec<FileWarning>) {
    let mut workbooks = Vec::new();
    let mut warnings = Vec::new();

    for path in paths {
        match Workbook::open(path) {
            Ok((wb, sheet_warnings)) => {
                workbooks.push(wb);
                warnings.extend(sheet_warnings);
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                let source = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                let message = match e {
                    BillingError::WorkbookRead { message, .. } => message,
                    other => other.to_string(),
                };
                warnings.push(FileWarning {
                    source,
                    sheet: None,
                    error: RecordError::Unreadable(message),
                });
            }
        }
    }

    workbooks.sort_by(|a, b| {
        natural_cmp(&a.label, &b.label).then_with(|| a.source_id.cmp(&b.source_id))
    });
    (workbooks, warnings)
}

// ── Cell conversion ───────────────────────────────────────────────────────────

pub fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        other => CellValue::Other(other.to_string()),
    }
}

/// Lay a `calamine` range out from sheet cell A1.
///
/// `calamine` trims leading empty rows and columns, so the range is padded
/// back to absolute positions; row 0 of the result is always sheet row 1.
pub fn range_to_rows(range: &Range<Data>) -> Vec<Vec<CellValue>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let (start_row, start_col) = (start_row as usize, start_col as usize);

    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); start_row];
    for cells in range.rows() {
        let mut row = vec![CellValue::Empty; start_col];
        row.extend(cells.iter().map(cell_from_data));
        rows.push(row);
    }
    rows
}

// ── Report ────────────────────────────────────────────────────────────────────

/// The sheet of one workbook that feeds the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub source_id: String,
    pub label: String,
    pub sheet_name: String,
    /// `None` when the header has no valid `YYYY-MM-DD` date.
    pub report_date: Option<NaiveDate>,
    pub grid: Grid,
}

impl Report {
    pub fn from_sheet(workbook: &Workbook, sheet: &Sheet) -> Self {
        let report_date = sheet.grid.header_text().and_then(DateExtractor::extract);
        if report_date.is_none() {
            debug!("{} - {}: no report date in header", workbook.label, sheet.name);
        }
        Self {
            source_id: workbook.source_id.clone(),
            label: workbook.label.clone(),
            sheet_name: sheet.name.clone(),
            report_date,
            grid: sheet.grid.clone(),
        }
    }

    /// The report date, or [`RecordError::DateNotFound`] for an undated header.
    pub fn date(&self) -> std::result::Result<NaiveDate, RecordError> {
        self.report_date.ok_or(RecordError::DateNotFound)
    }

    /// Pick the sheet `profile` reads from `workbook`.
    pub fn from_workbook(
        workbook: &Workbook,
        profile: &ExtractionProfile,
        selected_sheet: &str,
    ) -> std::result::Result<Self, RecordError> {
        let sheet = match profile.sheet_scope {
            SheetScope::Selected => workbook
                .sheet(selected_sheet)
                .ok_or_else(|| RecordError::SheetNotFound(selected_sheet.to_string()))?,
            SheetScope::FirstSheet => workbook
                .first_sheet()
                .ok_or_else(|| RecordError::SheetNotFound("(first sheet)".to_string()))?,
        };
        Ok(Self::from_sheet(workbook, sheet))
    }

    /// Build one report per workbook; workbooks without the sheet become
    /// warnings.
    pub fn collect(
        workbooks: &[Workbook],
        profile: &ExtractionProfile,
        selected_sheet: &str,
    ) -> (Vec<Report>, Vec<FileWarning>) {
        let mut reports = Vec::with_capacity(workbooks.len());
        let mut warnings = Vec::new();
        for wb in workbooks {
            match Report::from_workbook(wb, profile, selected_sheet) {
                Ok(report) => reports.push(report),
                Err(error) => {
                    warn!("{} will be excluded: {}", wb.label, error);
                    warnings.push(FileWarning {
                        source: wb.label.clone(),
                        sheet: None,
                        error,
                    });
                }
            }
        }
        (reports, warnings)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::profiles::ExtractionProfile;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn workbook(label: &str, sheets: Vec<(&str, Vec<Vec<CellValue>>)>) -> Workbook {
        Workbook {
            source_id: format!("/reports/{}", label),
            label: label.to_string(),
            sheets: sheets
                .into_iter()
                .map(|(name, rows)| Sheet {
                    name: name.to_string(),
                    grid: Grid::from_rows(rows),
                })
                .collect(),
        }
    }

    // ── find_workbook_files ───────────────────────────────────────────────────

    #[test]
    fn test_find_workbook_files_filters_extensions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "jan.xlsx");
        touch(dir.path(), "feb.XLS");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "~$jan.xlsx");

        let files = find_workbook_files(dir.path());
        let names: Vec<&str> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["feb.XLS", "jan.xlsx"]);
    }

    #[test]
    fn test_find_workbook_files_recursive() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("2024");
        std::fs::create_dir_all(&sub).unwrap();
        touch(dir.path(), "a.ods");
        touch(&sub, "b.xlsm");
        assert_eq!(find_workbook_files(dir.path()).len(), 2);
    }

    #[test]
    fn test_find_workbook_files_nonexistent_path() {
        assert!(find_workbook_files(Path::new("/tmp/does-not-exist-billing-xyz")).is_empty());
    }

    // ── collect_inputs ────────────────────────────────────────────────────────

    #[test]
    fn test_collect_inputs_mixes_files_and_dirs() {
        let dir = TempDir::new().unwrap();
        let explicit = touch(dir.path(), "export.bin");
        let sub = dir.path().join("reports");
        std::fs::create_dir_all(&sub).unwrap();
        let nested = touch(&sub, "mar.xlsx");

        let files = collect_inputs(&[explicit.clone(), sub.clone(), nested.clone()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains(&explicit));
        assert!(files.contains(&nested));
    }

    #[test]
    fn test_collect_inputs_empty_is_error() {
        let dir = TempDir::new().unwrap();
        let err = collect_inputs(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, BillingError::NoInputFiles(_)));
    }

    // ── load_workbooks ────────────────────────────────────────────────────────

    #[test]
    fn test_load_workbooks_unreadable_becomes_warning() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("broken.xlsx");
        std::fs::write(&bogus, b"this is not a zip archive").unwrap();

        let (workbooks, warnings) = load_workbooks(&[bogus]);
        assert!(workbooks.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].source, "broken.xlsx");
        assert!(matches!(warnings[0].error, RecordError::Unreadable(_)));
    }

    // ── Workbook::from_ranges ─────────────────────────────────────────────────

    #[test]
    fn test_from_ranges_keeps_readable_sheets() {
        let mut meter: Range<Data> = Range::new((0, 0), (0, 0));
        meter.set_value((0, 0), Data::String("Meter report 2024-01-31".to_string()));
        let ranges = vec![
            ("Summary".to_string(), Err("corrupt sheet xml".to_string())),
            ("Meter 1".to_string(), Ok(meter)),
        ];

        let (wb, warnings) = Workbook::from_ranges(Path::new("/reports/jan.xlsx"), ranges);
        assert_eq!(wb.label, "jan.xlsx");
        assert_eq!(wb.sheets.len(), 1);
        assert_eq!(wb.sheets[0].name, "Meter 1");
        assert!(wb.sheet("Summary").is_none());

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].source, "jan.xlsx");
        assert_eq!(warnings[0].sheet.as_deref(), Some("Summary"));
        assert_eq!(
            warnings[0].error,
            RecordError::Unreadable("corrupt sheet xml".to_string())
        );
    }

    // ── range_to_rows ─────────────────────────────────────────────────────────

    #[test]
    fn test_range_to_rows_pads_to_absolute_positions() {
        let mut range: Range<Data> = Range::new((1, 1), (2, 2));
        range.set_value((1, 1), Data::String("Report 2024-01-31".to_string()));
        range.set_value((2, 2), Data::Float(12.5));

        let rows = range_to_rows(&range);
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_empty());
        assert_eq!(rows[1][0], CellValue::Empty);
        assert_eq!(rows[1][1], text("Report 2024-01-31"));
        assert_eq!(rows[2][2], CellValue::Float(12.5));
    }

    #[test]
    fn test_range_to_rows_empty_range() {
        let range: Range<Data> = Range::empty();
        assert!(range_to_rows(&range).is_empty());
    }

    #[test]
    fn test_cell_from_data_variants() {
        assert_eq!(cell_from_data(&Data::Int(3)), CellValue::Int(3));
        assert_eq!(cell_from_data(&Data::Bool(true)), CellValue::Bool(true));
        assert_eq!(cell_from_data(&Data::Empty), CellValue::Empty);
        assert!(matches!(
            cell_from_data(&Data::DateTimeIso("2024-01-01T00:00:00".to_string())),
            CellValue::Other(_)
        ));
    }

    // ── Report ────────────────────────────────────────────────────────────────

    #[test]
    fn test_report_from_workbook_selected_sheet() {
        let wb = workbook(
            "jan.xlsx",
            vec![
                ("Cover", vec![vec![text("cover")]]),
                ("Summary", vec![vec![text("Billing 2024-01-31")]]),
            ],
        );
        let report =
            Report::from_workbook(&wb, &ExtractionProfile::single_sheet(), "Summary").unwrap();
        assert_eq!(report.sheet_name, "Summary");
        assert_eq!(report.report_date, NaiveDate::from_ymd_opt(2024, 1, 31));
    }

    #[test]
    fn test_report_from_workbook_first_sheet_scope_ignores_selection() {
        let wb = workbook(
            "jan.xlsx",
            vec![
                ("Overview", vec![vec![text("2024-02-29")]]),
                ("Summary", vec![vec![text("2024-01-31")]]),
            ],
        );
        let report = Report::from_workbook(&wb, &ExtractionProfile::workbook(), "Summary").unwrap();
        assert_eq!(report.sheet_name, "Overview");
        assert_eq!(report.report_date, NaiveDate::from_ymd_opt(2024, 2, 29));
    }

    #[test]
    fn test_report_collect_missing_sheet_warns() {
        let workbooks = vec![
            workbook("a.xlsx", vec![("Summary", vec![vec![text("2024-01-31")]])]),
            workbook("b.xlsx", vec![("Other", vec![vec![text("2024-02-29")]])]),
        ];
        let (reports, warnings) =
            Report::collect(&workbooks, &ExtractionProfile::single_sheet(), "Summary");
        assert_eq!(reports.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].source, "b.xlsx");
        assert_eq!(warnings[0].error, RecordError::SheetNotFound("Summary".to_string()));
    }

    #[test]
    fn test_report_without_date() {
        let wb = workbook("x.xlsx", vec![("S", vec![vec![text("Monthly report")]])]);
        let report = Report::from_workbook(&wb, &ExtractionProfile::single_sheet(), "S").unwrap();
        assert!(report.report_date.is_none());
        assert_eq!(report.date(), Err(RecordError::DateNotFound));
    }

    #[test]
    fn test_report_date_from_header() {
        let wb = workbook("x.xlsx", vec![("S", vec![vec![text("Report 2024-03-31")]])]);
        let report = Report::from_workbook(&wb, &ExtractionProfile::single_sheet(), "S").unwrap();
        assert_eq!(report.date(), Ok(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()));
    }
}
