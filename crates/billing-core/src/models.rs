use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{BillingError, RecordError, Result};
use crate::time_utils::YearMonth;

// ── CellValue ─────────────────────────────────────────────────────────────────

/// A raw spreadsheet cell, as loaded from a workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    #[default]
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    /// Dates, durations and error cells, kept in their display form.
    Other(String),
}

impl CellValue {
    /// Short description used in field-level warnings.
    pub fn describe(&self) -> String {
        match self {
            CellValue::Empty => "an empty cell".to_string(),
            CellValue::Int(i) => format!("integer {}", i),
            CellValue::Float(f) => format!("number {}", f),
            CellValue::Text(s) => format!("text {:?}", s),
            CellValue::Bool(b) => format!("boolean {}", b),
            CellValue::Other(s) => format!("value {:?}", s),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) | CellValue::Other(s) => f.write_str(s),
            CellValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

// ── Grid ──────────────────────────────────────────────────────────────────────

/// One sheet laid out as a labelled table.
///
/// The first sheet row becomes the column labels and every following row is
/// a data row, so data row `r` is sheet row `r + 1`. Header cells that are
/// empty are labelled `Unnamed: <index>` and repeated labels get a `.1`,
/// `.2`, … suffix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grid {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    header_text: Option<String>,
}

impl Grid {
    /// Build a grid from raw sheet rows, row 0 being the header row.
    pub fn from_rows(mut raw: Vec<Vec<CellValue>>) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        let header = raw.remove(0);
        let width = raw
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);

        let header_text = header.first().filter(|c| !c.is_empty()).map(|c| c.to_string());

        let mut seen: HashSet<String> = HashSet::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut columns = Vec::with_capacity(width);
        for idx in 0..width {
            let base = match header.get(idx) {
                Some(cell) if !cell.is_empty() => cell.to_string(),
                _ => format!("Unnamed: {}", idx),
            };
            let mut label = base.clone();
            if seen.contains(&label) {
                let count = counts.entry(base.clone()).or_insert(0);
                loop {
                    *count += 1;
                    label = format!("{}.{}", base, count);
                    if !seen.contains(&label) {
                        break;
                    }
                }
            }
            seen.insert(label.clone());
            columns.push(label);
        }

        Self {
            columns,
            rows: raw,
            header_text,
        }
    }

    /// Column labels in sheet order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, label: &str) -> bool {
        self.columns.iter().any(|c| c == label)
    }

    /// Number of data rows (header excluded).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Text of the top-left cell of the sheet (sheet row 0, column A).
    pub fn header_text(&self) -> Option<&str> {
        self.header_text.as_deref()
    }

    /// Look up a data cell by row index and column label.
    ///
    /// Returns `None` when the column is unknown or the row lies past the end
    /// of the sheet. Cells inside the sheet but past a short row read as
    /// empty.
    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let col = self.columns.iter().position(|c| c == column)?;
        let cells = self.rows.get(row)?;
        Some(cells.get(col).unwrap_or(&EMPTY_CELL))
    }
}

// ── Metric ────────────────────────────────────────────────────────────────────

/// Every quantity extracted from, or derived for, a billing report.
///
/// The declaration order is the validation order: peak, off-peak, total
/// energy, peak power, electric cost, discount, net cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PeakEnergy,
    PeakCost,
    OffPeakEnergy,
    OffPeakCost,
    TotalEnergy,
    PeakPower,
    ElectricCost,
    DiscountAmount,
    DiscountPercent,
    NetElectricCost,
}

impl Metric {
    /// All metrics in validation order.
    pub const ALL: [Metric; 10] = [
        Metric::PeakEnergy,
        Metric::PeakCost,
        Metric::OffPeakEnergy,
        Metric::OffPeakCost,
        Metric::TotalEnergy,
        Metric::PeakPower,
        Metric::ElectricCost,
        Metric::DiscountAmount,
        Metric::DiscountPercent,
        Metric::NetElectricCost,
    ];

    /// Stable snake_case key, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::PeakEnergy => "peak_energy",
            Metric::PeakCost => "peak_cost",
            Metric::OffPeakEnergy => "off_peak_energy",
            Metric::OffPeakCost => "off_peak_cost",
            Metric::TotalEnergy => "total_energy",
            Metric::PeakPower => "peak_power",
            Metric::ElectricCost => "electric_cost",
            Metric::DiscountAmount => "discount_amount",
            Metric::DiscountPercent => "discount_percent",
            Metric::NetElectricCost => "net_electric_cost",
        }
    }

    /// Human-readable label used in warnings and chart titles.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::PeakEnergy => "Peak",
            Metric::PeakCost => "Peak (Baht)",
            Metric::OffPeakEnergy => "Off-Peak",
            Metric::OffPeakCost => "Off-Peak (Baht)",
            Metric::TotalEnergy => "Power",
            Metric::PeakPower => "Peak Power",
            Metric::ElectricCost => "Total Electric Cost",
            Metric::DiscountAmount => "Discount",
            Metric::DiscountPercent => "Discount Percentage",
            Metric::NetElectricCost => "Net Electric Cost",
        }
    }

    /// Display unit of the metric.
    pub fn unit(&self) -> &'static str {
        match self {
            Metric::PeakEnergy | Metric::OffPeakEnergy | Metric::TotalEnergy => "kWh",
            Metric::PeakPower => "kW",
            Metric::DiscountPercent => "%",
            Metric::PeakCost
            | Metric::OffPeakCost
            | Metric::ElectricCost
            | Metric::DiscountAmount
            | Metric::NetElectricCost => "Baht",
        }
    }

    /// Derived metrics are computed from validated inputs, never read.
    pub fn is_derived(&self) -> bool {
        matches!(self, Metric::TotalEnergy | Metric::NetElectricCost)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── EnergyRecord ──────────────────────────────────────────────────────────────

/// The validated facts of one billing report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyRecord {
    /// Peak energy (kWh).
    pub peak_energy: f64,
    /// Peak energy charge (Baht).
    pub peak_cost: f64,
    /// Off-peak energy (kWh).
    pub off_peak_energy: f64,
    /// Off-peak energy charge (Baht).
    pub off_peak_cost: f64,
    /// `peak_energy + off_peak_energy`.
    pub total_energy: f64,
    /// Peak demand (kW).
    pub peak_power: f64,
    /// Electric cost before discount (Baht).
    pub electric_cost: f64,
    /// Discount (Baht).
    pub discount_amount: f64,
    /// Discount as a 0–100 percentage.
    pub discount_percent: f64,
    /// `electric_cost - discount_amount`.
    pub net_electric_cost: f64,
}

impl EnergyRecord {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::PeakEnergy => self.peak_energy,
            Metric::PeakCost => self.peak_cost,
            Metric::OffPeakEnergy => self.off_peak_energy,
            Metric::OffPeakCost => self.off_peak_cost,
            Metric::TotalEnergy => self.total_energy,
            Metric::PeakPower => self.peak_power,
            Metric::ElectricCost => self.electric_cost,
            Metric::DiscountAmount => self.discount_amount,
            Metric::DiscountPercent => self.discount_percent,
            Metric::NetElectricCost => self.net_electric_cost,
        }
    }
}

// ── DateRange ─────────────────────────────────────────────────────────────────

/// Inclusive calendar range; the end is always the last day of its month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, moving `end` to the last day of its month.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let end = YearMonth::of(end).last_day();
        if end < start {
            return Err(BillingError::InvalidRange(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// First day of `start` through last day of `end`.
    pub fn from_months(start: YearMonth, end: YearMonth) -> Result<Self> {
        Self::new(start.first_day(), end.last_day())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn start_month(&self) -> YearMonth {
        YearMonth::of(self.start)
    }

    pub fn end_month(&self) -> YearMonth {
        YearMonth::of(self.end)
    }

    /// Every calendar month touched by the range, in order.
    pub fn months(&self) -> Vec<YearMonth> {
        YearMonth::span(self.start_month(), self.end_month())
    }
}

// ── Batch policies ────────────────────────────────────────────────────────────

/// What to do when several reports carry the same billing date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Flag the date and keep every report.
    #[default]
    WarnAndInclude,
    /// Flag the date and keep only the first report in processing order.
    KeepFirst,
}

impl FromStr for DuplicatePolicy {
    type Err = BillingError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "warn" | "warn-and-include" => Ok(DuplicatePolicy::WarnAndInclude),
            "keep-first" => Ok(DuplicatePolicy::KeepFirst),
            other => Err(BillingError::Config(format!(
                "unknown duplicate policy '{}'",
                other
            ))),
        }
    }
}

/// How much of each meter sheet is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeterMode {
    /// Peak and off-peak energy only.
    #[default]
    Energy,
    /// Energy plus electric cost and discount.
    Full,
}

impl MeterMode {
    /// Metrics read from every meter sheet, in validation order.
    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            MeterMode::Energy => &[Metric::PeakEnergy, Metric::OffPeakEnergy],
            MeterMode::Full => &[
                Metric::PeakEnergy,
                Metric::OffPeakEnergy,
                Metric::ElectricCost,
                Metric::DiscountAmount,
                Metric::DiscountPercent,
            ],
        }
    }
}

impl FromStr for MeterMode {
    type Err = BillingError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "energy" => Ok(MeterMode::Energy),
            "full" => Ok(MeterMode::Full),
            other => Err(BillingError::Config(format!("unknown meter mode '{}'", other))),
        }
    }
}

// ── Series and warnings ───────────────────────────────────────────────────────

/// One point of a per-report series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Display label of the report the value came from.
    pub label: String,
    pub value: f64,
    pub date: NaiveDate,
}

/// A report (or meter sheet) left out of a batch, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct FileWarning {
    /// Display label of the workbook.
    pub source: String,
    /// Sheet the failure was found on, when it is sheet-specific.
    pub sheet: Option<String>,
    pub error: RecordError,
}

impl fmt::Display for FileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(f, "{} - {}: {}", self.source, sheet, self.error),
            None => write!(f, "{}: {}", self.source, self.error),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    // ── Grid ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_grid_unnamed_columns() {
        let grid = Grid::from_rows(vec![
            vec![text("Report 2024-01-31"), CellValue::Empty, CellValue::Empty, CellValue::Empty],
            vec![CellValue::Empty, CellValue::Float(1.0), CellValue::Empty, CellValue::Float(2.0)],
        ]);
        assert_eq!(
            grid.columns(),
            &["Report 2024-01-31", "Unnamed: 1", "Unnamed: 2", "Unnamed: 3"]
        );
        assert_eq!(grid.cell(0, "Unnamed: 1"), Some(&CellValue::Float(1.0)));
        assert_eq!(grid.cell(0, "Unnamed: 3"), Some(&CellValue::Float(2.0)));
    }

    #[test]
    fn test_grid_duplicate_labels_suffixed() {
        let meter = "Meter: Meter 1 (อาคาร 1 และ อาคาร 2)";
        let grid = Grid::from_rows(vec![vec![
            text("header"),
            text(meter),
            CellValue::Empty,
            text(meter),
            text(meter),
        ]]);
        assert_eq!(grid.columns()[1], meter);
        assert_eq!(grid.columns()[2], "Unnamed: 2");
        assert_eq!(grid.columns()[3], format!("{}.1", meter));
        assert_eq!(grid.columns()[4], format!("{}.2", meter));
    }

    #[test]
    fn test_grid_width_from_widest_row() {
        let grid = Grid::from_rows(vec![
            vec![text("h")],
            vec![CellValue::Empty, CellValue::Empty, CellValue::Int(7)],
        ]);
        assert_eq!(grid.columns().len(), 3);
        assert_eq!(grid.cell(0, "Unnamed: 2"), Some(&CellValue::Int(7)));
    }

    #[test]
    fn test_grid_short_row_reads_empty() {
        let grid = Grid::from_rows(vec![
            vec![text("h"), CellValue::Empty, CellValue::Empty],
            vec![CellValue::Int(1)],
        ]);
        assert_eq!(grid.cell(0, "Unnamed: 2"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_grid_out_of_range_is_none() {
        let grid = Grid::from_rows(vec![vec![text("h"), CellValue::Empty]]);
        assert_eq!(grid.cell(0, "Unnamed: 1"), None);
        assert_eq!(grid.cell(0, "Nope"), None);
    }

    #[test]
    fn test_grid_header_text() {
        let grid = Grid::from_rows(vec![vec![text("Billing period 2024-03-15")]]);
        assert_eq!(grid.header_text(), Some("Billing period 2024-03-15"));
        assert_eq!(grid.row_count(), 0);
    }

    #[test]
    fn test_grid_empty() {
        let grid = Grid::from_rows(vec![]);
        assert!(grid.columns().is_empty());
        assert!(grid.header_text().is_none());
    }

    // ── Metric ────────────────────────────────────────────────────────────────

    #[test]
    fn test_metric_order_matches_validation_order() {
        let mut sorted = Metric::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Metric::ALL.to_vec());
    }

    #[test]
    fn test_metric_units() {
        assert_eq!(Metric::PeakEnergy.unit(), "kWh");
        assert_eq!(Metric::PeakPower.unit(), "kW");
        assert_eq!(Metric::NetElectricCost.unit(), "Baht");
        assert_eq!(Metric::DiscountPercent.unit(), "%");
    }

    #[test]
    fn test_metric_serde_key_matches_as_str() {
        for metric in Metric::ALL {
            let json = serde_json::to_string(&metric).unwrap();
            assert_eq!(json, format!("\"{}\"", metric.as_str()));
        }
    }

    // ── DateRange ─────────────────────────────────────────────────────────────

    #[test]
    fn test_date_range_end_normalised_to_month_end() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        )
        .unwrap();
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(range.contains(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
    }

    #[test]
    fn test_date_range_from_months() {
        let range =
            DateRange::from_months(YearMonth::new(2023, 11).unwrap(), YearMonth::new(2024, 2).unwrap())
                .unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2023, 11, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(range.months().len(), 4);
    }

    #[test]
    fn test_date_range_inverted_rejected() {
        let result =
            DateRange::from_months(YearMonth::new(2024, 5).unwrap(), YearMonth::new(2024, 4).unwrap());
        assert!(matches!(result, Err(BillingError::InvalidRange(_))));
    }

    // ── Batch policies ────────────────────────────────────────────────────────

    #[test]
    fn test_duplicate_policy_parse() {
        assert_eq!("warn".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::WarnAndInclude);
        assert_eq!("keep-first".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::KeepFirst);
        assert!("drop".parse::<DuplicatePolicy>().is_err());
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::WarnAndInclude);
    }

    #[test]
    fn test_meter_mode_metrics() {
        assert_eq!(
            MeterMode::Energy.metrics(),
            &[Metric::PeakEnergy, Metric::OffPeakEnergy]
        );
        assert_eq!(MeterMode::Full.metrics().len(), 5);
        assert_eq!("full".parse::<MeterMode>().unwrap(), MeterMode::Full);
    }

    // ── FileWarning ───────────────────────────────────────────────────────────

    #[test]
    fn test_file_warning_display_with_sheet() {
        let warning = FileWarning {
            source: "jan.xlsx".to_string(),
            sheet: Some("Meter 2".to_string()),
            error: RecordError::DateNotFound,
        };
        assert_eq!(warning.to_string(), "jan.xlsx - Meter 2: No report date found in header");
    }
}
