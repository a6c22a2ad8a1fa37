use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::{BillingError, Result};
use crate::models::{Grid, Metric};

// ── Layout constants ──────────────────────────────────────────────────────────

/// Column holding energy values in single-sheet reports.
pub const UNNAMED_1: &str = "Unnamed: 1";
/// Column holding currency values in single-sheet reports.
pub const UNNAMED_3: &str = "Unnamed: 3";
/// First-meter column of whole-workbook reports (peak power).
pub const METER_1_COLUMN: &str = "Meter: Meter 1 (อาคาร 1 และ อาคาร 2)";
/// Repeated first-meter column of whole-workbook reports (currency).
pub const METER_1_CURRENCY_COLUMN: &str = "Meter: Meter 1 (อาคาร 1 และ อาคาร 2).1";

pub const PEAK_ROW: usize = 32;
pub const OFF_PEAK_ROW: usize = 33;
pub const PEAK_POWER_ROW: usize = 36;
pub const ELECTRIC_COST_ROW: usize = 39;
pub const DISCOUNT_ROW: usize = 40;

// ── ProfileKind ───────────────────────────────────────────────────────────────

/// The built-in report layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    /// One selected sheet per workbook; energy in `Unnamed: 1`.
    SingleSheet,
    /// The workbook's first sheet; energy in `Unnamed: 3`.
    Workbook,
}

impl FromStr for ProfileKind {
    type Err = BillingError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "single-sheet" | "single" | "a" => Ok(ProfileKind::SingleSheet),
            "workbook" | "whole-workbook" | "b" => Ok(ProfileKind::Workbook),
            other => Err(BillingError::InvalidProfile(other.to_string())),
        }
    }
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::SingleSheet => "single-sheet",
            ProfileKind::Workbook => "workbook",
        }
    }

    pub fn profile(&self) -> ExtractionProfile {
        match self {
            ProfileKind::SingleSheet => ExtractionProfile::single_sheet(),
            ProfileKind::Workbook => ExtractionProfile::workbook(),
        }
    }
}

// ── ExtractionProfile ─────────────────────────────────────────────────────────

/// Which sheet of a workbook a profile reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SheetScope {
    /// The sheet the user selected, by name, in every workbook.
    Selected,
    /// Each workbook's first sheet, whatever its name.
    FirstSheet,
}

/// A (data row, column label) coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub column: String,
}

impl CellRef {
    pub fn new(row: usize, column: &str) -> Self {
        Self {
            row,
            column: column.to_string(),
        }
    }
}

/// Fixed cell coordinates for one report layout variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionProfile {
    pub name: String,
    pub sheet_scope: SheetScope,
    /// Columns whose absence rejects a report outright.
    pub required_columns: Vec<String>,
    /// Where each non-derived metric is read from.
    pub cells: BTreeMap<Metric, CellRef>,
}

impl ExtractionProfile {
    /// Profile A: single selected sheet, energy in `Unnamed: 1`, currency in
    /// `Unnamed: 3`.
    pub fn single_sheet() -> Self {
        let cells = BTreeMap::from([
            (Metric::PeakEnergy, CellRef::new(PEAK_ROW, UNNAMED_1)),
            (Metric::PeakCost, CellRef::new(PEAK_ROW, UNNAMED_3)),
            (Metric::OffPeakEnergy, CellRef::new(OFF_PEAK_ROW, UNNAMED_1)),
            (Metric::OffPeakCost, CellRef::new(OFF_PEAK_ROW, UNNAMED_3)),
            (Metric::PeakPower, CellRef::new(PEAK_POWER_ROW, UNNAMED_1)),
            (Metric::ElectricCost, CellRef::new(ELECTRIC_COST_ROW, UNNAMED_3)),
            (Metric::DiscountAmount, CellRef::new(DISCOUNT_ROW, UNNAMED_3)),
            (Metric::DiscountPercent, CellRef::new(DISCOUNT_ROW, UNNAMED_1)),
        ]);
        Self {
            name: ProfileKind::SingleSheet.as_str().to_string(),
            sheet_scope: SheetScope::Selected,
            required_columns: vec![UNNAMED_1.to_string(), UNNAMED_3.to_string()],
            cells,
        }
    }

    /// Profile B: whole workbook, energy in `Unnamed: 3`, currency in the
    /// repeated first-meter column, peak power in the first-meter column.
    pub fn workbook() -> Self {
        let cells = BTreeMap::from([
            (Metric::PeakEnergy, CellRef::new(PEAK_ROW, UNNAMED_3)),
            (Metric::PeakCost, CellRef::new(PEAK_ROW, METER_1_CURRENCY_COLUMN)),
            (Metric::OffPeakEnergy, CellRef::new(OFF_PEAK_ROW, UNNAMED_3)),
            (Metric::OffPeakCost, CellRef::new(OFF_PEAK_ROW, METER_1_CURRENCY_COLUMN)),
            (Metric::PeakPower, CellRef::new(PEAK_POWER_ROW, METER_1_COLUMN)),
            (Metric::ElectricCost, CellRef::new(ELECTRIC_COST_ROW, METER_1_CURRENCY_COLUMN)),
            (Metric::DiscountAmount, CellRef::new(DISCOUNT_ROW, METER_1_CURRENCY_COLUMN)),
            (Metric::DiscountPercent, CellRef::new(DISCOUNT_ROW, UNNAMED_3)),
        ]);
        Self {
            name: ProfileKind::Workbook.as_str().to_string(),
            sheet_scope: SheetScope::FirstSheet,
            required_columns: vec![
                UNNAMED_3.to_string(),
                METER_1_CURRENCY_COLUMN.to_string(),
            ],
            cells,
        }
    }

    /// Load a custom profile from a JSON file and check it is complete.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let profile: ExtractionProfile = serde_json::from_str(&content)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Every non-derived metric must have a coordinate.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = Metric::ALL
            .iter()
            .filter(|m| !m.is_derived() && !self.cells.contains_key(m))
            .map(|m| m.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BillingError::InvalidProfile(format!(
                "{}: no cell for {}",
                self.name,
                missing.join(", ")
            )))
        }
    }

    pub fn cell(&self, metric: Metric) -> Option<&CellRef> {
        self.cells.get(&metric)
    }

    /// Required columns absent from `grid`, in profile order.
    pub fn missing_columns(&self, grid: &Grid) -> Vec<String> {
        self.required_columns
            .iter()
            .filter(|c| !grid.has_column(c))
            .cloned()
            .collect()
    }
}

impl Default for ExtractionProfile {
    fn default() -> Self {
        Self::single_sheet()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
