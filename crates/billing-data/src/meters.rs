//! Per-meter totals for workbooks with one sheet per metering point.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use billing_core::calculations::GuaranteeProgress;
use billing_core::error::RecordError;
use billing_core::models::{FileWarning, Grid, MeterMode, Metric};
use billing_core::profiles::ExtractionProfile;
use billing_core::time_utils::natural_cmp;
use regex::Regex;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::parser::{Coercion, RecordParser};
use crate::reader::Workbook;

/// Label of the synthetic grand total.
pub const ALL_METERS: &str = "All Meters";

// ── MeterId ───────────────────────────────────────────────────────────────────

fn meter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Meter\s?\d+").expect("regex is valid"))
}

/// A metering point key such as `"Meter 3"`, ordered naturally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeterId(String);

impl MeterId {
    /// The first `Meter<optional space><digits>` match in a sheet name.
    pub fn from_sheet_name(sheet_name: &str) -> Option<Self> {
        meter_pattern()
            .find(sheet_name)
            .map(|m| MeterId(m.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for MeterId {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0)
    }
}

impl PartialOrd for MeterId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for MeterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// ── MeterState ────────────────────────────────────────────────────────────────

/// Running totals for one meter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeterState {
    pub totals: BTreeMap<Metric, f64>,
    /// `"<workbook> - <sheet>"` of every sheet that contributed.
    pub sources: Vec<String>,
}

impl MeterState {
    pub fn total(&self, metric: Metric) -> f64 {
        self.totals.get(&metric).copied().unwrap_or(0.0)
    }

    pub fn total_energy(&self) -> f64 {
        self.total(Metric::TotalEnergy)
    }

    fn add(&mut self, values: &BTreeMap<Metric, f64>) {
        for (metric, value) in values {
            *self.totals.entry(*metric).or_insert(0.0) += value;
        }
    }
}

/// Totals per meter plus the grand total across meters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeterSummary {
    pub meters: BTreeMap<MeterId, MeterState>,
    /// Field-wise sum over `meters`.
    pub all_meters: MeterState,
    #[serde(skip)]
    pub warnings: Vec<FileWarning>,
}

impl MeterSummary {
    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// Guarantee progress per meter, for meters with a positive threshold.
    /// Meters without one map to `None`.
    pub fn guarantees<F>(&self, threshold_for: F) -> Vec<(&MeterId, Option<GuaranteeProgress>)>
    where
        F: Fn(&str) -> Option<f64>,
    {
        self.meters
            .iter()
            .map(|(id, state)| {
                let progress = threshold_for(id.as_str())
                    .and_then(|g| GuaranteeProgress::evaluate(state.total_energy(), g));
                (id, progress)
            })
            .collect()
    }
}

// ── MeterAggregator ───────────────────────────────────────────────────────────

/// Sums meter sheets across workbooks.
pub struct MeterAggregator<'a> {
    profile: &'a ExtractionProfile,
    mode: MeterMode,
}

impl<'a> MeterAggregator<'a> {
    pub fn new(profile: &'a ExtractionProfile, mode: MeterMode) -> Self {
        Self { profile, mode }
    }

    /// Read every sheet whose name matches a meter id, in every workbook.
    ///
    /// No date filtering is applied. A sheet that fails is excluded on its
    /// own; the workbook's other meters still count.
    pub fn aggregate_by_meter(&self, workbooks: &[Workbook]) -> MeterSummary {
        let mut ordered: Vec<&Workbook> = workbooks.iter().collect();
        ordered.sort_by(|a, b| {
            natural_cmp(&a.label, &b.label).then_with(|| a.source_id.cmp(&b.source_id))
        });

        let mut summary = MeterSummary::default();
        for wb in ordered {
            for sheet in &wb.sheets {
                let Some(meter) = MeterId::from_sheet_name(&sheet.name) else {
                    continue;
                };
                match self.read_sheet(&sheet.grid) {
                    Ok(values) => {
                        debug!("{} - {}: counted for {}", wb.label, sheet.name, meter);
                        let state = summary.meters.entry(meter).or_default();
                        state.add(&values);
                        state.sources.push(format!("{} - {}", wb.label, sheet.name));
                    }
                    Err(error) => {
                        warn!("{} - {} will be excluded: {}", wb.label, sheet.name, error);
                        summary.warnings.push(FileWarning {
                            source: wb.label.clone(),
                            sheet: Some(sheet.name.clone()),
                            error,
                        });
                    }
                }
            }
        }

        for state in summary.meters.values() {
            summary.all_meters.add(&state.totals);
            summary.all_meters.sources.extend(state.sources.iter().cloned());
        }

        info!(
            "Aggregated {} meters ({} sheets skipped)",
            summary.meters.len(),
            summary.warnings.len()
        );
        summary
    }

    /// Values of one meter sheet, derived totals included. All of them or
    /// none.
    fn read_sheet(&self, grid: &Grid) -> Result<BTreeMap<Metric, f64>, RecordError> {
        let metrics = self.mode.metrics();
        let raw = RecordParser::read_fields(grid, self.profile, metrics, Coercion::Strict);

        let mut values = BTreeMap::new();
        for &metric in metrics {
            values.insert(metric, raw.numeric(metric)?);
        }

        let total = raw.numeric(Metric::PeakEnergy)? + raw.numeric(Metric::OffPeakEnergy)?;
        values.insert(Metric::TotalEnergy, total);

        if self.mode == MeterMode::Full {
            values.insert(
                Metric::DiscountPercent,
                raw.numeric(Metric::DiscountPercent)? * 100.0,
            );
            let net = raw.numeric(Metric::ElectricCost)? - raw.numeric(Metric::DiscountAmount)?;
            values.insert(Metric::NetElectricCost, net);
        }
        Ok(values)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
