//! Cross-report aggregation over a selected date range.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use billing_core::calculations::EnergyShare;
use billing_core::error::RecordError;
use billing_core::models::{
    DateRange, DuplicatePolicy, EnergyRecord, FileWarning, Metric, SeriesPoint,
};
use billing_core::profiles::ExtractionProfile;
use billing_core::time_utils::{natural_cmp, YearMonth};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::parser::parse_record;
use crate::reader::Report;

// ── BatchState ────────────────────────────────────────────────────────────────

/// A validated report that contributed to the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncludedRecord {
    pub source_id: String,
    pub label: String,
    pub date: NaiveDate,
    pub record: EnergyRecord,
}

/// Totals, series and consistency checks for one date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchState {
    pub range: DateRange,
    /// Running sum per metric, in processing order.
    pub totals: BTreeMap<Metric, f64>,
    /// One point per included report for every metric; all the same length.
    pub series: BTreeMap<Metric, Vec<SeriesPoint>>,
    pub included: Vec<IncludedRecord>,
    /// `YYYY-MM-DD` → source ids of every in-range report that validated.
    pub date_index: BTreeMap<String, Vec<String>>,
    /// Months present in the whole corpus, limited to the range's years.
    pub calendar_coverage: BTreeSet<YearMonth>,
    #[serde(skip)]
    pub warnings: Vec<FileWarning>,
}

impl BatchState {
    fn empty(range: DateRange) -> Self {
        Self {
            range,
            totals: Metric::ALL.iter().map(|m| (*m, 0.0)).collect(),
            series: Metric::ALL.iter().map(|m| (*m, Vec::new())).collect(),
            included: Vec::new(),
            date_index: BTreeMap::new(),
            calendar_coverage: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    fn include(&mut self, report: &Report, date: NaiveDate, record: EnergyRecord) {
        for metric in Metric::ALL {
            let value = record.value(metric);
            *self.totals.entry(metric).or_insert(0.0) += value;
            self.series.entry(metric).or_default().push(SeriesPoint {
                label: report.label.clone(),
                value,
                date,
            });
        }
        self.included.push(IncludedRecord {
            source_id: report.source_id.clone(),
            label: report.label.clone(),
            date,
            record,
        });
    }

    pub fn total(&self, metric: Metric) -> f64 {
        self.totals.get(&metric).copied().unwrap_or(0.0)
    }

    pub fn series_for(&self, metric: Metric) -> &[SeriesPoint] {
        self.series.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dates carried by more than one report.
    pub fn duplicates(&self) -> Vec<(&str, &[String])> {
        self.date_index
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(date, ids)| (date.as_str(), ids.as_slice()))
            .collect()
    }

    /// Months of the range with no report anywhere in the corpus.
    pub fn missing_months(&self) -> Vec<YearMonth> {
        self.range
            .months()
            .into_iter()
            .filter(|m| !self.calendar_coverage.contains(m))
            .collect()
    }

    /// Peak versus off-peak split of the range totals.
    pub fn energy_share(&self) -> EnergyShare {
        EnergyShare::new(
            self.total(Metric::PeakEnergy),
            self.total(Metric::OffPeakEnergy),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    /// `Err(NoData)` when nothing was included.
    pub fn ensure_data(&self) -> Result<(), RecordError> {
        if self.is_empty() {
            Err(RecordError::NoData)
        } else {
            Ok(())
        }
    }
}

// ── BatchAggregator ───────────────────────────────────────────────────────────

/// Processing order: date, then natural label order, then source id.
pub fn report_order(a: &Report, b: &Report) -> Ordering {
    a.report_date
        .cmp(&b.report_date)
        .then_with(|| natural_cmp(&a.label, &b.label))
        .then_with(|| a.source_id.cmp(&b.source_id))
}

/// Folds validated reports into a [`BatchState`].
pub struct BatchAggregator<'a> {
    profile: &'a ExtractionProfile,
    policy: DuplicatePolicy,
}

impl<'a> BatchAggregator<'a> {
    pub fn new(profile: &'a ExtractionProfile, policy: DuplicatePolicy) -> Self {
        Self { profile, policy }
    }

    /// Aggregate every report dated inside `range`.
    ///
    /// `reports` is the whole corpus; reports outside the range (or without
    /// a date) only feed `calendar_coverage`. A report that fails to parse or
    /// validate is excluded from every total, series and the date index, and
    /// recorded as a warning.
    pub fn aggregate(&self, reports: &[Report], range: &DateRange) -> BatchState {
        let mut state = BatchState::empty(*range);

        let mut in_range: Vec<(&Report, NaiveDate)> = reports
            .iter()
            .filter_map(|r| match r.date() {
                Ok(d) => Some((r, d)),
                Err(e) => {
                    debug!("{}: {}", r.label, e);
                    None
                }
            })
            .filter(|(_, d)| range.contains(*d))
            .collect();
        in_range.sort_by(|(a, _), (b, _)| report_order(a, b));

        let mut kept_dates: BTreeSet<NaiveDate> = BTreeSet::new();
        for (report, date) in in_range {
            let record = match parse_record(&report.grid, self.profile) {
                Ok(record) => record,
                Err(error) => {
                    warn!("{} will be excluded: {}", report.label, error);
                    state.warnings.push(FileWarning {
                        source: report.label.clone(),
                        sheet: Some(report.sheet_name.clone()),
                        error,
                    });
                    continue;
                }
            };

            state
                .date_index
                .entry(date.format("%Y-%m-%d").to_string())
                .or_default()
                .push(report.source_id.clone());

            if self.policy == DuplicatePolicy::KeepFirst && kept_dates.contains(&date) {
                debug!("{}: later report for {} dropped", report.label, date);
                state.warnings.push(FileWarning {
                    source: report.label.clone(),
                    sheet: Some(report.sheet_name.clone()),
                    error: RecordError::DuplicateDate(date),
                });
                continue;
            }

            debug!("{}: included ({} kWh)", report.label, record.total_energy);
            kept_dates.insert(date);
            state.include(report, date, record);
        }
        for (date, ids) in state.duplicates() {
            warn!("{} reports share the date {}: {}", ids.len(), date, ids.join(", "));
        }

        let years = range.start.year()..=range.end.year();
        state.calendar_coverage = reports
            .iter()
            .filter_map(|r| r.report_date)
            .filter(|d| years.contains(&d.year()))
            .map(YearMonth::of)
            .collect();

        info!(
            "Aggregated {} of {} reports in {} to {}",
            state.included.len(),
            reports.len(),
            range.start,
            range.end
        );
        state
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
