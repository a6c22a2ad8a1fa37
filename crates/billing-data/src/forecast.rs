//! Cumulative-consumption discount forecast.

use billing_core::calculations::MonthlyBaseline;
use billing_core::error::RecordError;
use billing_core::models::{DateRange, FileWarning, Metric};
use billing_core::profiles::ExtractionProfile;
use billing_core::tiers::{DiscountTierEngine, TierClassification};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::report_order;
use crate::parser::{Coercion, RecordParser};
use crate::reader::Report;

/// Peak plus off-peak energy of one report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReading {
    pub label: String,
    pub date: NaiveDate,
    pub energy: f64,
}

/// Totals and tier placement, present when at least one report was usable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSummary {
    pub cumulative_energy: f64,
    pub baseline: MonthlyBaseline,
    pub classification: TierClassification,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub readings: Vec<ForecastReading>,
    summary: Option<ForecastSummary>,
    #[serde(skip)]
    pub warnings: Vec<FileWarning>,
}

impl Forecast {
    /// `Err(NoData)` when no report in range had both energy cells.
    pub fn summary(&self) -> Result<&ForecastSummary, RecordError> {
        self.summary.as_ref().ok_or(RecordError::NoData)
    }
}

/// Classifies range consumption against the discount schedule.
///
/// Only the two energy cells are read, and only numeric cells count, so a
/// report can feed the forecast even when other fields fail validation.
pub struct DiscountForecaster<'a> {
    profile: &'a ExtractionProfile,
    engine: DiscountTierEngine,
}

impl<'a> DiscountForecaster<'a> {
    pub fn new(profile: &'a ExtractionProfile) -> Self {
        Self::with_engine(profile, DiscountTierEngine::default())
    }

    pub fn with_engine(profile: &'a ExtractionProfile, engine: DiscountTierEngine) -> Self {
        Self { profile, engine }
    }

    pub fn forecast(&self, reports: &[Report], range: &DateRange) -> Forecast {
        let mut in_range: Vec<&Report> = reports
            .iter()
            .filter(|r| r.date().is_ok_and(|d| range.contains(d)))
            .collect();
        in_range.sort_by(|a, b| report_order(a, b));

        let metrics = [Metric::PeakEnergy, Metric::OffPeakEnergy];
        let mut readings = Vec::new();
        let mut warnings = Vec::new();

        for report in in_range {
            let Ok(date) = report.date() else {
                continue;
            };
            let raw = RecordParser::read_fields(&report.grid, self.profile, &metrics, Coercion::Strict);
            let energy = raw.numeric(Metric::PeakEnergy).and_then(|peak| {
                raw.numeric(Metric::OffPeakEnergy)
                    .map(|off_peak| peak + off_peak)
            });
            match energy {
                Ok(energy) => readings.push(ForecastReading {
                    label: report.label.clone(),
                    date,
                    energy,
                }),
                Err(error) => {
                    warn!("{} left out of the forecast: {}", report.label, error);
                    warnings.push(FileWarning {
                        source: report.label.clone(),
                        sheet: Some(report.sheet_name.clone()),
                        error,
                    });
                }
            }
        }

        let points: Vec<(NaiveDate, f64)> = readings.iter().map(|r| (r.date, r.energy)).collect();
        let summary = MonthlyBaseline::from_readings(&points).map(|baseline| {
            let cumulative_energy = baseline.total;
            ForecastSummary {
                cumulative_energy,
                classification: self.engine.classify(cumulative_energy),
                baseline,
            }
        });

        match &summary {
            Some(s) => info!(
                "Forecast: {:.2} kWh over {} months, level {}",
                s.cumulative_energy,
                s.baseline.months.len(),
                s.classification.level
            ),
            None => warn!("Forecast: no usable reports in range"),
        }

        Forecast {
            readings,
            summary,
            warnings,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
