use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::time_utils::YearMonth;

// ── MonthlyBaseline ───────────────────────────────────────────────────────────

/// Flat monthly average of consumption over the months a set of readings
/// spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBaseline {
    pub total: f64,
    /// Every calendar month from the first reading to the last, inclusive.
    pub months: Vec<YearMonth>,
    /// `total / months.len()`.
    pub average: f64,
}

impl MonthlyBaseline {
    /// Returns `None` when there are no readings.
    ///
    /// Months without a reading still count towards the divisor.
    pub fn from_readings(readings: &[(NaiveDate, f64)]) -> Option<Self> {
        let first = readings.iter().map(|(d, _)| *d).min()?;
        let last = readings.iter().map(|(d, _)| *d).max()?;
        let months = YearMonth::span(YearMonth::of(first), YearMonth::of(last));
        let total: f64 = readings.iter().map(|(_, v)| v).sum();
        let average = total / months.len() as f64;
        Some(Self {
            total,
            months,
            average,
        })
    }

    /// The baseline as one `(month end, average)` point per month.
    pub fn series(&self) -> Vec<(NaiveDate, f64)> {
        self.months
            .iter()
            .map(|m| (m.last_day(), self.average))
            .collect()
    }
}

// ── GuaranteeProgress ─────────────────────────────────────────────────────────

/// Progress of a meter towards its contracted minimum consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuaranteeProgress {
    pub total_energy: f64,
    pub guarantee: f64,
    /// `max(0, guarantee - total_energy)`.
    pub missing: f64,
    /// Fraction in `0.0..=1.0`.
    pub progress: f64,
    pub reached: bool,
}

impl GuaranteeProgress {
    /// Returns `None` when no positive guarantee is set.
    pub fn evaluate(total_energy: f64, guarantee: f64) -> Option<Self> {
        if guarantee <= 0.0 || !guarantee.is_finite() {
            return None;
        }
        let reached = total_energy >= guarantee;
        let progress = if reached {
            1.0
        } else {
            (total_energy / guarantee).max(0.0)
        };
        Some(Self {
            total_energy,
            guarantee,
            missing: (guarantee - total_energy).max(0.0),
            progress,
            reached,
        })
    }
}

// ── EnergyShare ───────────────────────────────────────────────────────────────

/// Peak versus off-peak split of an energy total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyShare {
    pub peak: f64,
    pub off_peak: f64,
    pub peak_percent: f64,
    pub off_peak_percent: f64,
}

impl EnergyShare {
    pub fn new(peak: f64, off_peak: f64) -> Self {
        let total = peak + off_peak;
        let (peak_percent, off_peak_percent) = if total == 0.0 {
            (0.0, 0.0)
        } else {
            (peak / total * 100.0, off_peak / total * 100.0)
        };
        Self {
            peak,
            off_peak,
            peak_percent,
            off_peak_percent,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
