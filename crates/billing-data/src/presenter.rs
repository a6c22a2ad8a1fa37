//! The hand-off point between finished aggregates and whatever draws them.
//!
//! Builders here turn batch, forecast and meter results into
//! [`ChartSeries`] values; a [`SeriesPresenter`] decides how to show them.

use billing_core::calculations::EnergyShare;
use billing_core::error::Result;
use billing_core::formatting::hover_label;
use billing_core::models::{FileWarning, Metric, SeriesPoint};
use serde::Serialize;

use crate::forecast::Forecast;
use crate::meters::{MeterSummary, ALL_METERS};

// ── ChartSeries ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Pie,
}

/// One named sequence of points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub name: String,
    pub x_labels: Vec<String>,
    pub y_values: Vec<f64>,
    pub hover_labels: Vec<String>,
}

impl Trace {
    /// A trace over per-report points with `"<value> <unit><br>Date: <date>"`
    /// hover text.
    pub fn from_points(name: &str, unit: &str, points: &[SeriesPoint]) -> Self {
        Self {
            name: name.to_string(),
            x_labels: points.iter().map(|p| p.label.clone()).collect(),
            y_values: points.iter().map(|p| p.value).collect(),
            hover_labels: points
                .iter()
                .map(|p| hover_label(p.value, unit, p.date))
                .collect(),
        }
    }
}

/// A chart with its title and axis configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub title: String,
    pub kind: ChartKind,
    pub x_axis: String,
    pub y_axis: String,
    pub traces: Vec<Trace>,
}

impl ChartSeries {
    /// Per-report chart of a single metric.
    pub fn metric(metric: Metric, points: &[SeriesPoint]) -> Self {
        Self {
            title: format!("{} Over Time", metric.label()),
            kind: ChartKind::Line,
            x_axis: "File Names".to_string(),
            y_axis: format!("{} ({})", metric.label(), metric.unit()),
            traces: vec![Trace::from_points(metric.label(), metric.unit(), points)],
        }
    }

    /// Several metrics sharing a unit on one chart.
    pub fn combined<'p, I>(title: &str, kind: ChartKind, unit: &str, series: I) -> Self
    where
        I: IntoIterator<Item = (Metric, &'p [SeriesPoint])>,
    {
        Self {
            title: title.to_string(),
            kind,
            x_axis: "File Names".to_string(),
            y_axis: format!("Values ({})", unit),
            traces: series
                .into_iter()
                .map(|(metric, points)| Trace::from_points(metric.label(), unit, points))
                .collect(),
        }
    }

    /// Peak versus off-peak pie.
    pub fn energy_share(title: &str, share: &EnergyShare, caption: Option<&str>) -> Self {
        let hover = |percent: f64| match caption {
            Some(c) => format!("{:.1}%<br>{}", percent, c),
            None => format!("{:.1}%", percent),
        };
        Self {
            title: title.to_string(),
            kind: ChartKind::Pie,
            x_axis: String::new(),
            y_axis: "kWh".to_string(),
            traces: vec![Trace {
                name: title.to_string(),
                x_labels: vec!["Peak Power".to_string(), "Off-Peak Power".to_string()],
                y_values: vec![share.peak, share.off_peak],
                hover_labels: vec![hover(share.peak_percent), hover(share.off_peak_percent)],
            }],
        }
    }

    /// Energy per report with the flat monthly baseline.
    pub fn forecast(forecast: &Forecast) -> Self {
        let energy = Trace {
            name: "Power".to_string(),
            x_labels: forecast
                .readings
                .iter()
                .map(|r| r.date.format("%Y-%m-%d").to_string())
                .collect(),
            y_values: forecast.readings.iter().map(|r| r.energy).collect(),
            hover_labels: forecast
                .readings
                .iter()
                .map(|r| hover_label(r.energy, "kWh", r.date))
                .collect(),
        };
        let mut traces = vec![energy];
        if let Ok(summary) = forecast.summary() {
            let points = summary.baseline.series();
            traces.push(Trace {
                name: "Average Power".to_string(),
                x_labels: points
                    .iter()
                    .map(|(d, _)| d.format("%Y-%m-%d").to_string())
                    .collect(),
                y_values: points.iter().map(|(_, v)| *v).collect(),
                hover_labels: points
                    .iter()
                    .map(|(d, v)| hover_label(*v, "kWh", *d))
                    .collect(),
            });
        }
        Self {
            title: "Discount Forecasting".to_string(),
            kind: ChartKind::Line,
            x_axis: "Date".to_string(),
            y_axis: "Power (kWh)".to_string(),
            traces,
        }
    }

    /// Total energy per meter, grand total last.
    pub fn meters(summary: &MeterSummary) -> Self {
        let mut x_labels: Vec<String> = summary.meters.keys().map(|m| m.to_string()).collect();
        let mut y_values: Vec<f64> = summary.meters.values().map(|s| s.total_energy()).collect();
        x_labels.push(ALL_METERS.to_string());
        y_values.push(summary.all_meters.total_energy());
        let hover_labels = y_values
            .iter()
            .map(|v| billing_core::formatting::format_kwh(*v))
            .collect();
        Self {
            title: "Total Power per Meter".to_string(),
            kind: ChartKind::Bar,
            x_axis: "Meter".to_string(),
            y_axis: "Power (kWh)".to_string(),
            traces: vec![Trace {
                name: "Power".to_string(),
                x_labels,
                y_values,
                hover_labels,
            }],
        }
    }
}

// ── SeriesPresenter ───────────────────────────────────────────────────────────

/// Receives finished output. Nothing is computed on this side.
pub trait SeriesPresenter {
    /// A section title with headline figures.
    fn section(&mut self, title: &str, lines: &[String]) -> Result<()>;

    fn chart(&mut self, chart: &ChartSeries) -> Result<()>;

    /// A report or sheet that was left out.
    fn warning(&mut self, warning: &FileWarning) -> Result<()>;

    /// Called once after the last section.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
