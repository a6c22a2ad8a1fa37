use std::str::FromStr;

use billing_core::error::{BillingError, Result};
use billing_core::formatting::{format_baht, format_kwh, format_number};
use billing_core::models::Metric;
use billing_data::analysis::{Analysis, AnalysisRequest};
use billing_data::presenter::{ChartKind, ChartSeries, SeriesPresenter};

const NO_DATA: &str = "No data available for the selected period.";

// ── View ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Summary,
    Distribution,
    Cost,
    Forecast,
    Meters,
    All,
}

impl FromStr for View {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "summary" => Ok(View::Summary),
            "distribution" => Ok(View::Distribution),
            "cost" => Ok(View::Cost),
            "forecast" => Ok(View::Forecast),
            "meters" => Ok(View::Meters),
            "all" => Ok(View::All),
            other => Err(BillingError::Config(format!("unknown view '{}'", other))),
        }
    }
}

impl View {
    fn shows(self, part: View) -> bool {
        self == View::All || self == part
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Push the requested view of `analysis` through `presenter`.
pub fn render(
    analysis: &Analysis,
    request: &AnalysisRequest,
    view: View,
    presenter: &mut dyn SeriesPresenter,
) -> Result<()> {
    for warning in &analysis.warnings {
        presenter.warning(warning)?;
    }
    if view.shows(View::Summary) {
        summary(analysis, presenter)?;
    }
    if view.shows(View::Distribution) {
        distribution(analysis, presenter)?;
    }
    if view.shows(View::Cost) {
        cost(analysis, presenter)?;
    }
    if view.shows(View::Forecast) {
        forecast(analysis, presenter)?;
    }
    if view.shows(View::Meters) {
        meters(analysis, request, presenter)?;
    }
    presenter.finish()
}

fn summary(analysis: &Analysis, presenter: &mut dyn SeriesPresenter) -> Result<()> {
    let batch = &analysis.batch;
    let mut lines = vec![format!(
        "Range: {} to {} ({} reports)",
        batch.range.start,
        batch.range.end,
        batch.included.len()
    )];
    if batch.is_empty() {
        lines.push(NO_DATA.to_string());
        return presenter.section("Summary", &lines);
    }

    let peak_baht = batch.total(Metric::PeakCost);
    let off_peak_baht = batch.total(Metric::OffPeakCost);
    lines.extend([
        format!("Total Peak: {} (kWh)", format_number(batch.total(Metric::PeakEnergy), 2)),
        format!("Total Peak in Baht: {}", format_baht(peak_baht)),
        format!(
            "Total Off-Peak: {} (kWh)",
            format_number(batch.total(Metric::OffPeakEnergy), 2)
        ),
        format!("Total Off-Peak in Baht: {}", format_baht(off_peak_baht)),
        format!("Total Power: {} (kWh)", format_number(batch.total(Metric::TotalEnergy), 2)),
        format!("Total Power in Baht: {}", format_baht(peak_baht + off_peak_baht)),
    ]);
    for (date, sources) in batch.duplicates() {
        lines.push(format!("Duplicate date {}: {}", date, sources.join(", ")));
    }
    let missing = batch.missing_months();
    if !missing.is_empty() {
        let months: Vec<String> = missing.iter().map(|m| m.to_string()).collect();
        lines.push(format!("Missing months: {}", months.join(", ")));
    }
    presenter.section("Summary", &lines)?;

    for metric in [
        Metric::PeakEnergy,
        Metric::OffPeakEnergy,
        Metric::TotalEnergy,
        Metric::PeakPower,
    ] {
        presenter.chart(&ChartSeries::metric(metric, batch.series_for(metric)))?;
    }
    presenter.chart(&ChartSeries::combined(
        "Peak, Off-Peak, and Total Power Values Over Time",
        ChartKind::Bar,
        "kWh",
        [
            (Metric::PeakEnergy, batch.series_for(Metric::PeakEnergy)),
            (Metric::OffPeakEnergy, batch.series_for(Metric::OffPeakEnergy)),
            (Metric::TotalEnergy, batch.series_for(Metric::TotalEnergy)),
        ],
    ))
}

fn distribution(analysis: &Analysis, presenter: &mut dyn SeriesPresenter) -> Result<()> {
    let batch = &analysis.batch;
    if batch.is_empty() {
        return presenter.section("Power Distribution", &[NO_DATA.to_string()]);
    }
    let share = batch.energy_share();
    presenter.section(
        "Power Distribution",
        &[
            format!("Peak: {:.1}%", share.peak_percent),
            format!("Off-Peak: {:.1}%", share.off_peak_percent),
        ],
    )?;
    for included in &batch.included {
        let share = billing_core::calculations::EnergyShare::new(
            included.record.peak_energy,
            included.record.off_peak_energy,
        );
        let caption = format!("Date: {}", included.date);
        presenter.chart(&ChartSeries::energy_share(&included.label, &share, Some(&caption)))?;
    }
    presenter.chart(&ChartSeries::energy_share("Power Distribution", &share, None))
}

fn cost(analysis: &Analysis, presenter: &mut dyn SeriesPresenter) -> Result<()> {
    let batch = &analysis.batch;
    if batch.is_empty() {
        return presenter.section("Cost", &[NO_DATA.to_string()]);
    }
    presenter.section(
        "Cost",
        &[
            format!(
                "Total Electric Cost: {} (Baht)",
                format_number(batch.total(Metric::ElectricCost), 2)
            ),
            format!(
                "Total Discount: {} (Baht)",
                format_number(batch.total(Metric::DiscountAmount), 2)
            ),
            format!(
                "Total Net Electric Cost: {} (Baht)",
                format_number(batch.total(Metric::NetElectricCost), 2)
            ),
        ],
    )?;
    for metric in [
        Metric::ElectricCost,
        Metric::DiscountAmount,
        Metric::DiscountPercent,
        Metric::NetElectricCost,
    ] {
        presenter.chart(&ChartSeries::metric(metric, batch.series_for(metric)))?;
    }
    presenter.chart(&ChartSeries::combined(
        "Electric Cost, Discount, and Net Electric Cost Over Time",
        ChartKind::Line,
        "Baht",
        [
            (Metric::ElectricCost, batch.series_for(Metric::ElectricCost)),
            (Metric::DiscountAmount, batch.series_for(Metric::DiscountAmount)),
            (Metric::NetElectricCost, batch.series_for(Metric::NetElectricCost)),
        ],
    ))
}

fn forecast(analysis: &Analysis, presenter: &mut dyn SeriesPresenter) -> Result<()> {
    let summary = match analysis.forecast.summary() {
        Ok(summary) => summary,
        Err(_) => return presenter.section("Discount Forecasting", &[NO_DATA.to_string()]),
    };
    let c = &summary.classification;
    let mut lines = vec![
        format!("Total power consumption: {}", format_kwh(summary.cumulative_energy)),
        format!("Monthly average: {}", format_kwh(summary.baseline.average)),
        format!("Eligible for: Level {} ({}%)", c.level, format_number(c.discount_percent, 0)),
    ];
    for target in &c.higher_tiers {
        lines.push(format!(
            "Remaining power until Level {} ({}%): {}",
            target.level,
            format_number(target.discount_percent, 0),
            format_kwh(target.energy_needed)
        ));
    }
    presenter.section("Discount Forecasting", &lines)?;
    presenter.chart(&ChartSeries::forecast(&analysis.forecast))
}

fn meters(
    analysis: &Analysis,
    request: &AnalysisRequest,
    presenter: &mut dyn SeriesPresenter,
) -> Result<()> {
    let summary = &analysis.meters;
    if summary.is_empty() {
        return presenter.section("Minimum Guarantee", &["No valid meter data found.".to_string()]);
    }
    let mut lines = Vec::new();
    for (id, progress) in summary.guarantees(|meter| request.guarantee_for(meter)) {
        let total = summary.meters.get(id).map(|s| s.total_energy()).unwrap_or(0.0);
        lines.push(format!("{}: Total Power: {}", id, format_kwh(total)));
        match progress {
            Some(p) if p.reached => lines.push(format!("Goal has been reached for {}!", id)),
            Some(p) => {
                lines.push(format!(
                    "Missing to complete Minimum Guarantee: {}",
                    format_kwh(p.missing)
                ));
                lines.push(format!(
                    "{} Progress: {} / {} kWh ({:.1}%)",
                    id,
                    format_number(p.total_energy, 2),
                    format_number(p.guarantee, 2),
                    p.progress * 100.0
                ));
            }
            None => lines.push(format!("Please enter a valid minimum guarantee for {}.", id)),
        }
    }
    lines.push(format!(
        "{}: Total Power: {}",
        billing_data::meters::ALL_METERS,
        format_kwh(summary.all_meters.total_energy())
    ));
    presenter.section("Minimum Guarantee", &lines)?;
    presenter.chart(&ChartSeries::meters(summary))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::models::{DuplicatePolicy, FileWarning, MeterMode};
    use billing_core::profiles::ExtractionProfile;
    use billing_core::time_utils::YearMonth;
    use billing_data::analysis::analyze;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        sections: Vec<(String, Vec<String>)>,
        charts: Vec<String>,
        warnings: usize,
        finished: bool,
    }

    impl SeriesPresenter for Recorder {
        fn section(&mut self, title: &str, lines: &[String]) -> Result<()> {
            self.sections.push((title.to_string(), lines.to_vec()));
            Ok(())
        }

        fn chart(&mut self, chart: &ChartSeries) -> Result<()> {
            self.charts.push(chart.title.clone());
            Ok(())
        }

        fn warning(&mut self, _warning: &FileWarning) -> Result<()> {
            self.warnings += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn empty_analysis() -> (Analysis, AnalysisRequest) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.xlsx"), b"not a workbook").unwrap();
        let request = AnalysisRequest {
            inputs: vec![dir.path().to_path_buf()],
            sheet: None,
            profile: ExtractionProfile::single_sheet(),
            start: YearMonth::new(2024, 1),
            end: YearMonth::new(2024, 3),
            duplicates: DuplicatePolicy::default(),
            meter_mode: MeterMode::default(),
            guarantees: Vec::new(),
        };
        (analyze(&request).unwrap(), request)
    }

    // ── View ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_view_from_str() {
        assert_eq!("cost".parse::<View>().unwrap(), View::Cost);
        assert_eq!("all".parse::<View>().unwrap(), View::All);
        assert!("daily".parse::<View>().is_err());
    }

    #[test]
    fn test_all_shows_every_part() {
        assert!(View::All.shows(View::Meters));
        assert!(View::Cost.shows(View::Cost));
        assert!(!View::Cost.shows(View::Summary));
    }

    // ── render ────────────────────────────────────────────────────────────────

    #[test]
    fn test_render_empty_state() {
        let (analysis, request) = empty_analysis();
        let mut recorder = Recorder::default();
        render(&analysis, &request, View::All, &mut recorder).unwrap();

        assert!(recorder.finished);
        assert_eq!(recorder.warnings, 1);
        assert!(recorder.charts.is_empty());
        let titles: Vec<&str> = recorder.sections.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Summary", "Power Distribution", "Cost", "Discount Forecasting", "Minimum Guarantee"]
        );
        assert!(recorder.sections[0].1.contains(&NO_DATA.to_string()));
    }

    #[test]
    fn test_render_single_view() {
        let (analysis, request) = empty_analysis();
        let mut recorder = Recorder::default();
        render(&analysis, &request, View::Forecast, &mut recorder).unwrap();

        assert_eq!(recorder.sections.len(), 1);
        assert_eq!(recorder.sections[0].0, "Discount Forecasting");
    }
}
