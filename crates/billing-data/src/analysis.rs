//! Top-level analysis pipeline.
//!
//! Discovers and loads workbooks, picks the report sheet, defaults the date
//! range and runs the batch, forecast and meter aggregations, returning an
//! [`Analysis`] ready for presentation.

use std::path::PathBuf;

use billing_core::error::{BillingError, RecordError, Result};
use billing_core::models::{DateRange, DuplicatePolicy, FileWarning, MeterMode};
use billing_core::profiles::{ExtractionProfile, SheetScope};
use billing_core::settings::{MeterGuarantee, Settings};
use billing_core::time_utils::YearMonth;
use chrono::{Datelike, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::{BatchAggregator, BatchState};
use crate::forecast::{DiscountForecaster, Forecast};
use crate::meters::{MeterAggregator, MeterSummary};
use crate::reader::{collect_inputs, load_workbooks, Report, Workbook};

// ── Public types ──────────────────────────────────────────────────────────────

/// Everything one run needs, independent of how it was configured.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub inputs: Vec<PathBuf>,
    pub sheet: Option<String>,
    pub profile: ExtractionProfile,
    pub start: Option<YearMonth>,
    pub end: Option<YearMonth>,
    pub duplicates: DuplicatePolicy,
    pub meter_mode: MeterMode,
    pub guarantees: Vec<MeterGuarantee>,
}

impl AnalysisRequest {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            inputs: settings.inputs.clone(),
            sheet: settings.sheet.clone(),
            profile: settings.extraction_profile()?,
            start: settings.start,
            end: settings.end,
            duplicates: settings.duplicate_policy()?,
            meter_mode: settings.meter_mode()?,
            guarantees: settings.guarantees.clone(),
        })
    }

    /// Threshold for `meter`; the last matching guarantee wins.
    pub fn guarantee_for(&self, meter: &str) -> Option<f64> {
        self.guarantees
            .iter()
            .rev()
            .find(|g| g.meter == meter)
            .map(|g| g.threshold)
    }
}

/// Metadata produced alongside the analysis result.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    /// RFC 3339 timestamp when this result was generated.
    pub generated_at: String,
    pub files_found: usize,
    pub workbooks_loaded: usize,
    pub reports_built: usize,
    /// The sheet read from every workbook, when the profile selects one.
    pub sheet: Option<String>,
    pub load_time_seconds: f64,
}

/// The complete output of [`analyze`].
#[derive(Debug, Clone)]
pub struct Analysis {
    pub batch: BatchState,
    pub forecast: Forecast,
    pub meters: MeterSummary,
    pub reports: Vec<Report>,
    /// Load, sheet, batch, forecast and meter warnings in pipeline order.
    pub warnings: Vec<FileWarning>,
    pub metadata: AnalysisMetadata,
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Run the full pipeline.
///
/// 1. Collect workbook paths from the inputs.
/// 2. Load every workbook; unreadable ones become warnings.
/// 3. Resolve the report sheet and build one report per workbook.
/// 4. Default the range from the report dates.
/// 5. Aggregate the batch, forecast the discount level and total the meters.
pub fn analyze(request: &AnalysisRequest) -> Result<Analysis> {
    request.profile.validate()?;

    // ── Step 1: Load workbooks ────────────────────────────────────────────────
    let load_start = std::time::Instant::now();
    let paths = collect_inputs(&request.inputs)?;
    let (workbooks, warnings) = load_workbooks(&paths);
    let load_time = load_start.elapsed().as_secs_f64();
    info!(
        "Loaded {} of {} workbooks in {:.2}s",
        workbooks.len(),
        paths.len(),
        load_time
    );

    let mut analysis = analyze_workbooks(request, workbooks, warnings)?;
    analysis.metadata.files_found = paths.len();
    analysis.metadata.load_time_seconds = load_time;
    Ok(analysis)
}

/// Run steps 3 to 5 over workbooks that are already loaded.
///
/// `warnings` holds the load warnings; sheet and aggregation warnings are
/// appended after them. A forecast warning is kept only for a report the
/// batch did not already reject.
pub fn analyze_workbooks(
    request: &AnalysisRequest,
    workbooks: Vec<Workbook>,
    mut warnings: Vec<FileWarning>,
) -> Result<Analysis> {
    // ── Step 2: Reports ───────────────────────────────────────────────────────
    let sheet = match request.profile.sheet_scope {
        SheetScope::Selected => resolve_sheet(&workbooks, request.sheet.as_deref()),
        SheetScope::FirstSheet => None,
    };
    let (reports, report_warnings) =
        Report::collect(&workbooks, &request.profile, sheet.as_deref().unwrap_or_default());
    warnings.extend(report_warnings);

    // ── Step 3: Range ─────────────────────────────────────────────────────────
    let range = resolve_range(&reports, request.start, request.end)?;
    info!("Analysing {} to {}", range.start, range.end);

    // ── Step 4: Aggregations ──────────────────────────────────────────────────
    let batch = BatchAggregator::new(&request.profile, request.duplicates).aggregate(&reports, &range);
    let forecast = DiscountForecaster::new(&request.profile).forecast(&reports, &range);
    let meters = MeterAggregator::new(&request.profile, request.meter_mode).aggregate_by_meter(&workbooks);

    warnings.extend(batch.warnings.iter().cloned());
    for warning in &forecast.warnings {
        let rejected = batch
            .warnings
            .iter()
            .any(|w| w.source == warning.source && w.sheet == warning.sheet);
        if !rejected {
            warnings.push(warning.clone());
        }
    }
    warnings.extend(meters.warnings.iter().cloned());

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        files_found: workbooks.len(),
        workbooks_loaded: workbooks.len(),
        reports_built: reports.len(),
        sheet,
        load_time_seconds: 0.0,
    };

    Ok(Analysis {
        batch,
        forecast,
        meters,
        reports,
        warnings,
        metadata,
    })
}

/// The sheet read from every workbook.
///
/// A requested sheet the first workbook lacks falls back to that workbook's
/// first sheet. `None` only when there is nothing to read.
pub fn resolve_sheet(workbooks: &[Workbook], requested: Option<&str>) -> Option<String> {
    let first = workbooks.first()?;
    if let Some(name) = requested {
        if first.sheet(name).is_some() {
            return Some(name.to_string());
        }
        warn!(
            "Sheet '{}' not found in {}; using its first sheet instead",
            name, first.label
        );
    }
    first.first_sheet().map(|s| s.name.clone())
}

/// Apply the given bounds, defaulting the open ends to January of the
/// earliest report year and December of the latest.
pub fn resolve_range(
    reports: &[Report],
    start: Option<YearMonth>,
    end: Option<YearMonth>,
) -> Result<DateRange> {
    let years = || reports.iter().filter_map(|r| r.report_date).map(|d| d.year());
    let start = match start {
        Some(s) => s,
        None => {
            let year = years().min().ok_or(RecordError::NoData)?;
            whole_year_bound(year, 1)?
        }
    };
    let end = match end {
        Some(e) => e,
        None => {
            let year = years().max().ok_or(RecordError::NoData)?;
            whole_year_bound(year, 12)?
        }
    };
    DateRange::from_months(start, end)
}

fn whole_year_bound(year: i32, month: u32) -> Result<YearMonth> {
    YearMonth::new(year, month)
        .ok_or_else(|| BillingError::InvalidRange(format!("{}-{:02}", year, month)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
