//! Field extraction and validation for a single report sheet.

use std::collections::BTreeMap;

use billing_core::data_processors::{Coerced, NumericCoercer};
use billing_core::error::RecordError;
use billing_core::models::{EnergyRecord, Grid, Metric};
use billing_core::profiles::{CellRef, ExtractionProfile};

// ── RawFields ─────────────────────────────────────────────────────────────────

/// How strictly cells are turned into numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Numeric cells and comma-grouped numeric text.
    Lenient,
    /// Numeric cells only.
    Strict,
}

/// One cell as read, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub cell: CellRef,
    /// `None` when the coordinate lies outside the sheet.
    pub value: Option<Coerced>,
}

/// Coerced but unvalidated cells of one report, keyed by metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    fields: BTreeMap<Metric, RawField>,
}

impl RawFields {
    pub fn get(&self, metric: Metric) -> Option<&RawField> {
        self.fields.get(&metric)
    }

    /// The numeric value of `metric`, or the error that rejects it.
    pub fn numeric(&self, metric: Metric) -> Result<f64, RecordError> {
        let field = self
            .fields
            .get(&metric)
            .ok_or(RecordError::Unmapped(metric))?;
        match &field.value {
            None => Err(RecordError::MissingCell {
                field: metric,
                row: field.cell.row,
                column: field.cell.column.clone(),
            }),
            Some(Coerced::Numeric(v)) => Ok(*v),
            Some(Coerced::Unparseable(raw)) => Err(RecordError::FieldType {
                field: metric,
                found: raw.describe(),
            }),
        }
    }
}

// ── RecordParser ──────────────────────────────────────────────────────────────

/// Reads the profile's fixed cells out of a sheet.
pub struct RecordParser;

impl RecordParser {
    /// Check the schema, then read and coerce every non-derived metric.
    pub fn parse(grid: &Grid, profile: &ExtractionProfile) -> Result<RawFields, RecordError> {
        let missing = profile.missing_columns(grid);
        if !missing.is_empty() {
            return Err(RecordError::Schema { missing });
        }
        let metrics: Vec<Metric> = Metric::ALL
            .iter()
            .copied()
            .filter(|m| !m.is_derived())
            .collect();
        Ok(Self::read_fields(grid, profile, &metrics, Coercion::Lenient))
    }

    /// Read `metrics` without a schema check. Metrics the profile does not
    /// map are left out, so [`RawFields::numeric`] reports them as unmapped.
    pub fn read_fields(
        grid: &Grid,
        profile: &ExtractionProfile,
        metrics: &[Metric],
        coercion: Coercion,
    ) -> RawFields {
        let mut fields = BTreeMap::new();
        for &metric in metrics {
            let Some(cell) = profile.cell(metric) else {
                continue;
            };
            let value = grid.cell(cell.row, &cell.column).map(|raw| match coercion {
                Coercion::Lenient => NumericCoercer::coerce(raw),
                Coercion::Strict => NumericCoercer::strict(raw),
            });
            fields.insert(
                metric,
                RawField {
                    cell: cell.clone(),
                    value,
                },
            );
        }
        RawFields { fields }
    }
}

// ── RecordValidator ───────────────────────────────────────────────────────────

/// Turns raw fields into a complete [`EnergyRecord`].
pub struct RecordValidator;

impl RecordValidator {
    /// Check every read field in validation order and derive the computed
    /// ones. The first failing field rejects the whole record.
    ///
    /// `discount_percent` is stored as a fraction in the sheet and returned
    /// as a 0–100 percentage.
    pub fn validate_and_derive(raw: &RawFields) -> Result<EnergyRecord, RecordError> {
        let peak_energy = raw.numeric(Metric::PeakEnergy)?;
        let peak_cost = raw.numeric(Metric::PeakCost)?;
        let off_peak_energy = raw.numeric(Metric::OffPeakEnergy)?;
        let off_peak_cost = raw.numeric(Metric::OffPeakCost)?;
        let peak_power = raw.numeric(Metric::PeakPower)?;
        let electric_cost = raw.numeric(Metric::ElectricCost)?;
        let discount_amount = raw.numeric(Metric::DiscountAmount)?;
        let discount_fraction = raw.numeric(Metric::DiscountPercent)?;

        Ok(EnergyRecord {
            peak_energy,
            peak_cost,
            off_peak_energy,
            off_peak_cost,
            total_energy: peak_energy + off_peak_energy,
            peak_power,
            electric_cost,
            discount_amount,
            discount_percent: discount_fraction * 100.0,
            net_electric_cost: electric_cost - discount_amount,
        })
    }
}

/// Parse and validate one sheet in a single step.
pub fn parse_record(grid: &Grid, profile: &ExtractionProfile) -> Result<EnergyRecord, RecordError> {
    let raw = RecordParser::parse(grid, profile)?;
    RecordValidator::validate_and_derive(&raw)
}

// ── Test fixtures ─────────────────────────────────────────────────────────────


// ── Tests ─────────────────────────────────────────────────────────────────────
