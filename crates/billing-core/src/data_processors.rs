use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::models::CellValue;

// ── DateExtractor ─────────────────────────────────────────────────────────────

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]{4}-[0-9]{2}-[0-9]{2}").expect("regex is valid"))
}

/// Pulls the billing date out of a report's free-text header cell.
pub struct DateExtractor;

impl DateExtractor {
    /// Return the first `YYYY-MM-DD` substring of `header_text` as a date.
    ///
    /// Only the first match is considered. A match that is not a real
    /// calendar date (month 13, February 30) yields `None`, exactly as a
    /// header without any match does.
    pub fn extract(header_text: &str) -> Option<NaiveDate> {
        let found = date_pattern().find(header_text)?;
        match NaiveDate::parse_from_str(found.as_str(), "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(e) => {
                debug!("DateExtractor: \"{}\" is not a date: {}", found.as_str(), e);
                None
            }
        }
    }
}

// ── NumericCoercer ────────────────────────────────────────────────────────────

/// Outcome of coercing one raw cell to a number.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Numeric(f64),
    /// The cell was left as-is; validation rejects it.
    Unparseable(CellValue),
}

impl Coerced {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Coerced::Numeric(v) => Some(*v),
            Coerced::Unparseable(_) => None,
        }
    }
}

/// Turns raw spreadsheet cells into numbers where the billing layout allows.
pub struct NumericCoercer;

impl NumericCoercer {
    /// Coerce a cell read from a report.
    ///
    /// * numeric cell → its value
    /// * text that parses as a decimal once `,` group separators are removed
    ///   (`"12,345.67"`) → the parsed value
    /// * anything else (other text, empty, boolean, dates) → passed through
    ///   untouched as [`Coerced::Unparseable`]
    pub fn coerce(cell: &CellValue) -> Coerced {
        match cell {
            CellValue::Int(i) => Coerced::Numeric(*i as f64),
            CellValue::Float(f) if f.is_finite() => Coerced::Numeric(*f),
            CellValue::Text(s) => match Self::parse_grouped(s) {
                Some(v) => Coerced::Numeric(v),
                None => Coerced::Unparseable(cell.clone()),
            },
            other => Coerced::Unparseable(other.clone()),
        }
    }

    /// Accept only cells that already hold a number, with no text parsing.
    pub fn strict(cell: &CellValue) -> Coerced {
        match cell {
            CellValue::Int(i) => Coerced::Numeric(*i as f64),
            CellValue::Float(f) if f.is_finite() => Coerced::Numeric(*f),
            other => Coerced::Unparseable(other.clone()),
        }
    }

    fn parse_grouped(s: &str) -> Option<f64> {
        let cleaned = s.trim().replace(',', "");
        if cleaned.is_empty() {
            return None;
        }
        cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
