use chrono::NaiveDate;

/// Format a number with `,` thousands separators and a fixed number of
/// decimal places.
///
/// # Examples
///
/// ```
/// use billing_core::formatting::format_number;
///
/// assert_eq!(format_number(951700.0, 0), "951,700");
/// assert_eq!(format_number(1234.5, 2), "1,234.50");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let factor = 10_f64.powi(decimals as i32);
    let abs_value = value.abs();
    // Nudge exact midpoints (1.005) up before rounding.
    let scaled = (abs_value * factor + f64::EPSILON * abs_value * factor).round();

    let whole = (scaled / factor).trunc() as u64;
    let frac = (scaled - whole as f64 * factor).round() as u64;

    let mut out = group_thousands(&whole.to_string());
    if decimals > 0 {
        out.push('.');
        out.push_str(&format!("{:0width$}", frac, width = decimals as usize));
    }

    if negative && scaled != 0.0 {
        format!("-{}", out)
    } else {
        out
    }
}

/// Format an amount in Baht with two decimals.
///
/// ```
/// use billing_core::formatting::format_baht;
///
/// assert_eq!(format_baht(1234.5), "1,234.50 Baht");
/// ```
pub fn format_baht(amount: f64) -> String {
    format_quantity(amount, "Baht")
}

/// Format an energy figure in kWh with two decimals.
///
/// ```
/// use billing_core::formatting::format_kwh;
///
/// assert_eq!(format_kwh(51700.0), "51,700.00 kWh");
/// ```
pub fn format_kwh(energy: f64) -> String {
    format_quantity(energy, "kWh")
}

/// `"<value> <unit>"` with two decimals; the unit is omitted when empty.
pub fn format_quantity(value: f64, unit: &str) -> String {
    if unit.is_empty() {
        format_number(value, 2)
    } else {
        format!("{} {}", format_number(value, 2), unit)
    }
}

/// Hover text attached to one chart point.
///
/// ```
/// use billing_core::formatting::hover_label;
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
/// assert_eq!(hover_label(1500.0, "kWh", date), "1,500.00 kWh<br>Date: 2024-03-15");
/// ```
pub fn hover_label(value: f64, unit: &str, date: NaiveDate) -> String {
    format!("{}<br>Date: {}", format_quantity(value, unit), date.format("%Y-%m-%d"))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let lead = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && i % 3 == lead {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────
