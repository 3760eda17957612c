//! Human-readable rendering of concentrations and volumes.

use super::units::MICROLITERS_PER_LITER;

const MOLAR_SCALES: [(f64, &str); 5] = [
    (1.0, "M"),
    (1.0e-3, "mM"),
    (1.0e-6, "µM"),
    (1.0e-9, "nM"),
    (1.0e-12, "pM"),
];

const MASS_CONCENTRATION_SCALES: [(f64, &str); 5] = [
    (1.0, "g/L"),
    (1.0e-3, "mg/L"),
    (1.0e-6, "µg/L"),
    (1.0e-9, "ng/L"),
    (1.0e-12, "pg/L"),
];

/// Values this close below a scale boundary still count as reaching it, so
/// `0.01 / 10` renders as `1 mM` rather than `1000 µM`.
const SCALE_BOUNDARY_EPSILON: f64 = 1.0e-9;

pub const DISPLAY_SIGNIFICANT_DIGITS: usize = 4;

pub fn format_molar(value_in_molar: f64) -> String {
    format_scaled(value_in_molar, &MOLAR_SCALES)
}

pub fn format_mass_conc(value_in_grams_per_liter: f64) -> String {
    format_scaled(value_in_grams_per_liter, &MASS_CONCENTRATION_SCALES)
}

/// Unit symbol [`format_molar`] would pick for `value_in_molar`.
pub fn molar_scale(value_in_molar: f64) -> &'static str {
    select_scale(value_in_molar, &MOLAR_SCALES).1
}

pub fn mass_conc_scale(value_in_grams_per_liter: f64) -> &'static str {
    select_scale(value_in_grams_per_liter, &MASS_CONCENTRATION_SCALES).1
}

fn select_scale(value: f64, scales: &[(f64, &'static str)]) -> (f64, &'static str) {
    if value == 0.0 {
        return scales[0];
    }
    let magnitude = value.abs();
    scales
        .iter()
        .copied()
        .find(|(factor, _)| magnitude >= factor * (1.0 - SCALE_BOUNDARY_EPSILON))
        .unwrap_or(scales[scales.len() - 1])
}

fn format_scaled(value: f64, scales: &[(f64, &'static str)]) -> String {
    if value == 0.0 {
        return format!("0 {}", scales[0].1);
    }
    let (factor, unit) = select_scale(value, scales);
    format!(
        "{} {}",
        format_significant(value / factor, DISPLAY_SIGNIFICANT_DIGITS),
        unit
    )
}

/// printf-style `%.Ng`: `digits` significant digits, trailing zeros removed,
/// exponent notation outside `1e-4 ..= 10^digits`.
pub fn format_significant(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let digits = digits.max(1);
    let scientific = format!("{:.*e}", digits - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };

    if exponent < -4 || exponent >= digits as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_trailing_zeros(mantissa),
            sign,
            exponent.abs()
        )
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_trailing_zeros(&format!("{:.*}", decimals, value))
    }
}

fn trim_trailing_zeros(text: &str) -> String {
    if !text.contains('.') {
        return text.to_string();
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Fixed decimals with `,` thousands separators.
pub fn format_grouped(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match fixed.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + integer.len() / 3 + 1);
    if value.is_sign_negative() && value != 0.0 {
        grouped.push('-');
    }
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }
    grouped
}

pub fn format_microliters(liters: f64) -> String {
    format!("{} µL", format_grouped(liters * MICROLITERS_PER_LITER, 2))
}

pub fn format_quantity(value: f64, unit: &str) -> String {
    format!(
        "{} {}",
        format_significant(value, DISPLAY_SIGNIFICANT_DIGITS),
        unit
    )
}
