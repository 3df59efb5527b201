//! Small numeric helpers shared by the table and grid steps.
//!
//! The `nan*` reductions skip NaN the way the gridded steps treat missing
//! cells. Rounding and float formatting follow the conventions of the CSV
//! files the economic and weather-generator models read.

/// Rounds half-way cases to the nearest even integer.
pub fn round_half_even(x: f64) -> f64 {
    x.round_ties_even()
}

/// Rounds to `digits` decimal places, ties to even.
pub fn round_to(x: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (x * factor).round_ties_even() / factor
}

/// Formats a float for CSV output, always keeping a decimal point.
///
/// ```
/// use mintflow::numeric::format_float;
/// assert_eq!(format_float(105.0), "105.0");
/// assert_eq!(format_float(0.25), "0.25");
/// ```
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

pub fn nansum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().filter(|v| !v.is_nan()).sum()
}

pub fn nanmean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

pub fn nanmin<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
}

pub fn nanmax<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

/// Replaces every value equal to one of the sentinels with NaN.
pub fn mask_sentinels(values: &mut [f64], sentinels: &[f64]) {
    if sentinels.is_empty() {
        return;
    }
    for v in values.iter_mut() {
        if sentinels.iter().any(|s| *v == *s) {
            *v = f64::NAN;
        }
    }
}
