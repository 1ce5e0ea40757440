/// Normalize an upstream rate into a 0-100 percentage.
///
/// Values above 100 are assumed to be double-scaled and divided by 100,
/// values in `(1, 100]` are already percentages and values in `(0, 1]` are
/// fractions. `1.0` is read as a fraction, so it maps to 100. The result is
/// capped at 100.
pub fn extract_rate(raw: Option<f64>) -> f64 {
    let num = match raw {
        Some(n) if n.is_finite() => n,
        _ => return 0.0,
    };

    if num > 100.0 {
        (num / 100.0).min(100.0)
    } else if num > 1.0 {
        num
    } else if num > 0.0 {
        num * 100.0
    } else {
        0.0
    }
}

/// Sum of counters, pinned at `u64::MAX` instead of overflowing.
pub fn saturating_sum<I>(values: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    values.into_iter().fold(0, u64::saturating_add)
}

/// `numerator * 100 / denominator`, or 0 when the denominator is zero.
pub fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator * 100.0 / denominator;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// `numerator / denominator`, or 0 when the denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
