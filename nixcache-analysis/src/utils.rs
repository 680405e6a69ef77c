//! Utility functions for nix cache reports

/// Arithmetic mean, undefined for an empty set
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (divisor n-1).
///
/// A single sample has no spread and yields `Some(0.0)`; an empty set yields `None`.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    if values.len() < 2 {
        return Some(0.0);
    }

    let variance = values.iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>() / (values.len() - 1) as f64;

    Some(variance.sqrt())
}

/// Ratio `numerator / denominator`, undefined unless the denominator is positive
pub fn ratio(numerator: f64, denominator: Option<f64>) -> Option<f64> {
    match denominator {
        Some(d) if d > 0.0 => Some(numerator / d),
        _ => None,
    }
}

/// Format a computed value for a report cell: three decimals, blank when undefined
pub fn format_seconds(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.3}", v),
        _ => String::new(),
    }
}

/// Strip the quote characters some exports wrap identifiers in
pub fn unquote(value: &str) -> &str {
    value.trim().trim_matches('"')
}
