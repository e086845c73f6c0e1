//! EMA trend classification by least-squares regression.
//!
//! The slope of the last `periods` EMA values is divided by their mean, so the
//! threshold is scale free. |normalised slope| < `flat_threshold` is flat.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

/// Least-squares slope of `values` against their index.
pub fn regression_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });

    if den == 0.0 { 0.0 } else { num / den }
}

/// Classify the trend of the trailing `periods` EMA values.
///
/// Returns `None` when fewer than `periods` values are available.
pub fn classify_trend(ema: &[f64], periods: usize, flat_threshold: f64) -> Option<TrendDirection> {
    if periods < 2 || ema.len() < periods {
        return None;
    }
    let window = &ema[ema.len() - periods..];
    let mean = window.iter().sum::<f64>() / periods as f64;
    if mean == 0.0 {
        return Some(TrendDirection::Flat);
    }
    let relative = regression_slope(window) / mean;
    Some(if relative.abs() < flat_threshold {
        TrendDirection::Flat
    } else if relative > 0.0 {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    })
}
