//! Bollinger Bands.
//!
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation (divides by N, not N-1).
//! Warmup: first (period-1) values are `None`.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerValue {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

pub fn calculate_bollinger(
    closes: &[f64],
    period: usize,
    multiplier: f64,
) -> Vec<Option<BollingerValue>> {
    if period == 0 {
        return vec![None; closes.len()];
    }

    (0..closes.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &closes[i + 1 - period..=i];
            let middle = window.iter().sum::<f64>() / period as f64;
            let variance = window
                .iter()
                .map(|c| {
                    let diff = c - middle;
                    diff * diff
                })
                .sum::<f64>()
                / period as f64;
            let stddev = variance.sqrt();
            Some(BollingerValue {
                upper: middle + multiplier * stddev,
                middle,
                lower: middle - multiplier * stddev,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_warmup() {
        let series = calculate_bollinger(&[1.0, 2.0, 3.0, 4.0], 3, 2.0);
        assert!(series[0].is_none());
        assert!(series[1].is_none());
        assert!(series[2].is_some());
    }

    #[test]
    fn bollinger_constant_values() {
        let series = calculate_bollinger(&[5.0; 5], 3, 2.0);
        let b = series[4].unwrap();
        assert!((b.upper - 5.0).abs() < f64::EPSILON);
        assert!((b.lower - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_basic_calculation() {
        // window 2,4,6 -> mean 4, population variance 8/3
        let series = calculate_bollinger(&[2.0, 4.0, 6.0], 3, 2.0);
        let b = series[2].unwrap();
        let sd = (8.0_f64 / 3.0).sqrt();
        assert!((b.middle - 4.0).abs() < 1e-12);
        assert!((b.upper - (4.0 + 2.0 * sd)).abs() < 1e-12);
        assert!((b.lower - (4.0 - 2.0 * sd)).abs() < 1e-12);
    }

    #[test]
    fn bollinger_symmetry() {
        let series = calculate_bollinger(&[3.0, 9.0, 4.0, 7.0, 1.0], 4, 1.5);
        for b in series.into_iter().flatten() {
            assert!(((b.upper - b.middle) - (b.middle - b.lower)).abs() < 1e-12);
        }
    }
}
