//! Performance metrics computed from a backtest's snapshot series.

use super::backtest::BacktestResult;
use super::costs::CostSummary;
use super::ledger::PortfolioSnapshot;

const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub initial_value: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of periods spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub periods: usize,
    pub dividend_income: f64,
    pub costs: CostSummary,
    pub benchmark_return: Option<f64>,
    /// Strategy total return minus benchmark total return.
    pub excess_return: Option<f64>,
}

impl Metrics {
    /// `periods_per_year` scales Sharpe/Sortino (52 for weekly bars).
    pub fn compute(result: &BacktestResult, periods_per_year: f64, risk_free_rate: f64) -> Self {
        let snapshots = &result.snapshots;
        let initial_value = result.initial_capital;
        let final_value = result.final_value();

        let total_return = if initial_value > 0.0 {
            (final_value - initial_value) / initial_value
        } else {
            0.0
        };

        let days = match (snapshots.first(), snapshots.last()) {
            (Some(first), Some(last)) => (last.date - first.date).num_days(),
            _ => 0,
        };
        let years = days as f64 / DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 && total_return.is_finite() {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(snapshots);
        let period_rf = if periods_per_year > 0.0 {
            risk_free_rate / periods_per_year
        } else {
            0.0
        };
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(snapshots, period_rf, periods_per_year);

        let benchmark_return = result.benchmark.as_ref().map(|b| b.total_return);

        Metrics {
            initial_value,
            final_value,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            periods: snapshots.len(),
            dividend_income: result.dividend_income,
            costs: CostSummary::from_trades(&result.trades),
            benchmark_return,
            excess_return: benchmark_return.map(|b| total_return - b),
        }
    }
}

fn compute_drawdown(snapshots: &[PortfolioSnapshot]) -> (f64, usize) {
    let Some(first) = snapshots.first() else {
        return (0.0, 0);
    };

    let mut peak = first.total_value;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for snap in snapshots {
        if snap.total_value >= peak {
            peak = snap.total_value;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - snap.total_value) / peak;
            max_dd = max_dd.max(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(
    snapshots: &[PortfolioSnapshot],
    period_rf: f64,
    periods_per_year: f64,
) -> (f64, f64) {
    if snapshots.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = snapshots
        .windows(2)
        .map(|w| {
            let prev = w[0].total_value;
            if prev > 0.0 {
                (w[1].total_value - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - period_rf;
    let scale = periods_per_year.max(0.0).sqrt();

    let sharpe = if stddev > 0.0 {
        excess_return / stddev * scale
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        excess_return / downside_stddev * scale
    } else {
        0.0
    };

    (sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::RunState;
    use crate::domain::costs::Side;
    use crate::domain::ledger::TradeRecord;
    use chrono::{Duration, NaiveDate};

    fn snapshots(values: &[f64]) -> Vec<PortfolioSnapshot> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| PortfolioSnapshot {
                date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap() + Duration::weeks(i as i64),
                total_value: v,
                cash: v,
                positions: Vec::new(),
            })
            .collect()
    }

    fn result(values: &[f64]) -> BacktestResult {
        BacktestResult {
            state: RunState::Completed,
            initial_capital: values.first().copied().unwrap_or(100_000.0),
            trades: Vec::new(),
            snapshots: snapshots(values),
            dividend_income: 0.0,
            rejections: Vec::new(),
            signals: Vec::new(),
            benchmark: None,
            failure: None,
        }
    }

    #[test]
    fn empty_result() {
        let m = Metrics::compute(&result(&[]), 52.0, 0.03);
        assert!(m.total_return.abs() < f64::EPSILON);
        assert!(m.max_drawdown.abs() < f64::EPSILON);
        assert_eq!(m.periods, 0);
    }

    #[test]
    fn total_return() {
        let m = Metrics::compute(&result(&[100_000.0, 110_000.0]), 52.0, 0.0);
        assert!((m.total_return - 0.10).abs() < 1e-9);
        let m = Metrics::compute(&result(&[100_000.0, 90_000.0]), 52.0, 0.0);
        assert!((m.total_return + 0.10).abs() < 1e-9);
    }

    #[test]
    fn annualized_over_calendar_days() {
        // 53 weekly points span 364 days
        let mut values = vec![100_000.0; 52];
        values.push(120_000.0);
        let m = Metrics::compute(&result(&values), 52.0, 0.0);
        let years = 364.0 / 365.25;
        let expected = 1.2_f64.powf(1.0 / years) - 1.0;
        assert!((m.annualized_return - expected).abs() < 1e-9);
    }

    #[test]
    fn drawdown_and_duration() {
        let m = Metrics::compute(&result(&[100.0, 120.0, 90.0, 100.0, 130.0, 125.0]), 52.0, 0.0);
        assert!((m.max_drawdown - 0.25).abs() < 1e-12);
        assert_eq!(m.max_drawdown_duration, 2);
    }

    #[test]
    fn flat_curve_has_zero_ratios() {
        let m = Metrics::compute(&result(&[100.0, 100.0, 100.0]), 52.0, 0.0);
        assert!(m.sharpe_ratio.abs() < f64::EPSILON);
        assert!(m.sortino_ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn rising_curve_positive_sharpe() {
        let m = Metrics::compute(&result(&[100.0, 101.0, 103.0, 102.5, 105.0]), 52.0, 0.0);
        assert!(m.sharpe_ratio > 0.0);
        assert!(m.sortino_ratio > 0.0);
    }

    #[test]
    fn cost_summary_from_trades() {
        let mut r = result(&[100_000.0, 100_000.0]);
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        for (side, gross, cost) in [(Side::Buy, 10_000.0, 8.0), (Side::Sell, 12_000.0, 20.0)] {
            r.trades.push(TradeRecord {
                date,
                code: "600000".into(),
                side,
                shares: 1_000,
                price: gross / 1_000.0,
                gross,
                cost,
                net: 0.0,
                reason: String::new(),
                snapshot: None,
            });
        }
        let m = Metrics::compute(&r, 52.0, 0.0);
        assert_eq!(m.costs.buy_count, 1);
        assert_eq!(m.costs.sell_count, 1);
        assert!((m.costs.total_cost - 28.0).abs() < 1e-12);
        assert!((m.costs.cost_rate - 28.0 / 22_000.0).abs() < 1e-12);
    }
}
