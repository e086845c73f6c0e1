//! CSV report writer.
//!
//! Writes four files into the output directory:
//! - `trades.csv`: the ordered trade log,
//! - `signals.csv`: every BUY/SELL signal with its votes and outcome,
//! - `equity.csv`: one row per snapshot with the benchmark value alongside,
//! - `metrics.csv`: `metric,value` pairs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::ValtraderError;
use crate::domain::metrics::Metrics;
use crate::ports::report_port::ReportPort;

pub const TRADES_FILE: &str = "trades.csv";
pub const SIGNALS_FILE: &str = "signals.csv";
pub const EQUITY_FILE: &str = "equity.csv";
pub const METRICS_FILE: &str = "metrics.csv";

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn write_trades(&self, result: &BacktestResult, path: &Path) -> Result<(), ValtraderError> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record([
            "date", "code", "side", "shares", "price", "gross", "cost", "net", "reason",
        ])?;
        for t in &result.trades {
            wtr.write_record([
                t.date.to_string(),
                t.code.clone(),
                t.side.to_string(),
                t.shares.to_string(),
                format!("{:.4}", t.price),
                format!("{:.2}", t.gross),
                format!("{:.2}", t.cost),
                format!("{:.2}", t.net),
                t.reason.clone(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_signals(&self, result: &BacktestResult, path: &Path) -> Result<(), ValtraderError> {
        let flag = |b: bool| if b { "Y" } else { "N" };
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record([
            "date", "code", "signal", "confidence", "price", "value_ratio", "rsi", "momentum",
            "volume", "outcome", "shares", "tier", "reason",
        ])?;
        for s in &result.signals {
            let [rsi, momentum, volume] = s.votes();
            wtr.write_record([
                s.date.to_string(),
                s.code.clone(),
                s.kind.to_string(),
                s.confidence.to_string(),
                format!("{:.4}", s.price),
                s.value_ratio.map(|r| format!("{r:.4}")).unwrap_or_default(),
                flag(rsi).to_string(),
                flag(momentum).to_string(),
                flag(volume).to_string(),
                s.outcome.to_string(),
                s.shares.to_string(),
                s.tier.clone().unwrap_or_default(),
                s.reason.clone(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_equity(&self, result: &BacktestResult, path: &Path) -> Result<(), ValtraderError> {
        let benchmark: BTreeMap<NaiveDate, f64> = result
            .benchmark
            .iter()
            .flat_map(|b| b.curve.iter().map(|p| (p.date, p.value)))
            .collect();

        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["date", "total_value", "cash", "positions", "benchmark"])?;
        for snap in &result.snapshots {
            wtr.write_record([
                snap.date.to_string(),
                format!("{:.2}", snap.total_value),
                format!("{:.2}", snap.cash),
                snap.positions.len().to_string(),
                benchmark
                    .get(&snap.date)
                    .map(|v| format!("{v:.2}"))
                    .unwrap_or_default(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_metrics(&self, metrics: &Metrics, path: &Path) -> Result<(), ValtraderError> {
        let mut rows: Vec<(&str, String)> = vec![
            ("initial_value", format!("{:.2}", metrics.initial_value)),
            ("final_value", format!("{:.2}", metrics.final_value)),
            ("total_return", format!("{:.6}", metrics.total_return)),
            ("annualized_return", format!("{:.6}", metrics.annualized_return)),
            ("sharpe_ratio", format!("{:.4}", metrics.sharpe_ratio)),
            ("sortino_ratio", format!("{:.4}", metrics.sortino_ratio)),
            ("max_drawdown", format!("{:.6}", metrics.max_drawdown)),
            ("max_drawdown_duration", metrics.max_drawdown_duration.to_string()),
            ("periods", metrics.periods.to_string()),
            ("dividend_income", format!("{:.2}", metrics.dividend_income)),
            ("buy_count", metrics.costs.buy_count.to_string()),
            ("sell_count", metrics.costs.sell_count.to_string()),
            ("total_cost", format!("{:.2}", metrics.costs.total_cost)),
            ("cost_rate", format!("{:.6}", metrics.costs.cost_rate)),
        ];
        if let Some(b) = metrics.benchmark_return {
            rows.push(("benchmark_return", format!("{b:.6}")));
        }
        if let Some(e) = metrics.excess_return {
            rows.push(("excess_return", format!("{e:.6}")));
        }

        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["metric", "value"])?;
        for (name, value) in rows {
            wtr.write_record([name, value.as_str()])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_dir: &Path,
    ) -> Result<(), ValtraderError> {
        fs::create_dir_all(output_dir)?;
        self.write_trades(result, &output_dir.join(TRADES_FILE))?;
        self.write_signals(result, &output_dir.join(SIGNALS_FILE))?;
        self.write_equity(result, &output_dir.join(EQUITY_FILE))?;
        self.write_metrics(metrics, &output_dir.join(METRICS_FILE))?;
        info!(
            dir = %output_dir.display(),
            trades = result.trades.len(),
            signals = result.signals.len(),
            "report written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{RunState, SignalOutcome, SignalRecord};
    use crate::domain::costs::Side;
    use crate::domain::ledger::{PortfolioSnapshot, TradeRecord};
    use crate::domain::signal::{DimensionFlags, SignalKind, Support};
    use tempfile::TempDir;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample_result() -> BacktestResult {
        BacktestResult {
            state: RunState::Completed,
            initial_capital: 100_000.0,
            trades: vec![TradeRecord {
                date: d("2024-01-12"),
                code: "600000".into(),
                side: Side::Buy,
                shares: 1_000,
                price: 10.0,
                gross: 10_000.0,
                cost: 5.2,
                net: -10_005.2,
                reason: "obvious_undervalue, new position".into(),
                snapshot: None,
            }],
            snapshots: vec![
                PortfolioSnapshot {
                    date: d("2024-01-05"),
                    total_value: 100_000.0,
                    cash: 100_000.0,
                    positions: Vec::new(),
                },
                PortfolioSnapshot {
                    date: d("2024-01-12"),
                    total_value: 99_994.8,
                    cash: 89_994.8,
                    positions: Vec::new(),
                },
            ],
            dividend_income: 0.0,
            rejections: Vec::new(),
            signals: vec![
                SignalRecord {
                    date: d("2024-01-12"),
                    code: "600000".into(),
                    kind: SignalKind::Buy,
                    confidence: 3,
                    price: 10.0,
                    value_ratio: Some(0.65),
                    dimensions: DimensionFlags {
                        rsi: Support { sell: false, buy: true },
                        momentum: Support { sell: true, buy: false },
                        volume: Support { sell: false, buy: true },
                    },
                    outcome: SignalOutcome::Executed,
                    shares: 1_000,
                    tier: Some("obvious_undervalue".into()),
                    reason: "obvious_undervalue: buy 1000 shares".into(),
                },
                SignalRecord {
                    date: d("2024-01-19"),
                    code: "600000".into(),
                    kind: SignalKind::Buy,
                    confidence: 3,
                    price: 10.0,
                    value_ratio: Some(0.65),
                    dimensions: DimensionFlags::default(),
                    outcome: SignalOutcome::Skipped,
                    shares: 0,
                    tier: None,
                    reason: "single-instrument weight limit reached".into(),
                },
            ],
            benchmark: None,
            failure: None,
        }
    }

    #[test]
    fn writes_all_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("report");
        let result = sample_result();
        let metrics = Metrics::compute(&result, 52.0, 0.0);

        CsvReportAdapter::new().write(&result, &metrics, &out).unwrap();

        let trades = fs::read_to_string(out.join(TRADES_FILE)).unwrap();
        let mut lines = trades.lines();
        assert_eq!(
            lines.next(),
            Some("date,code,side,shares,price,gross,cost,net,reason")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("2024-01-12,600000,BUY,1000,10.0000,10000.00,5.20"));
        // comma in the reason is quoted
        assert!(row.ends_with("\"obvious_undervalue, new position\""));

        let signals = fs::read_to_string(out.join(SIGNALS_FILE)).unwrap();
        let lines: Vec<&str> = signals.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "2024-01-12,600000,BUY,3,10.0000,0.6500,Y,N,Y,EXECUTED,1000,obvious_undervalue,obvious_undervalue: buy 1000 shares"
        );
        assert!(lines[2].contains(",SKIPPED,0,,single-instrument weight limit reached"));

        let equity = fs::read_to_string(out.join(EQUITY_FILE)).unwrap();
        assert_eq!(equity.lines().count(), 3);
        assert!(equity.contains("2024-01-12,99994.80,89994.80,0,"));

        let metrics_csv = fs::read_to_string(out.join(METRICS_FILE)).unwrap();
        assert!(metrics_csv.contains("buy_count,1"));
        assert!(!metrics_csv.contains("benchmark_return"));
    }
}
