//! Date-stepped backtest loop.
//!
//! Per date: cancellation check, price refresh, ledger initialisation on the
//! first date, corporate actions, scoring, sells then buys, snapshot.
//! Per-instrument failures are logged and skipped; data preparation failures
//! and cancellation end the run in `Failed` with every snapshot so far.
//! Every BUY or SELL signal is kept as a `SignalRecord` with its outcome.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::domain::benchmark::{self, BenchmarkResult};
use crate::domain::code_data::{build_unified_timeline, CodeData};
use crate::domain::costs::{Side, TransactionCostModel};
use crate::domain::error::ValtraderError;
use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::ledger::{Order, PortfolioLedger, PortfolioSnapshot, TradeRecord};
use crate::domain::ohlcv::resample_weekly;
use crate::domain::signal::{DimensionFlags, SignalKind, SignalScorer};
use crate::domain::sizing::{PositionSizer, PositionSizingDecision, SizingInput};
use crate::domain::universe::Universe;
use crate::domain::valuation::{IndustryThresholds, ThresholdResolver, ValuationContext};
use crate::ports::data_port::DataPort;
use crate::ports::indicator_port::IndicatorPort;
use crate::ports::valuation_port::ValuationPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// First date fetched for indicator warm-up; trading starts at `start_date`.
    pub warmup_start: NaiveDate,
    pub initial_capital: f64,
    /// Resample input bars before computing indicators.
    pub frequency: Frequency,
    pub lot_size: u64,
    pub periods_per_year: f64,
    pub risk_free_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    PreparingData,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::NotStarted => "not started",
            RunState::PreparingData => "preparing data",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// A per-instrument step that was skipped or a trade the ledger refused.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub date: NaiveDate,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Executed,
    /// Sizing turned the signal into HOLD.
    Skipped,
    /// The ledger refused the sized order.
    Rejected,
}

impl fmt::Display for SignalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalOutcome::Executed => write!(f, "EXECUTED"),
            SignalOutcome::Skipped => write!(f, "SKIPPED"),
            SignalOutcome::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A BUY or SELL signal, the dimensions behind it and what became of it.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub date: NaiveDate,
    pub code: String,
    pub kind: SignalKind,
    pub confidence: u8,
    pub price: f64,
    pub value_ratio: Option<f64>,
    pub dimensions: DimensionFlags,
    pub outcome: SignalOutcome,
    /// Sized quantity; traded only when `Executed`.
    pub shares: u64,
    pub tier: Option<String>,
    pub reason: String,
}

impl SignalRecord {
    /// RSI, momentum and volume votes for the signal's own side.
    pub fn votes(&self) -> [bool; 3] {
        let d = &self.dimensions;
        match self.kind {
            SignalKind::Sell => [d.rsi.sell, d.momentum.sell, d.volume.sell],
            _ => [d.rsi.buy, d.momentum.buy, d.volume.buy],
        }
    }
}

#[derive(Debug)]
pub struct BacktestResult {
    pub state: RunState,
    pub initial_capital: f64,
    pub trades: Vec<TradeRecord>,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub dividend_income: f64,
    pub rejections: Vec<Rejection>,
    pub signals: Vec<SignalRecord>,
    pub benchmark: Option<BenchmarkResult>,
    pub failure: Option<ValtraderError>,
}

impl BacktestResult {
    fn failed(initial_capital: f64, failure: ValtraderError) -> Self {
        BacktestResult {
            state: RunState::Failed,
            initial_capital,
            trades: Vec::new(),
            snapshots: Vec::new(),
            dividend_income: 0.0,
            rejections: Vec::new(),
            signals: Vec::new(),
            benchmark: None,
            failure: Some(failure),
        }
    }

    pub fn final_value(&self) -> f64 {
        self.snapshots
            .last()
            .map_or(self.initial_capital, |s| s.total_value)
    }
}

/// A scored instrument waiting to be sized and executed.
struct Candidate<'a> {
    code: &'a str,
    kind: SignalKind,
    confidence: u8,
    dimensions: DimensionFlags,
    price: f64,
    value_ratio: Option<f64>,
    snapshot: &'a IndicatorSnapshot,
}

/// Per-run records collected alongside the ledger.
#[derive(Default)]
struct RunLog {
    rejections: Vec<Rejection>,
    signals: Vec<SignalRecord>,
}

impl RunLog {
    fn reject(&mut self, date: NaiveDate, code: &str, reason: String) {
        self.rejections.push(Rejection {
            date,
            code: code.to_string(),
            reason,
        });
    }

    fn record_signal(
        &mut self,
        date: NaiveDate,
        candidate: &Candidate<'_>,
        sizing: &PositionSizingDecision,
        outcome: SignalOutcome,
        reason: String,
    ) {
        self.signals.push(SignalRecord {
            date,
            code: candidate.code.to_string(),
            kind: candidate.kind,
            confidence: candidate.confidence,
            price: candidate.price,
            value_ratio: candidate.value_ratio,
            dimensions: candidate.dimensions,
            outcome,
            shares: sizing.shares,
            tier: sizing.tier.clone(),
            reason,
        });
    }
}

pub struct BacktestLoop {
    pub config: BacktestConfig,
    pub scorer: SignalScorer,
    pub sizer: PositionSizer,
    pub costs: TransactionCostModel,
    pub default_thresholds: IndustryThresholds,
    state: RunState,
}

impl BacktestLoop {
    pub fn new(
        config: BacktestConfig,
        scorer: SignalScorer,
        sizer: PositionSizer,
        costs: TransactionCostModel,
    ) -> Self {
        BacktestLoop {
            config,
            scorer,
            sizer,
            costs,
            default_thresholds: IndustryThresholds::default(),
            state: RunState::NotStarted,
        }
    }

    pub fn with_default_thresholds(mut self, thresholds: IndustryThresholds) -> Self {
        self.default_thresholds = thresholds;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Fetch, resample and annotate bars for every universe instrument.
    pub fn prepare(
        &mut self,
        universe: &Universe,
        data_port: &dyn DataPort,
        indicator_port: &dyn IndicatorPort,
    ) -> Result<Vec<CodeData>, ValtraderError> {
        self.state = RunState::PreparingData;
        let mut prepared = Vec::with_capacity(universe.count());

        for code in universe.codes() {
            let daily = data_port
                .fetch_bars(code, self.config.warmup_start, self.config.end_date)
                .map_err(|e| ValtraderError::DataPreparation {
                    reason: format!("{code}: {e}"),
                })?;
            if daily.is_empty() {
                return Err(ValtraderError::DataPreparation {
                    reason: format!("{code}: no bars between {} and {}", self.config.warmup_start, self.config.end_date),
                });
            }
            let bars = match self.config.frequency {
                Frequency::Weekly => resample_weekly(&daily),
                Frequency::Daily => daily,
            };
            let snapshots = indicator_port.snapshots(&bars);
            if snapshots.len() != bars.len() {
                return Err(ValtraderError::DataPreparation {
                    reason: format!(
                        "{code}: {} snapshots for {} bars",
                        snapshots.len(),
                        bars.len()
                    ),
                });
            }
            debug!(code, bars = bars.len(), "prepared");
            prepared.push(CodeData::new(code.to_string(), bars, snapshots));
        }

        Ok(prepared)
    }

    /// Run the backtest to completion, failure or cancellation.
    pub fn run(
        &mut self,
        universe: &Universe,
        data_port: &dyn DataPort,
        indicator_port: &dyn IndicatorPort,
        valuation_port: &dyn ValuationPort,
        cancel: Option<&AtomicBool>,
    ) -> BacktestResult {
        let capital = self.config.initial_capital;
        let data = match self.prepare(universe, data_port, indicator_port) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "data preparation failed");
                self.state = RunState::Failed;
                return BacktestResult::failed(capital, e);
            }
        };

        let timeline = build_unified_timeline(&data, self.config.start_date, self.config.end_date);
        info!(
            instruments = data.len(),
            periods = timeline.len(),
            start = %self.config.start_date,
            end = %self.config.end_date,
            "starting backtest"
        );

        self.state = RunState::Running;
        let mut resolver = ThresholdResolver::new(self.default_thresholds);
        let mut ledger: Option<PortfolioLedger> = None;
        let mut prices: BTreeMap<String, f64> = BTreeMap::new();
        let mut log = RunLog::default();
        let mut failure = None;

        for &date in &timeline {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                warn!(%date, "backtest cancelled");
                failure = Some(ValtraderError::Cancelled { date });
                break;
            }

            for cd in &data {
                if let Some(close) = cd.close_on_or_before(date) {
                    prices.insert(cd.code.clone(), close);
                }
            }

            if ledger.is_none() {
                match PortfolioLedger::initialize(capital, &universe.weights, &prices, self.config.lot_size) {
                    Ok(initialized) => ledger = Some(initialized),
                    Err(e) => {
                        warn!(%date, error = %e, "ledger initialisation failed");
                        failure = Some(e);
                        break;
                    }
                }
            }
            let Some(book) = ledger.as_mut() else {
                break;
            };

            self.step(date, &data, &prices, book, valuation_port, &mut resolver, &mut log);
            book.record_snapshot(date, &prices);
        }

        self.state = if failure.is_some() {
            RunState::Failed
        } else {
            RunState::Completed
        };

        let (dividend_income, (trades, snapshots)) = match ledger {
            Some(book) => (book.dividend_income(), book.into_records()),
            None => (0.0, (Vec::new(), Vec::new())),
        };

        let benchmark = if failure.is_none() {
            benchmark::buy_and_hold(&data, universe, &timeline, capital, self.config.lot_size).ok()
        } else {
            None
        };

        info!(
            state = %self.state,
            trades = trades.len(),
            snapshots = snapshots.len(),
            signals = log.signals.len(),
            rejections = log.rejections.len(),
            "backtest finished"
        );

        BacktestResult {
            state: self.state,
            initial_capital: capital,
            trades,
            snapshots,
            dividend_income,
            rejections: log.rejections,
            signals: log.signals,
            benchmark,
            failure,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &self,
        date: NaiveDate,
        data: &[CodeData],
        prices: &BTreeMap<String, f64>,
        ledger: &mut PortfolioLedger,
        valuation_port: &dyn ValuationPort,
        resolver: &mut ThresholdResolver,
        log: &mut RunLog,
    ) {
        for cd in data {
            if let Some(action) = cd.get_bar(date).and_then(|bar| bar.corporate_action) {
                ledger.apply_corporate_action(&cd.code, &action);
            }
        }

        let mut candidates: Vec<Candidate<'_>> = Vec::new();
        for cd in data {
            let (Some(bar), Some(history)) = (cd.get_bar(date), cd.history_until(date)) else {
                continue;
            };
            let Some(snapshot) = history.last() else {
                continue;
            };

            let valuation = match valuation_port.fair_value(&cd.code) {
                Some(fair_value) => match ValuationContext::new(&cd.code, bar.close, fair_value) {
                    Ok(ctx) => Some(ctx),
                    Err(e) => {
                        debug!(%date, code = %cd.code, error = %e, "ignoring invalid valuation");
                        None
                    }
                },
                None => None,
            };
            let thresholds = resolver.resolve(&cd.code, valuation_port);

            match self.scorer.score(&cd.code, history, valuation.as_ref(), &thresholds) {
                Ok(decision) if decision.kind != SignalKind::Hold => candidates.push(Candidate {
                    code: &cd.code,
                    kind: decision.kind,
                    confidence: decision.confidence,
                    dimensions: decision.dimensions,
                    price: bar.close,
                    value_ratio: valuation.map(|v| v.price_to_value_ratio),
                    snapshot,
                }),
                Ok(_) => {}
                Err(e) => {
                    debug!(%date, code = %cd.code, error = %e, "skipping instrument");
                    log.reject(date, &cd.code, e.to_string());
                }
            }
        }

        // Sells first so their proceeds fund the buys.
        let (sells, buys): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| c.kind == SignalKind::Sell);

        for candidate in sells.iter().chain(buys.iter()) {
            let sizing = self.sizer.size(&SizingInput {
                signal: candidate.kind,
                value_ratio: candidate.value_ratio,
                held_shares: ledger.shares(candidate.code),
                price: candidate.price,
                available_cash: ledger.cash(),
                total_assets: ledger.total_value(prices),
            });
            let (outcome, reason) = match sizing.action {
                SignalKind::Hold => {
                    debug!(%date, code = candidate.code, reason = %sizing.reason, "sized to hold");
                    (SignalOutcome::Skipped, sizing.reason.clone())
                }
                SignalKind::Buy | SignalKind::Sell => {
                    match self.execute(date, candidate, &sizing, ledger) {
                        Ok(()) => (SignalOutcome::Executed, sizing.reason.clone()),
                        Err(e) => {
                            warn!(%date, code = candidate.code, error = %e, "trade rejected");
                            log.reject(date, candidate.code, e.to_string());
                            (SignalOutcome::Rejected, e.to_string())
                        }
                    }
                }
            };
            log.record_signal(date, candidate, &sizing, outcome, reason);
        }
    }

    fn execute(
        &self,
        date: NaiveDate,
        candidate: &Candidate<'_>,
        sizing: &PositionSizingDecision,
        ledger: &mut PortfolioLedger,
    ) -> Result<(), ValtraderError> {
        let side = if sizing.action == SignalKind::Sell {
            Side::Sell
        } else {
            Side::Buy
        };
        let cost = self
            .costs
            .calculate_for(side, candidate.code, sizing.shares, candidate.price);
        let order = Order {
            date,
            code: candidate.code.to_string(),
            shares: sizing.shares,
            price: candidate.price,
            cost,
            reason: format!("{} (confidence {})", sizing.reason, candidate.confidence),
            snapshot: Some(candidate.snapshot.clone()),
        };

        let trade = match side {
            Side::Buy => ledger.buy(order)?,
            Side::Sell => ledger.sell(order)?,
        };
        info!(
            %date,
            code = %trade.code,
            side = %trade.side,
            shares = trade.shares,
            price = trade.price,
            cost = trade.cost,
            "executed"
        );
        Ok(())
    }
}
