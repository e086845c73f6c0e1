//! Portfolio ledger: the authoritative cash and position store.
//!
//! Every mutation goes through `buy`, `sell` or `apply_corporate_action`.
//! Trades and per-date snapshots are append-only.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use super::costs::{CostBreakdown, Side};
use super::error::ValtraderError;
use super::indicator::IndicatorSnapshot;
use super::ohlcv::CorporateAction;
use super::position::Position;

/// Tolerance on the sum of initial weights.
const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub code: String,
    pub side: Side,
    pub shares: u64,
    pub price: f64,
    pub gross: f64,
    pub cost: f64,
    /// Cash moved: gross + cost for buys, gross - cost for sells.
    pub net: f64,
    pub reason: String,
    pub snapshot: Option<IndicatorSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionValue {
    pub code: String,
    pub shares: u64,
    pub price: f64,
    pub market_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub total_value: f64,
    pub cash: f64,
    pub positions: Vec<PositionValue>,
}

/// One buy or sell instruction with its pre-computed costs.
#[derive(Debug, Clone)]
pub struct Order {
    pub date: NaiveDate,
    pub code: String,
    pub shares: u64,
    pub price: f64,
    pub cost: CostBreakdown,
    pub reason: String,
    pub snapshot: Option<IndicatorSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CorporateActionOutcome {
    pub cash_credited: f64,
    pub shares_added: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioLedger {
    pub initial_capital: f64,
    pub lot_size: u64,
    cash: f64,
    dividend_income: f64,
    positions: BTreeMap<String, Position>,
    trades: Vec<TradeRecord>,
    snapshots: Vec<PortfolioSnapshot>,
}

impl PortfolioLedger {
    /// An all-cash ledger.
    pub fn new(initial_capital: f64, lot_size: u64) -> Self {
        PortfolioLedger {
            initial_capital,
            lot_size,
            cash: initial_capital,
            dividend_income: 0.0,
            positions: BTreeMap::new(),
            trades: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    /// Build the opening portfolio from target weights at the first date's prices.
    ///
    /// Each instrument gets lot-aligned `weight × capital / price` shares; the
    /// cash weight and every rounding remainder stay in cash. An instrument
    /// without a usable price is skipped and its weight stays in cash too.
    pub fn initialize(
        capital: f64,
        weights: &BTreeMap<String, f64>,
        prices: &BTreeMap<String, f64>,
        lot_size: u64,
    ) -> Result<Self, ValtraderError> {
        if !capital.is_finite() || capital <= 0.0 {
            return Err(ValtraderError::ConfigInvalid {
                section: "backtest".into(),
                key: "initial_capital".into(),
                reason: "initial capital must be positive".into(),
            });
        }
        let weight_sum: f64 = weights.values().sum();
        if weight_sum > 1.0 + WEIGHT_EPSILON || weights.values().any(|w| *w < 0.0) {
            return Err(ValtraderError::ConfigInvalid {
                section: "universe".into(),
                key: "weight".into(),
                reason: format!("weights must be non-negative and sum to at most 1, got {weight_sum}"),
            });
        }

        let mut ledger = PortfolioLedger::new(capital, lot_size);
        for (code, &weight) in weights {
            if weight == 0.0 {
                continue;
            }
            let Some(price) = prices
                .get(code)
                .copied()
                .filter(|p| p.is_finite() && *p > 0.0)
            else {
                warn!(code = %code, weight, "no opening price, weight stays in cash");
                continue;
            };
            let shares = lot_align(weight * capital / price, lot_size);
            if shares == 0 {
                continue;
            }
            ledger.cash -= shares as f64 * price;
            ledger
                .positions
                .insert(code.clone(), Position::new(code.as_str(), shares, price));
        }

        info!(
            capital,
            positions = ledger.positions.len(),
            cash = ledger.cash,
            "initialized ledger"
        );
        Ok(ledger)
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn dividend_income(&self) -> f64 {
        self.dividend_income
    }

    pub fn position(&self, code: &str) -> Option<&Position> {
        self.positions.get(code)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn shares(&self, code: &str) -> u64 {
        self.positions.get(code).map_or(0, |p| p.shares)
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn snapshots(&self) -> &[PortfolioSnapshot] {
        &self.snapshots
    }

    /// Hand the trade log and snapshot series to the caller.
    pub fn into_records(self) -> (Vec<TradeRecord>, Vec<PortfolioSnapshot>) {
        (self.trades, self.snapshots)
    }

    fn check_quantity(&self, code: &str, shares: u64) -> Result<(), ValtraderError> {
        if shares == 0 {
            return Err(ValtraderError::InvalidQuantity {
                code: code.to_string(),
                shares,
                reason: "quantity must be positive".into(),
            });
        }
        if self.lot_size > 0 && shares % self.lot_size != 0 {
            return Err(ValtraderError::InvalidQuantity {
                code: code.to_string(),
                shares,
                reason: format!("quantity must be a multiple of {}", self.lot_size),
            });
        }
        Ok(())
    }

    /// Debit `shares × price + cost` and credit the shares.
    ///
    /// State is unchanged on failure.
    pub fn buy(&mut self, order: Order) -> Result<&TradeRecord, ValtraderError> {
        self.check_quantity(&order.code, order.shares)?;
        let gross = order.shares as f64 * order.price;
        let cost = order.cost.total;
        let required = gross + cost;
        if self.cash < required {
            return Err(ValtraderError::InsufficientCash {
                required,
                available: self.cash,
            });
        }

        self.cash -= required;
        self.positions
            .entry(order.code.clone())
            .or_insert_with(|| Position::new(order.code.as_str(), 0, 0.0))
            .add(order.shares, required);

        Ok(self.push_trade(order, Side::Buy, gross, cost, required))
    }

    /// Debit shares and credit `shares × price - cost`. Emptied positions are removed.
    pub fn sell(&mut self, order: Order) -> Result<&TradeRecord, ValtraderError> {
        let held = self.shares(&order.code);
        // Only a full liquidation may be an odd lot.
        if order.shares != held || held == 0 {
            self.check_quantity(&order.code, order.shares)?;
        }
        if held < order.shares {
            return Err(ValtraderError::InsufficientPosition {
                code: order.code,
                held,
                requested: order.shares,
            });
        }

        let gross = order.shares as f64 * order.price;
        let cost = order.cost.total;
        let net = gross - cost;

        self.cash += net;
        if held == order.shares {
            self.positions.remove(&order.code);
        } else if let Some(position) = self.positions.get_mut(&order.code) {
            position.shares -= order.shares;
        }

        Ok(self.push_trade(order, Side::Sell, gross, cost, net))
    }

    fn push_trade(&mut self, order: Order, side: Side, gross: f64, cost: f64, net: f64) -> &TradeRecord {
        let index = self.trades.len();
        self.trades.push(TradeRecord {
            date: order.date,
            code: order.code,
            side,
            shares: order.shares,
            price: order.price,
            gross,
            cost,
            net,
            reason: order.reason,
            snapshot: order.snapshot,
        });
        &self.trades[index]
    }

    /// Credit a cash dividend and scale the share count for bonus/transfer issues.
    ///
    /// Distributed shares are credited without any cash outlay.
    pub fn apply_corporate_action(
        &mut self,
        code: &str,
        action: &CorporateAction,
    ) -> CorporateActionOutcome {
        let Some(position) = self.positions.get_mut(code) else {
            return CorporateActionOutcome::default();
        };

        let cash_credited = if action.dividend_per_share > 0.0 {
            position.shares as f64 * action.dividend_per_share
        } else {
            0.0
        };
        let shares_added = position.scale(action.share_multiplier());

        self.cash += cash_credited;
        self.dividend_income += cash_credited;

        if cash_credited > 0.0 || shares_added > 0 {
            info!(code, cash_credited, shares_added, "applied corporate action");
        }
        CorporateActionOutcome {
            cash_credited,
            shares_added,
        }
    }

    /// cash + Σ shares × price. A held instrument without a price counts as zero.
    pub fn total_value(&self, prices: &BTreeMap<String, f64>) -> f64 {
        let holdings: f64 = self
            .positions
            .values()
            .map(|pos| match prices.get(&pos.code) {
                Some(&price) => pos.market_value(price),
                None => {
                    warn!(code = %pos.code, shares = pos.shares, "no price for held instrument, valuing at zero");
                    0.0
                }
            })
            .sum();
        self.cash + holdings
    }

    /// Append a mark-to-market snapshot for `date`.
    pub fn record_snapshot(
        &mut self,
        date: NaiveDate,
        prices: &BTreeMap<String, f64>,
    ) -> &PortfolioSnapshot {
        let total_value = self.total_value(prices);
        let positions = self
            .positions
            .values()
            .map(|pos| {
                let price = prices.get(&pos.code).copied().unwrap_or(0.0);
                PositionValue {
                    code: pos.code.clone(),
                    shares: pos.shares,
                    price,
                    market_value: pos.market_value(price),
                }
            })
            .collect();

        let index = self.snapshots.len();
        self.snapshots.push(PortfolioSnapshot {
            date,
            total_value,
            cash: self.cash,
            positions,
        });
        &self.snapshots[index]
    }
}

/// Round a fractional share amount down to whole lots.
pub fn lot_align(shares: f64, lot_size: u64) -> u64 {
    if !shares.is_finite() || shares <= 0.0 {
        return 0;
    }
    if lot_size == 0 {
        return shares.floor() as u64;
    }
    (shares / lot_size as f64).floor() as u64 * lot_size
}
