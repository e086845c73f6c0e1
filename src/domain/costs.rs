//! Transaction cost model.
//!
//! Every trade pays commission (with a per-trade floor) and slippage.
//! Sells also pay stamp tax; Shanghai-listed instruments pay a transfer fee.

use std::fmt;

use super::ledger::TradeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Shanghai,
    Other,
}

impl Exchange {
    /// Shanghai main-board and STAR codes begin with `6`.
    pub fn from_code(code: &str) -> Self {
        if code.starts_with('6') {
            Exchange::Shanghai
        } else {
            Exchange::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostConfig {
    pub buy_commission_rate: f64,
    pub sell_commission_rate: f64,
    pub min_commission: f64,
    pub stamp_tax_rate: f64,
    pub transfer_fee_rate: f64,
    pub slippage_rate: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        CostConfig {
            buy_commission_rate: 0.0003,
            sell_commission_rate: 0.0003,
            min_commission: 5.0,
            stamp_tax_rate: 0.001,
            transfer_fee_rate: 0.00002,
            slippage_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostBreakdown {
    pub gross: f64,
    pub commission: f64,
    pub transfer_fee: f64,
    pub stamp_tax: f64,
    pub slippage: f64,
    pub total: f64,
    /// total / gross, 0 when gross is 0.
    pub cost_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionCostModel {
    pub config: CostConfig,
}

impl TransactionCostModel {
    pub fn new(config: CostConfig) -> Self {
        TransactionCostModel { config }
    }

    pub fn calculate(&self, side: Side, shares: u64, price: f64, exchange: Exchange) -> CostBreakdown {
        if shares == 0 {
            return CostBreakdown::default();
        }

        let cfg = &self.config;
        let gross = shares as f64 * price;

        let rate = match side {
            Side::Buy => cfg.buy_commission_rate,
            Side::Sell => cfg.sell_commission_rate,
        };
        let commission = (gross * rate).max(cfg.min_commission);

        let transfer_fee = match exchange {
            Exchange::Shanghai => gross * cfg.transfer_fee_rate,
            Exchange::Other => 0.0,
        };

        let stamp_tax = match side {
            Side::Sell => gross * cfg.stamp_tax_rate,
            Side::Buy => 0.0,
        };

        let slippage = gross * cfg.slippage_rate;
        let total = commission + transfer_fee + stamp_tax + slippage;
        let cost_rate = if gross > 0.0 { total / gross } else { 0.0 };

        CostBreakdown {
            gross,
            commission,
            transfer_fee,
            stamp_tax,
            slippage,
            total,
            cost_rate,
        }
    }

    /// Convenience wrapper inferring the exchange from the instrument code.
    pub fn calculate_for(&self, side: Side, code: &str, shares: u64, price: f64) -> CostBreakdown {
        self.calculate(side, shares, price, Exchange::from_code(code))
    }
}

/// Aggregate cost figures over a trade log.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CostSummary {
    pub buy_count: usize,
    pub sell_count: usize,
    pub buy_gross: f64,
    pub sell_gross: f64,
    pub buy_cost: f64,
    pub sell_cost: f64,
    pub total_cost: f64,
    /// total_cost / (buy_gross + sell_gross), 0 when nothing traded.
    pub cost_rate: f64,
}

impl CostSummary {
    pub fn from_trades(trades: &[TradeRecord]) -> Self {
        let mut summary = CostSummary::default();
        for trade in trades {
            match trade.side {
                Side::Buy => {
                    summary.buy_count += 1;
                    summary.buy_gross += trade.gross;
                    summary.buy_cost += trade.cost;
                }
                Side::Sell => {
                    summary.sell_count += 1;
                    summary.sell_gross += trade.gross;
                    summary.sell_cost += trade.cost;
                }
            }
        }
        summary.total_cost = summary.buy_cost + summary.sell_cost;
        let turnover = summary.buy_gross + summary.sell_gross;
        summary.cost_rate = if turnover > 0.0 {
            summary.total_cost / turnover
        } else {
            0.0
        };
        summary
    }
}
