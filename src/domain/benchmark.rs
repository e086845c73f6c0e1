//! Buy-and-hold benchmark over the same universe and timeline.
//!
//! Starts from the same initial weights and lot rounding as the strategy,
//! never trades, and collects dividends and bonus/transfer shares.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::code_data::CodeData;
use crate::domain::error::ValtraderError;
use crate::domain::ledger::PortfolioLedger;
use crate::domain::universe::Universe;

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub start_value: f64,
    pub end_value: f64,
    pub dividend_income: f64,
    pub total_return: f64,
    pub curve: Vec<BenchmarkPoint>,
}

pub fn buy_and_hold(
    data: &[CodeData],
    universe: &Universe,
    timeline: &[NaiveDate],
    capital: f64,
    lot_size: u64,
) -> Result<BenchmarkResult, ValtraderError> {
    let mut prices: BTreeMap<String, f64> = BTreeMap::new();
    let mut ledger: Option<PortfolioLedger> = None;
    let mut curve = Vec::with_capacity(timeline.len());

    for &date in timeline {
        for cd in data {
            if let Some(close) = cd.close_on_or_before(date) {
                prices.insert(cd.code.clone(), close);
            }
        }
        if ledger.is_none() {
            ledger = Some(PortfolioLedger::initialize(
                capital,
                &universe.weights,
                &prices,
                lot_size,
            )?);
        }
        let Some(book) = ledger.as_mut() else {
            continue;
        };
        for cd in data {
            if let Some(action) = cd.get_bar(date).and_then(|bar| bar.corporate_action) {
                book.apply_corporate_action(&cd.code, &action);
            }
        }
        curve.push(BenchmarkPoint {
            date,
            value: book.total_value(&prices),
        });
    }

    let start_value = curve.first().map_or(capital, |p| p.value);
    let end_value = curve.last().map_or(capital, |p| p.value);
    let total_return = if capital > 0.0 {
        (end_value - capital) / capital
    } else {
        0.0
    };

    Ok(BenchmarkResult {
        start_value,
        end_value,
        dividend_income: ledger.as_ref().map_or(0.0, PortfolioLedger::dividend_income),
        total_return,
        curve,
    })
}
