//! A held position in one instrument.

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub code: String,
    pub shares: u64,
    /// Cost-inclusive average price paid per share.
    pub average_cost: f64,
}

impl Position {
    pub fn new(code: impl Into<String>, shares: u64, average_cost: f64) -> Self {
        Position {
            code: code.into(),
            shares,
            average_cost,
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.shares as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.shares as f64 * (price - self.average_cost)
    }

    /// Add shares bought for `outlay` (gross plus costs).
    pub fn add(&mut self, shares: u64, outlay: f64) {
        let total = self.shares + shares;
        if total > 0 {
            self.average_cost = (self.average_cost * self.shares as f64 + outlay) / total as f64;
        }
        self.shares = total;
    }

    /// Scale the share count after a bonus or transfer issue, flooring to whole shares.
    ///
    /// Returns the number of shares added.
    pub fn scale(&mut self, multiplier: f64) -> u64 {
        if multiplier <= 1.0 || self.shares == 0 {
            return 0;
        }
        let scaled = (self.shares as f64 * multiplier).floor() as u64;
        let added = scaled.saturating_sub(self.shares);
        if scaled > 0 {
            self.average_cost = self.average_cost * self.shares as f64 / scaled as f64;
        }
        self.shares = scaled;
        added
    }
}
