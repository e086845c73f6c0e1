//! Valuation-tiered dynamic position sizing.
//!
//! Buys are sized from the valuation tier the price/value ratio falls into,
//! then capped by the tier limit and the portfolio-wide single-instrument
//! weight. Sells liquidate a tier-dependent fraction of the holding. All
//! quantities are whole lots.

use tracing::debug;

use crate::domain::signal::SignalKind;

#[derive(Debug, Clone, PartialEq)]
pub struct BuyTier {
    pub name: String,
    /// Inclusive upper bound on the price/value ratio.
    pub max_ratio: f64,
    /// Fraction of the current position value to add when already held.
    pub add_ratio: f64,
    /// Fraction of total assets to open with when not held.
    pub new_ratio: f64,
    /// Per-trade cap as a fraction of total assets.
    pub max_position_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellTier {
    pub name: String,
    /// Exclusive lower bound on the price/value ratio.
    pub min_ratio: f64,
    /// Inclusive upper bound; `f64::INFINITY` for the top tier.
    pub max_ratio: f64,
    /// Fraction of held shares to sell.
    pub sell_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizingConfig {
    pub lot_size: u64,
    pub max_single_weight: f64,
    pub cash_fallback_ratio: f64,
    /// Fraction traded when no valuation is available; 0 disables.
    pub fixed_ratio_fallback: f64,
    /// Ordered by ascending `max_ratio`; the first match wins.
    pub buy_tiers: Vec<BuyTier>,
    pub sell_tiers: Vec<SellTier>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig {
            lot_size: 100,
            max_single_weight: 0.20,
            cash_fallback_ratio: 0.80,
            fixed_ratio_fallback: 0.0,
            buy_tiers: vec![
                BuyTier {
                    name: "extreme_undervalue".into(),
                    max_ratio: 0.60,
                    add_ratio: 0.50,
                    new_ratio: 0.15,
                    max_position_ratio: 0.15,
                },
                BuyTier {
                    name: "obvious_undervalue".into(),
                    max_ratio: 0.70,
                    add_ratio: 0.20,
                    new_ratio: 0.10,
                    max_position_ratio: 0.10,
                },
                BuyTier {
                    name: "slight_undervalue".into(),
                    max_ratio: 0.80,
                    add_ratio: 0.10,
                    new_ratio: 0.05,
                    max_position_ratio: 0.05,
                },
            ],
            sell_tiers: vec![
                SellTier {
                    name: "extreme_overvalue".into(),
                    min_ratio: 1.20,
                    max_ratio: f64::INFINITY,
                    sell_ratio: 1.00,
                },
                SellTier {
                    name: "obvious_overvalue".into(),
                    min_ratio: 1.00,
                    max_ratio: 1.20,
                    sell_ratio: 0.80,
                },
                SellTier {
                    name: "slight_overvalue".into(),
                    min_ratio: 0.80,
                    max_ratio: 1.00,
                    sell_ratio: 0.50,
                },
                SellTier {
                    name: "fair_value".into(),
                    min_ratio: 0.70,
                    max_ratio: 0.80,
                    sell_ratio: 0.20,
                },
            ],
        }
    }
}

impl SizingConfig {
    pub fn buy_tier(&self, ratio: f64) -> Option<&BuyTier> {
        self.buy_tiers.iter().find(|t| ratio <= t.max_ratio)
    }

    pub fn sell_tier(&self, ratio: f64) -> Option<&SellTier> {
        self.sell_tiers
            .iter()
            .find(|t| ratio > t.min_ratio && ratio <= t.max_ratio)
    }

    /// Round a share count down to whole lots.
    pub fn lot_floor(&self, shares: f64) -> u64 {
        if !shares.is_finite() || shares <= 0.0 || self.lot_size == 0 {
            return 0;
        }
        (shares as u64 / self.lot_size) * self.lot_size
    }
}

/// Ledger state the sizer reads for one instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingInput {
    pub signal: SignalKind,
    /// `None` when no valuation is available for the instrument.
    pub value_ratio: Option<f64>,
    pub held_shares: u64,
    pub price: f64,
    pub available_cash: f64,
    pub total_assets: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizingDecision {
    pub action: SignalKind,
    pub shares: u64,
    pub estimated_amount: f64,
    pub tier: Option<String>,
    pub reason: String,
}

impl PositionSizingDecision {
    fn hold(reason: impl Into<String>) -> Self {
        PositionSizingDecision {
            action: SignalKind::Hold,
            shares: 0,
            estimated_amount: 0.0,
            tier: None,
            reason: reason.into(),
        }
    }

    fn hold_in_tier(tier: &str, reason: impl Into<String>) -> Self {
        PositionSizingDecision {
            tier: Some(tier.to_string()),
            ..Self::hold(reason)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionSizer {
    pub config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        PositionSizer { config }
    }

    pub fn size(&self, input: &SizingInput) -> PositionSizingDecision {
        if !input.price.is_finite() || input.price <= 0.0 {
            return PositionSizingDecision::hold("invalid price");
        }
        let decision = match (input.signal, input.value_ratio) {
            (SignalKind::Hold, _) => PositionSizingDecision::hold("hold signal"),
            (_, Some(ratio)) if !ratio.is_finite() || ratio <= 0.0 => {
                PositionSizingDecision::hold("invalid valuation ratio")
            }
            (SignalKind::Sell, Some(ratio)) => self.size_sell(input, ratio),
            (SignalKind::Buy, Some(ratio)) => self.size_buy(input, ratio),
            (side, None) => self.size_fixed(input, side),
        };
        debug!(
            signal = %input.signal,
            action = %decision.action,
            shares = decision.shares,
            tier = ?decision.tier,
            reason = %decision.reason,
            "sized"
        );
        decision
    }

    fn size_buy(&self, input: &SizingInput, ratio: f64) -> PositionSizingDecision {
        let cfg = &self.config;
        let Some(tier) = cfg.buy_tier(ratio) else {
            return PositionSizingDecision::hold(format!(
                "ratio {ratio:.3} above every buy tier"
            ));
        };

        let position_value = input.held_shares as f64 * input.price;
        let mut base = if input.held_shares > 0 {
            position_value * tier.add_ratio
        } else {
            input.total_assets * tier.new_ratio
        };
        if input.available_cash < base {
            base = input.available_cash * cfg.cash_fallback_ratio;
        }
        base = base.min(input.total_assets * tier.max_position_ratio);
        let base_shares = cfg.lot_floor(base / input.price);

        self.finish_buy(input, base_shares, Some(&tier.name))
    }

    fn size_sell(&self, input: &SizingInput, ratio: f64) -> PositionSizingDecision {
        if input.held_shares == 0 {
            return PositionSizingDecision::hold("no position to sell");
        }
        let Some(tier) = self.config.sell_tier(ratio) else {
            return PositionSizingDecision::hold(format!(
                "ratio {ratio:.3} below every sell tier"
            ));
        };
        self.finish_sell(input, tier.sell_ratio, Some(&tier.name))
    }

    fn size_fixed(&self, input: &SizingInput, side: SignalKind) -> PositionSizingDecision {
        let fraction = self.config.fixed_ratio_fallback;
        if fraction <= 0.0 {
            return PositionSizingDecision::hold("no valuation available");
        }
        match side {
            SignalKind::Sell if input.held_shares == 0 => {
                PositionSizingDecision::hold("no position to sell")
            }
            SignalKind::Sell => self.finish_sell(input, fraction, None),
            _ => {
                let base = if input.held_shares > 0 {
                    input.held_shares as f64 * input.price * fraction
                } else {
                    input.available_cash * fraction
                };
                let base_shares = self.config.lot_floor(base / input.price);
                self.finish_buy(input, base_shares, None)
            }
        }
    }

    /// Apply the single-instrument weight cap and the cash check.
    fn finish_buy(
        &self,
        input: &SizingInput,
        base_shares: u64,
        tier: Option<&str>,
    ) -> PositionSizingDecision {
        let cfg = &self.config;
        let hold = |reason: String| match tier {
            Some(name) => PositionSizingDecision::hold_in_tier(name, reason),
            None => PositionSizingDecision::hold(reason),
        };

        let position_value = input.held_shares as f64 * input.price;
        let headroom = cfg.max_single_weight * input.total_assets - position_value;
        if headroom <= 0.0 {
            return hold("single-instrument weight limit reached".to_string());
        }
        let cap_shares = cfg.lot_floor(headroom / input.price);
        let shares = base_shares.min(cap_shares);
        if shares < cfg.lot_size.max(1) {
            return hold("buy size below one lot".to_string());
        }
        let amount = shares as f64 * input.price;
        if amount > input.available_cash {
            return hold(format!(
                "insufficient cash: need {amount:.2}, have {:.2}",
                input.available_cash
            ));
        }

        PositionSizingDecision {
            action: SignalKind::Buy,
            shares,
            estimated_amount: amount,
            tier: tier.map(str::to_string),
            reason: match tier {
                Some(name) => format!("{name}: buy {shares} shares"),
                None => format!("fixed ratio: buy {shares} shares"),
            },
        }
    }

    fn finish_sell(
        &self,
        input: &SizingInput,
        fraction: f64,
        tier: Option<&str>,
    ) -> PositionSizingDecision {
        // A full liquidation also clears any odd-lot remainder.
        let shares = if fraction >= 1.0 {
            input.held_shares
        } else {
            self.config
                .lot_floor(input.held_shares as f64 * fraction)
                .min(input.held_shares)
        };
        if shares == 0 || (shares < self.config.lot_size && shares != input.held_shares) {
            let reason = "sell size below one lot";
            return match tier {
                Some(name) => PositionSizingDecision::hold_in_tier(name, reason),
                None => PositionSizingDecision::hold(reason),
            };
        }
        PositionSizingDecision {
            action: SignalKind::Sell,
            shares,
            estimated_amount: shares as f64 * input.price,
            tier: tier.map(str::to_string),
            reason: match tier {
                Some(name) => format!("{name}: sell {shares} of {} shares", input.held_shares),
                None => format!("fixed ratio: sell {shares} of {} shares", input.held_shares),
            },
        }
    }
}
