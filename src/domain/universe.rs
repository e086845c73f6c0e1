//! Instrument universe with initial portfolio weights.

use std::collections::BTreeMap;

use crate::domain::error::ValtraderError;

/// Code reserved for the cash row of a universe table.
pub const CASH_CODE: &str = "CASH";

const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Universe {
    /// Instrument code to initial weight, ordered by code.
    pub weights: BTreeMap<String, f64>,
    pub cash_weight: f64,
}

impl Universe {
    /// Build a universe from `(code, weight)` rows.
    ///
    /// A row whose code is `CASH` (any case) sets the cash weight. Codes are
    /// trimmed and must be unique; weights must be non-negative and sum to at
    /// most 1 including cash.
    pub fn from_entries<I>(entries: I) -> Result<Self, ValtraderError>
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut universe = Universe::default();
        let mut saw_cash = false;

        for (raw_code, weight) in entries {
            let code = raw_code.trim().to_string();
            if code.is_empty() {
                return Err(invalid("code", "empty instrument code".into()));
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid("weight", format!("invalid weight {weight} for {code}")));
            }
            if code.eq_ignore_ascii_case(CASH_CODE) {
                if saw_cash {
                    return Err(invalid("code", "duplicate CASH row".into()));
                }
                saw_cash = true;
                universe.cash_weight = weight;
                continue;
            }
            if universe.weights.insert(code.clone(), weight).is_some() {
                return Err(invalid("code", format!("duplicate code: {code}")));
            }
        }

        let total = universe.total_weight();
        if total > 1.0 + WEIGHT_EPSILON {
            return Err(invalid("weight", format!("weights sum to {total:.6}, above 1")));
        }
        Ok(universe)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn count(&self) -> usize {
        self.weights.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum::<f64>() + self.cash_weight
    }
}

fn invalid(key: &str, reason: String) -> ValtraderError {
    ValtraderError::ConfigInvalid {
        section: "universe".into(),
        key: key.into(),
        reason,
    }
}
