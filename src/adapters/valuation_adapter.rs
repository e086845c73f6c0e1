//! CSV-backed valuation and industry threshold tables.
//!
//! The universe file lists `code,weight,fair_value,industry`, with a `CASH`
//! row carrying the cash weight. The optional thresholds file lists
//! `industry,oversold,overbought,extreme_oversold,extreme_overbought`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::error::ValtraderError;
use crate::domain::universe::{CASH_CODE, Universe};
use crate::domain::valuation::IndustryThresholds;
use crate::ports::valuation_port::ValuationPort;

#[derive(Debug, Clone, Default)]
pub struct CsvValuationAdapter {
    universe: Universe,
    fair_values: BTreeMap<String, f64>,
    industries: BTreeMap<String, String>,
    thresholds: BTreeMap<String, IndustryThresholds>,
}

impl CsvValuationAdapter {
    pub fn from_files(
        universe_path: &Path,
        thresholds_path: Option<&Path>,
    ) -> Result<Self, ValtraderError> {
        let universe_csv = read(universe_path)?;
        let thresholds_csv = match thresholds_path {
            Some(path) => Some(read(path)?),
            None => None,
        };
        Self::from_strings(&universe_csv, thresholds_csv.as_deref())
    }

    pub fn from_strings(
        universe_csv: &str,
        thresholds_csv: Option<&str>,
    ) -> Result<Self, ValtraderError> {
        let mut adapter = CsvValuationAdapter::default();
        let mut entries = Vec::new();

        let mut rdr = csv::Reader::from_reader(universe_csv.as_bytes());
        for result in rdr.records() {
            let record = result?;
            let code = cell(&record, 0).ok_or_else(|| ValtraderError::Data {
                reason: "universe row without code".into(),
            })?;
            let weight = number(&record, 1, "weight")?.unwrap_or(0.0);
            entries.push((code.to_string(), weight));

            if code.eq_ignore_ascii_case(CASH_CODE) {
                continue;
            }
            match number(&record, 2, "fair_value")? {
                Some(fv) if fv > 0.0 => {
                    adapter.fair_values.insert(code.to_string(), fv);
                }
                Some(fv) => warn!(code, fair_value = fv, "ignoring non-positive fair value"),
                None => {}
            }
            if let Some(industry) = cell(&record, 3) {
                adapter
                    .industries
                    .insert(code.to_string(), industry.to_string());
            }
        }
        adapter.universe = Universe::from_entries(entries)?;

        if let Some(content) = thresholds_csv {
            let mut rdr = csv::Reader::from_reader(content.as_bytes());
            for result in rdr.records() {
                let record = result?;
                let Some(industry) = cell(&record, 0) else {
                    continue;
                };
                let value = |i: usize, name: &str| -> Result<f64, ValtraderError> {
                    number(&record, i, name)?.ok_or_else(|| ValtraderError::Data {
                        reason: format!("missing {name} for industry {industry}"),
                    })
                };
                let thresholds = IndustryThresholds {
                    oversold: value(1, "oversold")?,
                    overbought: value(2, "overbought")?,
                    extreme_oversold: value(3, "extreme_oversold")?,
                    extreme_overbought: value(4, "extreme_overbought")?,
                };
                if !thresholds.is_ordered() {
                    warn!(industry, ?thresholds, "ignoring unordered RSI thresholds");
                    continue;
                }
                adapter.thresholds.insert(industry.to_string(), thresholds);
            }
        }

        debug!(
            instruments = adapter.universe.count(),
            fair_values = adapter.fair_values.len(),
            industries = adapter.thresholds.len(),
            "loaded valuation tables"
        );
        Ok(adapter)
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }
}

impl ValuationPort for CsvValuationAdapter {
    fn fair_value(&self, code: &str) -> Option<f64> {
        self.fair_values.get(code).copied()
    }

    fn industry(&self, code: &str) -> Option<String> {
        self.industries.get(code).cloned()
    }

    fn industry_thresholds(&self, industry: &str) -> Option<IndustryThresholds> {
        self.thresholds.get(industry).copied()
    }
}

fn read(path: &Path) -> Result<String, ValtraderError> {
    fs::read_to_string(path).map_err(|e| ValtraderError::Data {
        reason: format!("failed to read {}: {}", path.display(), e),
    })
}

fn cell(record: &StringRecord, index: usize) -> Option<&str> {
    record.get(index).map(str::trim).filter(|s| !s.is_empty())
}

fn number(record: &StringRecord, index: usize, name: &str) -> Result<Option<f64>, ValtraderError> {
    cell(record, index)
        .map(|s| {
            s.parse::<f64>().map_err(|e| ValtraderError::Data {
                reason: format!("invalid {name} value {s:?}: {e}"),
            })
        })
        .transpose()
}
