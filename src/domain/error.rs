//! Domain error types.

/// Top-level error type for valtrader.
#[derive(Debug, thiserror::Error)]
pub enum ValtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("insufficient data for {code}: have {bars} bars, need {minimum}")]
    InsufficientData {
        code: String,
        bars: usize,
        minimum: usize,
    },

    #[error("invalid valuation for {code}: {reason}")]
    InvalidValuation { code: String, reason: String },

    #[error("insufficient cash: need {required:.2}, have {available:.2}")]
    InsufficientCash { required: f64, available: f64 },

    #[error("insufficient position in {code}: hold {held}, requested {requested}")]
    InsufficientPosition {
        code: String,
        held: u64,
        requested: u64,
    },

    #[error("invalid quantity {shares} for {code}: {reason}")]
    InvalidQuantity {
        code: String,
        shares: u64,
        reason: String,
    },

    #[error("data preparation failed: {reason}")]
    DataPreparation { reason: String },

    #[error("backtest cancelled at {date}")]
    Cancelled { date: chrono::NaiveDate },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&ValtraderError> for std::process::ExitCode {
    fn from(err: &ValtraderError) -> Self {
        let code: u8 = match err {
            ValtraderError::Io(_) | ValtraderError::Csv(_) => 1,
            ValtraderError::ConfigParse { .. }
            | ValtraderError::ConfigMissing { .. }
            | ValtraderError::ConfigInvalid { .. } => 2,
            ValtraderError::Data { .. } | ValtraderError::DataPreparation { .. } => 3,
            ValtraderError::InsufficientData { .. } | ValtraderError::InvalidValuation { .. } => 5,
            ValtraderError::InsufficientCash { .. }
            | ValtraderError::InsufficientPosition { .. }
            | ValtraderError::InvalidQuantity { .. } => 6,
            ValtraderError::Cancelled { .. } => 130,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_kind() {
        let code = |err: ValtraderError| format!("{:?}", std::process::ExitCode::from(&err));
        let fmt = |n: u8| format!("{:?}", std::process::ExitCode::from(n));
        assert_eq!(
            code(ValtraderError::DataPreparation {
                reason: "feed down".into(),
            }),
            fmt(3)
        );
        assert_eq!(
            code(ValtraderError::Cancelled {
                date: chrono::NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            }),
            fmt(130)
        );
    }

    #[test]
    fn display_messages() {
        let err = ValtraderError::InsufficientPosition {
            code: "600000".into(),
            held: 100,
            requested: 200,
        };
        assert_eq!(
            err.to_string(),
            "insufficient position in 600000: hold 100, requested 200"
        );

        let err = ValtraderError::ConfigMissing {
            section: "backtest".into(),
            key: "start_date".into(),
        };
        assert_eq!(err.to_string(), "missing config key [backtest] start_date");
    }
}
