//! Configuration validation.
//!
//! Validates all config fields before a backtest runs. Absent keys fall back
//! to their defaults, so only present-but-invalid values and missing required
//! keys are rejected.

use crate::domain::error::ValtraderError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    validate_backtest_config(config)?;
    validate_signal_config(config)?;
    validate_indicator_config(config)?;
    validate_sizing_config(config)?;
    validate_cost_config(config)?;
    validate_logging_config(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    validate_frequency(config)?;
    require_string(config, "backtest", "data_dir")?;
    require_string(config, "backtest", "universe_file")?;
    check(
        config,
        "backtest",
        "periods_per_year",
        52.0,
        |v| v > 0.0,
        "periods_per_year must be positive",
    )?;
    Ok(())
}

pub fn validate_signal_config(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    let min_history = config.get_int("signal", "min_history", 60);
    if min_history < 3 {
        return Err(invalid("signal", "min_history", "min_history must be at least 3"));
    }
    let buy = config.get_double("signal", "value_ratio_buy_threshold", 0.70);
    let sell = config.get_double("signal", "value_ratio_sell_threshold", 0.80);
    if buy <= 0.0 {
        return Err(invalid(
            "signal",
            "value_ratio_buy_threshold",
            "value_ratio_buy_threshold must be positive",
        ));
    }
    if sell < buy {
        return Err(invalid(
            "signal",
            "value_ratio_sell_threshold",
            "value_ratio_sell_threshold must not be below value_ratio_buy_threshold",
        ));
    }
    for key in ["volume_sell_multiplier", "volume_buy_multiplier", "trend_flat_threshold"] {
        check(config, "signal", key, 0.0, |v| v >= 0.0, "must be non-negative")?;
    }
    if config.get_int("signal", "trend_periods", 8) < 2 {
        return Err(invalid("signal", "trend_periods", "trend_periods must be at least 2"));
    }
    Ok(())
}

pub fn validate_indicator_config(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    for (key, default) in [
        ("ema_period", 20),
        ("rsi_period", 14),
        ("macd_fast", 12),
        ("macd_slow", 26),
        ("macd_signal", 9),
        ("bb_period", 20),
        ("volume_ma_period", 4),
        ("divergence_lookback", 13),
    ] {
        if config.get_int("indicators", key, default) < 1 {
            return Err(invalid("indicators", key, "period must be at least 1"));
        }
    }
    if config.get_int("indicators", "macd_fast", 12) >= config.get_int("indicators", "macd_slow", 26) {
        return Err(invalid("indicators", "macd_fast", "macd_fast must be below macd_slow"));
    }
    check(config, "indicators", "bb_stddev", 2.0, |v| v > 0.0, "bb_stddev must be positive")?;
    Ok(())
}

pub fn validate_sizing_config(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    if config.get_int("sizing", "lot_size", 100) < 1 {
        return Err(invalid("sizing", "lot_size", "lot_size must be at least 1"));
    }
    check(
        config,
        "sizing",
        "max_single_weight",
        0.20,
        |v| v > 0.0 && v <= 1.0,
        "max_single_weight must be in (0, 1]",
    )?;
    check(
        config,
        "sizing",
        "cash_fallback_ratio",
        0.80,
        |v| v > 0.0 && v <= 1.0,
        "cash_fallback_ratio must be in (0, 1]",
    )?;
    check(
        config,
        "sizing",
        "fixed_ratio_fallback",
        0.0,
        |v| (0.0..=1.0).contains(&v),
        "fixed_ratio_fallback must be in [0, 1]",
    )?;
    for tier in ["extreme_undervalue", "obvious_undervalue", "slight_undervalue"] {
        for suffix in ["add_ratio", "new_ratio", "max_position"] {
            let key = format!("{tier}_{suffix}");
            check(config, "sizing", &key, 0.0, |v| (0.0..=1.0).contains(&v), "must be in [0, 1]")?;
        }
    }
    for tier in [
        "extreme_overvalue",
        "obvious_overvalue",
        "slight_overvalue",
        "fair_value",
    ] {
        let key = format!("{tier}_sell_ratio");
        check(config, "sizing", &key, 0.0, |v| (0.0..=1.0).contains(&v), "must be in [0, 1]")?;
    }
    Ok(())
}

pub fn validate_cost_config(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    for key in [
        "buy_commission_rate",
        "sell_commission_rate",
        "stamp_tax_rate",
        "transfer_fee_rate",
        "slippage_rate",
    ] {
        check(config, "costs", key, 0.0, |v| (0.0..1.0).contains(&v), "rate must be in [0, 1)")?;
    }
    check(
        config,
        "costs",
        "min_commission",
        0.0,
        |v| v >= 0.0,
        "min_commission must be non-negative",
    )?;
    Ok(())
}

pub fn validate_logging_config(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    if let Some(format) = config.get_string("logging", "format") {
        format
            .parse::<crate::logging::LogFormat>()
            .map_err(|reason| invalid("logging", "format", &reason))?;
    }
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    let value = config.get_double("backtest", "initial_capital", 0.0);
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }

    if let Some(warmup) = config.get_string("backtest", "warmup_start") {
        let warmup_date = parse_date(Some(&warmup), "warmup_start")?;
        if warmup_date > start_date {
            return Err(invalid(
                "backtest",
                "warmup_start",
                "warmup_start must not be after start_date",
            ));
        }
    }
    Ok(())
}

fn validate_frequency(config: &dyn ConfigPort) -> Result<(), ValtraderError> {
    if let Some(value) = config.get_string("backtest", "frequency") {
        value
            .parse::<crate::domain::backtest::Frequency>()
            .map_err(|reason| invalid("backtest", "frequency", &reason))?;
    }
    Ok(())
}

pub(crate) fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, ValtraderError> {
    match value {
        None => Err(ValtraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            ValtraderError::ConfigInvalid {
                section: "backtest".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            }
        }),
    }
}

fn require_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), ValtraderError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(ValtraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Reject a numeric value that is present and fails `valid`.
fn check(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
    valid: impl Fn(f64) -> bool,
    reason: &str,
) -> Result<(), ValtraderError> {
    let value = config.get_double(section, key, default);
    if !value.is_finite() || !valid(value) {
        return Err(invalid(section, key, reason));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> ValtraderError {
    ValtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    const BASE: &str = "[backtest]\ninitial_capital = 1000000\nstart_date = 2020-01-01\nend_date = 2024-12-31\ndata_dir = data\nuniverse_file = universe.csv\n";

    fn make_config(extra: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(&format!("{BASE}{extra}")).unwrap()
    }

    fn invalid_key(err: ValtraderError) -> String {
        match err {
            ValtraderError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn valid_minimal_config_passes() {
        assert!(validate_config(&make_config("")).is_ok());
    }

    #[test]
    fn valid_full_config_passes() {
        let config = make_config(
            r#"warmup_start = 2018-01-01
frequency = weekly
risk_free_rate = 0.03

[signal]
min_history = 60
value_ratio_buy_threshold = 0.7
value_ratio_sell_threshold = 0.8

[sizing]
lot_size = 100
max_single_weight = 0.2
extreme_undervalue_add_ratio = 0.5

[costs]
buy_commission_rate = 0.0003
min_commission = 5

[logging]
format = json
"#,
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = FileConfigAdapter::from_string(
            "[backtest]\ninitial_capital = 0\nstart_date = 2020-01-01\nend_date = 2024-12-31\n",
        )
        .unwrap();
        let err = validate_backtest_config(&config).unwrap_err();
        assert_eq!(invalid_key(err), "initial_capital");
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = FileConfigAdapter::from_string(
            "[backtest]\ninitial_capital = 100\nstart_date = 2025-01-01\nend_date = 2024-12-31\n",
        )
        .unwrap();
        assert_eq!(invalid_key(validate_backtest_config(&config).unwrap_err()), "start_date");
    }

    #[test]
    fn missing_end_date_fails() {
        let config =
            FileConfigAdapter::from_string("[backtest]\ninitial_capital = 100\nstart_date = 2020-01-01\n")
                .unwrap();
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, ValtraderError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn missing_universe_file_fails() {
        let config = FileConfigAdapter::from_string(
            "[backtest]\ninitial_capital = 100\nstart_date = 2020-01-01\nend_date = 2024-12-31\ndata_dir = d\n",
        )
        .unwrap();
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, ValtraderError::ConfigMissing { key, .. } if key == "universe_file"));
    }

    #[test]
    fn warmup_after_start_fails() {
        let err = validate_config(&make_config("warmup_start = 2021-01-01\n")).unwrap_err();
        assert_eq!(invalid_key(err), "warmup_start");
    }

    #[test]
    fn unknown_frequency_fails() {
        let err = validate_config(&make_config("frequency = monthly\n")).unwrap_err();
        assert_eq!(invalid_key(err), "frequency");
    }

    #[test]
    fn inverted_value_thresholds_fail() {
        let err = validate_config(&make_config(
            "[signal]\nvalue_ratio_buy_threshold = 0.9\nvalue_ratio_sell_threshold = 0.8\n",
        ))
        .unwrap_err();
        assert_eq!(invalid_key(err), "value_ratio_sell_threshold");
    }

    #[test]
    fn macd_fast_must_be_below_slow() {
        let err = validate_config(&make_config("[indicators]\nmacd_fast = 30\n")).unwrap_err();
        assert_eq!(invalid_key(err), "macd_fast");
    }

    #[test]
    fn sizing_ratios_bounded() {
        let err = validate_config(&make_config("[sizing]\nmax_single_weight = 1.5\n")).unwrap_err();
        assert_eq!(invalid_key(err), "max_single_weight");
        let err = validate_config(&make_config("[sizing]\nfair_value_sell_ratio = 2\n")).unwrap_err();
        assert_eq!(invalid_key(err), "fair_value_sell_ratio");
        let err = validate_config(&make_config("[sizing]\nlot_size = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "lot_size");
    }

    #[test]
    fn negative_cost_rate_fails() {
        let err = validate_config(&make_config("[costs]\nstamp_tax_rate = -0.001\n")).unwrap_err();
        assert_eq!(invalid_key(err), "stamp_tax_rate");
    }

    #[test]
    fn unknown_log_format_fails() {
        let err = validate_config(&make_config("[logging]\nformat = xml\n")).unwrap_err();
        assert_eq!(invalid_key(err), "format");
    }
}
