//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvBarAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::valuation_adapter::CsvValuationAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestLoop, Frequency, SignalOutcome};
use crate::domain::config_validation::{parse_date, validate_config};
use crate::domain::costs::{CostConfig, TransactionCostModel};
use crate::domain::error::ValtraderError;
use crate::domain::indicator::{IndicatorConfig, StandardIndicators};
use crate::domain::metrics::Metrics;
use crate::domain::signal::{ScorerConfig, SignalScorer};
use crate::domain::sizing::{PositionSizer, SizingConfig};
use crate::domain::universe::Universe;
use crate::domain::valuation::{IndustryThresholds, ThresholdResolver, ValuationContext};
use crate::logging::{init_logging, LogConfig, LogFormat};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::indicator_port::IndicatorPort;
use crate::ports::report_port::ReportPort;
use crate::ports::valuation_port::ValuationPort;

#[derive(Parser, Debug)]
#[command(name = "valtrader", about = "Valuation-aware weekly backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest and write the trade log and equity curve
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the signal breakdown for one instrument on one date
    Explain {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
        /// YYYY-MM-DD; the last bar on or before it is scored
        #[arg(long)]
        date: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest { config, output } => run_backtest(&config, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Explain { config, code, date } => run_explain(&config, &code, &date),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Load, validate and install logging for a config file.
fn load_validated(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    let adapter = load_config(path)?;
    if let Err(e) = validate_config(&adapter) {
        eprintln!("error: {e}");
        return Err((&e).into());
    }
    if let Err(e) = init_logging(&build_log_config(&adapter)) {
        eprintln!("warning: logging not initialised: {e}");
    }
    Ok(adapter)
}

/// Resolve a configured path against the config file's directory.
pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value.trim());
    if path.is_absolute() {
        return path;
    }
    config_path
        .parent()
        .map_or_else(|| path.clone(), |dir| dir.join(&path))
}

fn required_string(adapter: &dyn ConfigPort, section: &str, key: &str) -> Result<String, ValtraderError> {
    adapter
        .get_string(section, key)
        .ok_or_else(|| ValtraderError::ConfigMissing {
            section: section.into(),
            key: key.into(),
        })
}

/// Data and valuation adapters named by the `[backtest]` section.
pub fn build_adapters(
    config_path: &Path,
    adapter: &dyn ConfigPort,
) -> Result<(CsvBarAdapter, CsvValuationAdapter), ValtraderError> {
    let data_dir = required_string(adapter, "backtest", "data_dir")?;
    let universe_file = required_string(adapter, "backtest", "universe_file")?;
    let thresholds_file = adapter
        .get_string("backtest", "thresholds_file")
        .filter(|s| !s.trim().is_empty())
        .map(|s| resolve_path(config_path, &s));

    let bars = CsvBarAdapter::new(resolve_path(config_path, &data_dir));
    let valuation = CsvValuationAdapter::from_files(
        &resolve_path(config_path, &universe_file),
        thresholds_file.as_deref(),
    )?;
    Ok((bars, valuation))
}

fn run_backtest(config_path: &Path, output_dir: Option<&Path>) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Build the engine
    let mut engine = match build_engine(&adapter) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 3: Open data and valuation sources
    let (bars, valuation) = match build_adapters(config_path, &adapter) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let indicators = StandardIndicators::new(build_indicator_config(&adapter));
    let output = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("report"));

    let universe = valuation.universe().clone();
    run_backtest_pipeline(
        &mut engine,
        &universe,
        &bars,
        &indicators,
        &valuation,
        &CsvReportAdapter::new(),
        &output,
    )
}

/// Stages 4-6: run, summarise and report.
pub fn run_backtest_pipeline(
    engine: &mut BacktestLoop,
    universe: &Universe,
    data_port: &dyn DataPort,
    indicator_port: &dyn IndicatorPort,
    valuation_port: &dyn ValuationPort,
    report_port: &dyn ReportPort,
    output_dir: &Path,
) -> ExitCode {
    if universe.count() == 0 {
        eprintln!("error: universe has no instruments");
        return ExitCode::from(2);
    }

    // Stage 4: Run
    eprintln!(
        "Running backtest: {} instruments, {} to {}",
        universe.count(),
        engine.config.start_date,
        engine.config.end_date,
    );
    let result = engine.run(universe, data_port, indicator_port, valuation_port, None);
    if let Some(failure) = &result.failure {
        eprintln!("error: backtest {}: {failure}", result.state);
        return failure.into();
    }

    // Stage 5: Metrics and console summary
    let metrics = Metrics::compute(
        &result,
        engine.config.periods_per_year,
        engine.config.risk_free_rate,
    );

    eprintln!("\n=== Results ===");
    eprintln!("Final Value:      {:.2}", metrics.final_value);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Dividends:        {:.2}", metrics.dividend_income);
    eprintln!(
        "Trades:           {} buys, {} sells",
        metrics.costs.buy_count, metrics.costs.sell_count
    );
    let executed = result
        .signals
        .iter()
        .filter(|s| s.outcome == SignalOutcome::Executed)
        .count();
    eprintln!(
        "Signals:          {} ({} executed)",
        result.signals.len(),
        executed
    );
    eprintln!(
        "Costs:            {:.2} ({:.3}% of turnover)",
        metrics.costs.total_cost,
        metrics.costs.cost_rate * 100.0
    );
    if let (Some(bench), Some(excess)) = (metrics.benchmark_return, metrics.excess_return) {
        eprintln!("\n=== Buy & Hold ===");
        eprintln!("Total Return:     {:.2}%", bench * 100.0);
        eprintln!("Excess Return:    {:+.2}%", excess * 100.0);
    }
    if !result.rejections.is_empty() {
        eprintln!("\n{} instrument-dates skipped or rejected", result.rejections.len());
    }

    // Stage 6: Report
    match report_port.write(&result, &metrics, output_dir) {
        Ok(()) => {
            eprintln!("\nReport written to: {}", output_dir.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: failed to write report: {e}");
            (&e).into()
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let (_, valuation) = match build_adapters(config_path, &adapter) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let universe = valuation.universe();

    eprintln!("Config validated successfully");
    eprintln!("\nUniverse:");
    for (code, weight) in &universe.weights {
        let fair = valuation
            .fair_value(code)
            .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
        eprintln!("  {code}: weight {:.1}%, fair value {fair}", weight * 100.0);
    }
    eprintln!("  cash: {:.1}%", universe.cash_weight * 100.0);
    ExitCode::SUCCESS
}

fn run_explain(config_path: &Path, code: &str, date: &str) -> ExitCode {
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let date = match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: invalid date {date}: {e}");
            return ExitCode::from(2);
        }
    };

    let explained = build_engine(&adapter).and_then(|mut engine| {
        let (bars, valuation) = build_adapters(config_path, &adapter)?;
        let indicators = StandardIndicators::new(build_indicator_config(&adapter));
        explain_signal(&mut engine, code, date, &bars, &indicators, &valuation)
    });

    match explained {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Score one instrument on the last bar on or before `date` and render the breakdown.
pub fn explain_signal(
    engine: &mut BacktestLoop,
    code: &str,
    date: NaiveDate,
    data_port: &dyn DataPort,
    indicator_port: &dyn IndicatorPort,
    valuation_port: &dyn ValuationPort,
) -> Result<String, ValtraderError> {
    let single = Universe::from_entries([(code.to_string(), 0.0)])?;
    let prepared = engine.prepare(&single, data_port, indicator_port)?;
    let data = prepared.first().ok_or_else(|| ValtraderError::Data {
        reason: format!("no data for {code}"),
    })?;

    let end = data.bars.partition_point(|b| b.date <= date);
    let Some(bar) = end.checked_sub(1).and_then(|i| data.bars.get(i)) else {
        return Err(ValtraderError::Data {
            reason: format!("{code}: no bar on or before {date}"),
        });
    };
    let history = &data.snapshots[..end];

    let valuation = valuation_port
        .fair_value(code)
        .and_then(|fv| ValuationContext::new(code, bar.close, fv).ok());
    let thresholds = ThresholdResolver::new(engine.default_thresholds).resolve(code, valuation_port);
    let decision = engine
        .scorer
        .score(code, history, valuation.as_ref(), &thresholds)?;
    Ok(engine.scorer.explain(code, bar.date, &decision))
}

pub fn build_engine(adapter: &dyn ConfigPort) -> Result<BacktestLoop, ValtraderError> {
    let sizing = build_sizing_config(adapter);
    let mut config = build_backtest_config(adapter)?;
    config.lot_size = sizing.lot_size;
    Ok(BacktestLoop::new(
        config,
        SignalScorer::new(build_scorer_config(adapter)),
        PositionSizer::new(sizing),
        TransactionCostModel::new(build_cost_config(adapter)),
    )
    .with_default_thresholds(build_default_thresholds(adapter)))
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, ValtraderError> {
    let start_date = parse_date(adapter.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end_date = parse_date(adapter.get_string("backtest", "end_date").as_deref(), "end_date")?;
    let warmup_start = match adapter.get_string("backtest", "warmup_start") {
        Some(s) => parse_date(Some(&s), "warmup_start")?,
        None => start_date,
    };
    let frequency = match adapter.get_string("backtest", "frequency") {
        Some(s) => s
            .parse::<Frequency>()
            .map_err(|reason| ValtraderError::ConfigInvalid {
                section: "backtest".into(),
                key: "frequency".into(),
                reason,
            })?,
        None => Frequency::Weekly,
    };

    Ok(BacktestConfig {
        start_date,
        end_date,
        warmup_start,
        initial_capital: adapter.get_double("backtest", "initial_capital", 1_000_000.0),
        frequency,
        lot_size: SizingConfig::default().lot_size,
        periods_per_year: adapter.get_double(
            "backtest",
            "periods_per_year",
            match frequency {
                Frequency::Weekly => 52.0,
                Frequency::Daily => 252.0,
            },
        ),
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", 0.0),
    })
}

pub fn build_scorer_config(adapter: &dyn ConfigPort) -> ScorerConfig {
    let d = ScorerConfig::default();
    ScorerConfig {
        min_history: get_usize(adapter, "signal", "min_history", d.min_history),
        value_ratio_buy_threshold: adapter.get_double(
            "signal",
            "value_ratio_buy_threshold",
            d.value_ratio_buy_threshold,
        ),
        value_ratio_sell_threshold: adapter.get_double(
            "signal",
            "value_ratio_sell_threshold",
            d.value_ratio_sell_threshold,
        ),
        volume_sell_multiplier: adapter.get_double(
            "signal",
            "volume_sell_multiplier",
            d.volume_sell_multiplier,
        ),
        volume_buy_multiplier: adapter.get_double(
            "signal",
            "volume_buy_multiplier",
            d.volume_buy_multiplier,
        ),
        trend_fallback: adapter.get_bool("signal", "trend_fallback", d.trend_fallback),
        trend_periods: get_usize(adapter, "signal", "trend_periods", d.trend_periods),
        trend_flat_threshold: adapter.get_double(
            "signal",
            "trend_flat_threshold",
            d.trend_flat_threshold,
        ),
    }
}

pub fn build_indicator_config(adapter: &dyn ConfigPort) -> IndicatorConfig {
    let d = IndicatorConfig::default();
    IndicatorConfig {
        ema_period: get_usize(adapter, "indicators", "ema_period", d.ema_period),
        rsi_period: get_usize(adapter, "indicators", "rsi_period", d.rsi_period),
        macd_fast: get_usize(adapter, "indicators", "macd_fast", d.macd_fast),
        macd_slow: get_usize(adapter, "indicators", "macd_slow", d.macd_slow),
        macd_signal: get_usize(adapter, "indicators", "macd_signal", d.macd_signal),
        bb_period: get_usize(adapter, "indicators", "bb_period", d.bb_period),
        bb_stddev: adapter.get_double("indicators", "bb_stddev", d.bb_stddev),
        volume_ma_period: get_usize(adapter, "indicators", "volume_ma_period", d.volume_ma_period),
        divergence_lookback: get_usize(
            adapter,
            "indicators",
            "divergence_lookback",
            d.divergence_lookback,
        ),
    }
}

/// Tier keys are `<tier>_add_ratio`, `<tier>_new_ratio`, `<tier>_max_position`
/// for buy tiers and `<tier>_sell_ratio` for sell tiers.
pub fn build_sizing_config(adapter: &dyn ConfigPort) -> SizingConfig {
    let mut config = SizingConfig::default();
    config.lot_size = get_usize(adapter, "sizing", "lot_size", config.lot_size as usize) as u64;
    config.max_single_weight =
        adapter.get_double("sizing", "max_single_weight", config.max_single_weight);
    config.cash_fallback_ratio =
        adapter.get_double("sizing", "cash_fallback_ratio", config.cash_fallback_ratio);
    config.fixed_ratio_fallback =
        adapter.get_double("sizing", "fixed_ratio_fallback", config.fixed_ratio_fallback);

    for tier in &mut config.buy_tiers {
        tier.add_ratio = adapter.get_double("sizing", &format!("{}_add_ratio", tier.name), tier.add_ratio);
        tier.new_ratio = adapter.get_double("sizing", &format!("{}_new_ratio", tier.name), tier.new_ratio);
        tier.max_position_ratio = adapter.get_double(
            "sizing",
            &format!("{}_max_position", tier.name),
            tier.max_position_ratio,
        );
    }
    for tier in &mut config.sell_tiers {
        tier.sell_ratio =
            adapter.get_double("sizing", &format!("{}_sell_ratio", tier.name), tier.sell_ratio);
    }
    config
}

pub fn build_cost_config(adapter: &dyn ConfigPort) -> CostConfig {
    let d = CostConfig::default();
    CostConfig {
        buy_commission_rate: adapter.get_double("costs", "buy_commission_rate", d.buy_commission_rate),
        sell_commission_rate: adapter.get_double(
            "costs",
            "sell_commission_rate",
            d.sell_commission_rate,
        ),
        min_commission: adapter.get_double("costs", "min_commission", d.min_commission),
        stamp_tax_rate: adapter.get_double("costs", "stamp_tax_rate", d.stamp_tax_rate),
        transfer_fee_rate: adapter.get_double("costs", "transfer_fee_rate", d.transfer_fee_rate),
        slippage_rate: adapter.get_double("costs", "slippage_rate", d.slippage_rate),
    }
}

/// RSI quartet used when an instrument's industry has none of its own.
pub fn build_default_thresholds(adapter: &dyn ConfigPort) -> IndustryThresholds {
    let d = IndustryThresholds::default();
    let candidate = IndustryThresholds {
        oversold: adapter.get_double("signal", "rsi_oversold", d.oversold),
        overbought: adapter.get_double("signal", "rsi_overbought", d.overbought),
        extreme_oversold: adapter.get_double("signal", "rsi_extreme_oversold", d.extreme_oversold),
        extreme_overbought: adapter.get_double(
            "signal",
            "rsi_extreme_overbought",
            d.extreme_overbought,
        ),
    };
    if candidate.is_ordered() { candidate } else { d }
}

pub fn build_log_config(adapter: &dyn ConfigPort) -> LogConfig {
    let level = adapter
        .get_string("logging", "level")
        .unwrap_or_else(|| "info".to_string());
    let format = adapter
        .get_string("logging", "format")
        .and_then(|s| s.parse::<LogFormat>().ok())
        .unwrap_or_default();
    LogConfig::new(level).with_format(format)
}

fn get_usize(adapter: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    let value = adapter.get_int(section, key, default as i64);
    usize::try_from(value).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn cli_parses_backtest_subcommand() {
        let cli = Cli::try_parse_from([
            "valtrader", "backtest", "--config", "bt.ini", "--output", "out",
        ])
        .unwrap();
        match cli.command {
            Command::Backtest { config, output } => {
                assert_eq!(config, PathBuf::from("bt.ini"));
                assert_eq!(output, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_parses_explain_subcommand() {
        let cli = Cli::try_parse_from([
            "valtrader", "explain", "-c", "bt.ini", "--code", "600000", "--date", "2024-03-01",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Explain { ref code, .. } if code == "600000"));
    }

    #[test]
    fn resolve_path_joins_relative_to_config_dir() {
        let config = Path::new("/srv/runs/bt.ini");
        assert_eq!(resolve_path(config, "data"), PathBuf::from("/srv/runs/data"));
        assert_eq!(resolve_path(config, "/abs/data"), PathBuf::from("/abs/data"));
    }

    #[test]
    fn backtest_config_defaults() {
        let config = build_backtest_config(&adapter(
            "[backtest]\nstart_date = 2020-01-03\nend_date = 2020-12-31\n",
        ))
        .unwrap();
        assert_eq!(config.warmup_start, config.start_date);
        assert_eq!(config.frequency, Frequency::Weekly);
        assert_eq!(config.periods_per_year, 52.0);
        assert_eq!(config.initial_capital, 1_000_000.0);
    }

    #[test]
    fn daily_frequency_changes_periods_default() {
        let config = build_backtest_config(&adapter(
            "[backtest]\nstart_date = 2020-01-03\nend_date = 2020-12-31\nfrequency = daily\n",
        ))
        .unwrap();
        assert_eq!(config.frequency, Frequency::Daily);
        assert_eq!(config.periods_per_year, 252.0);
    }

    #[test]
    fn missing_start_date_is_config_missing() {
        let err = build_backtest_config(&adapter("[backtest]\nend_date = 2020-12-31\n")).unwrap_err();
        assert!(matches!(err, ValtraderError::ConfigMissing { key, .. } if key == "start_date"));
    }

    #[test]
    fn sizing_tier_keys_override_defaults() {
        let sizing = build_sizing_config(&adapter(
            "[sizing]\nlot_size = 200\nextreme_undervalue_new_ratio = 0.25\nfair_value_sell_ratio = 0\n",
        ));
        assert_eq!(sizing.lot_size, 200);
        assert_eq!(sizing.buy_tiers[0].new_ratio, 0.25);
        assert_eq!(sizing.buy_tiers[0].add_ratio, 0.50);
        assert_eq!(sizing.sell_tiers[3].sell_ratio, 0.0);
    }

    #[test]
    fn engine_uses_sizing_lot_size() {
        let engine = build_engine(&adapter(
            "[backtest]\nstart_date = 2020-01-03\nend_date = 2020-12-31\n[sizing]\nlot_size = 10\n",
        ))
        .unwrap();
        assert_eq!(engine.config.lot_size, 10);
        assert_eq!(engine.sizer.config.lot_size, 10);
    }

    #[test]
    fn unordered_default_thresholds_fall_back() {
        let thresholds = build_default_thresholds(&adapter("[signal]\nrsi_oversold = 90\n"));
        assert_eq!(thresholds, IndustryThresholds::default());
        let thresholds = build_default_thresholds(&adapter("[signal]\nrsi_oversold = 25\n"));
        assert_eq!(thresholds.oversold, 25.0);
    }

    #[test]
    fn log_config_from_section() {
        let log = build_log_config(&adapter("[logging]\nlevel = debug\nformat = json\n"));
        assert_eq!(log.level, "debug");
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(build_log_config(&adapter("[backtest]\n")).format, LogFormat::Compact);
    }
}
