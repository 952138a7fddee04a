//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use crate::adapters::csv_adapter::CsvCandleAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonlReportAdapter;
use crate::domain::backtest::{run_backtest, ActionSpec, BacktestSpec, TradeRules};
use crate::domain::candle::Candle;
use crate::domain::error::{FailureCategory, GridtraderError};
use crate::domain::optimizer::{
    run_sweep, JobFailurePolicy, ParameterAxis, ParameterSet, RangedSet, SweepOptions,
    DEFAULT_WORKERS,
};
use crate::domain::recoverable::Recoverable;
use crate::domain::strategy::CrossSignalStrategy;
use crate::domain::trade_loop::{MatchPolicy, TradeLoopConfig};
use crate::ports::candle_port::CandlePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "gridtrader", about = "Backtest simulator with parallel parameter search")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Override the data directory from the config
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Run a parameter sweep
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
        /// Append ranked summaries to this JSON-lines file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print at most this many summaries
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Show the available data range for the configured symbol
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest { config, data } => run_backtest_cmd(&config, data),
        Command::Sweep {
            config,
            data,
            output,
            top,
        } => run_sweep_cmd(&config, data, output, top),
        Command::Info { config, data } => run_info(&config, data),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, GridtraderError> {
    FileConfigAdapter::from_file(path).map_err(|e| GridtraderError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Build the backtest spec from config sections. Action configs are JSON
/// values under `[actions]`, registered in key order.
pub fn build_spec(config: &dyn ConfigPort) -> Result<BacktestSpec, GridtraderError> {
    let fast = config.get_int("strategy", "fast_period", 12);
    let slow = config.get_int("strategy", "slow_period", 26);
    if fast < 1 || slow < 1 {
        return Err(GridtraderError::ConfigInvalid {
            section: "strategy".into(),
            key: "fast_period".into(),
            reason: "periods must be positive".into(),
        });
    }
    let strategy = CrossSignalStrategy::new(fast as usize, slow as usize)?;

    let rules = TradeRules {
        size: config.get_double("rules", "size", 1.0),
        target_pct: config.get_double("rules", "target_pct", 0.0),
        stop_pct: config.get_double("rules", "stop_pct", 0.0),
    };

    let timeout = config.get_int("loop", "timeout_ticks", 0);
    let loop_config = TradeLoopConfig {
        match_policy: MatchPolicy {
            opposite_only: config.get_bool("loop", "opposite_only", true),
        },
        timeout_ticks: (timeout > 0).then_some(timeout as usize),
    };

    let mut action_kinds = config.section_keys("actions");
    action_kinds.sort();
    let mut actions = Vec::with_capacity(action_kinds.len());
    for kind in action_kinds {
        let raw = config
            .get_string("actions", &kind)
            .ok_or_else(|| GridtraderError::ConfigMissing {
                section: "actions".into(),
                key: kind.clone(),
            })?;
        let value = serde_json::from_str(&raw).map_err(|e| GridtraderError::ConfigInvalid {
            section: "actions".into(),
            key: kind.clone(),
            reason: format!("invalid JSON: {}", e),
        })?;
        actions.push(ActionSpec {
            kind: kind.clone(),
            config: value,
        });
    }

    Ok(BacktestSpec {
        strategy,
        rules,
        actions,
        loop_config,
    })
}

/// Parse one axis value: either a comma-separated list ("3,5,8") or an
/// inclusive range ("range:1:10:0.5").
pub fn parse_parameter_set(raw: &str) -> Result<ParameterSet, GridtraderError> {
    let invalid = |reason: String| GridtraderError::ConfigInvalid {
        section: "axes".into(),
        key: raw.to_string(),
        reason,
    };

    if let Some(spec) = raw.strip_prefix("range:") {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() != 3 {
            return Err(invalid("expected range:min:max:step".into()));
        }
        let numbers = parts
            .iter()
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| invalid(format!("invalid number: {}", e)))?;
        return Ok(ParameterSet::Range(RangedSet::new(
            numbers[0], numbers[1], numbers[2],
        )?));
    }

    let values = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|e| invalid(format!("invalid number: {}", e)))?;
    if values.is_empty() {
        return Err(invalid("axis has no values".into()));
    }
    Ok(ParameterSet::Values(values))
}

/// Axes come from the `[axes]` section: one key per parameter.
pub fn build_axes(config: &dyn ConfigPort) -> Result<Vec<ParameterAxis>, GridtraderError> {
    let mut names = config.section_keys("axes");
    names.sort();
    if names.is_empty() {
        return Err(GridtraderError::ConfigMissing {
            section: "axes".into(),
            key: "<any>".into(),
        });
    }

    names
        .into_iter()
        .map(|name| {
            let raw = config.get_string("axes", &name).ok_or_else(|| {
                GridtraderError::ConfigMissing {
                    section: "axes".into(),
                    key: name.clone(),
                }
            })?;
            Ok(ParameterAxis {
                name,
                set: parse_parameter_set(&raw)?,
            })
        })
        .collect()
}

pub fn build_sweep_options(config: &dyn ConfigPort) -> Result<SweepOptions, GridtraderError> {
    let workers = config.get_int("sweep", "workers", DEFAULT_WORKERS as i64);
    if workers < 1 {
        return Err(GridtraderError::ConfigInvalid {
            section: "sweep".into(),
            key: "workers".into(),
            reason: "worker count must be positive".into(),
        });
    }

    let on_job_failure = match config
        .get_string("sweep", "on_job_failure")
        .unwrap_or_else(|| "abort".into())
        .as_str()
    {
        "abort" => JobFailurePolicy::Abort,
        "skip" => JobFailurePolicy::Skip,
        other => {
            return Err(GridtraderError::ConfigInvalid {
                section: "sweep".into(),
                key: "on_job_failure".into(),
                reason: format!("expected 'abort' or 'skip', got '{}'", other),
            })
        }
    };

    Ok(SweepOptions {
        workers: workers as usize,
        on_job_failure,
        worker_init: None,
    })
}

/// Fetch the configured candle window, retrying transient data failures.
fn load_candles(
    config: &dyn ConfigPort,
    data_override: Option<PathBuf>,
) -> Result<Vec<Candle>, GridtraderError> {
    let base = data_override.unwrap_or_else(|| {
        PathBuf::from(config.get_string("data", "path").unwrap_or_else(|| ".".into()))
    });
    let symbol = config
        .get_string("data", "symbol")
        .ok_or_else(|| GridtraderError::ConfigMissing {
            section: "data".into(),
            key: "symbol".into(),
        })?;
    let interval = config.get_string("data", "interval").unwrap_or_else(|| "1h".into());
    let start = config.get_int("data", "start", 0);
    let end = config.get_int("data", "end", i64::MAX);

    let adapter = CsvCandleAdapter::new(base);
    let retry = Recoverable::new(
        Duration::from_secs(config.get_int("fetch", "retry_delay_secs", 1).max(0) as u64),
        config.get_int("fetch", "retry_limit", 2).max(0) as u32,
        HashSet::from([FailureCategory::Data, FailureCategory::Io]),
    )?;

    let candles = retry.run(|| adapter.fetch_candles(&symbol, &interval, start, end))?;
    if candles.is_empty() {
        return Err(GridtraderError::Data {
            reason: format!("no candles for {} {} in range", symbol, interval),
        });
    }
    Ok(candles)
}

fn run_backtest_cmd(config_path: &PathBuf, data: Option<PathBuf>) -> Result<(), GridtraderError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    let spec = build_spec(&config)?;
    let candles = load_candles(&config, data)?;
    eprintln!("Running backtest over {} candles", candles.len());

    let report = run_backtest(&spec, &candles)?;

    println!("positions: {}", report.outcomes.len());
    for (name, value) in &report.metrics {
        println!("{:>10}: {:.4}", name, value);
    }
    Ok(())
}

fn run_sweep_cmd(
    config_path: &PathBuf,
    data: Option<PathBuf>,
    output: Option<PathBuf>,
    top: usize,
) -> Result<(), GridtraderError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    let spec = build_spec(&config)?;
    let axes = build_axes(&config)?;
    let options = build_sweep_options(&config)?;
    let candles = load_candles(&config, data)?;

    let total: usize = axes.iter().map(|a| a.set.len()).product();
    eprintln!(
        "Sweeping {} combinations over {} candles with {} workers",
        total,
        candles.len(),
        options.workers
    );

    let report = run_sweep(&spec, &candles, &axes, &options)?;

    if !report.failures.is_empty() {
        eprintln!("{} combinations failed and were skipped", report.failures.len());
    }
    for summary in report.summaries.iter().take(top) {
        let combo: Vec<String> = summary
            .combination
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        println!("roi {:>10.4}  {}", summary.roi(), combo.join(" "));
    }

    if let Some(path) = output {
        let mut sink = JsonlReportAdapter::new(path.clone());
        sink.record(&report.summaries)?;
        eprintln!("Wrote {} summaries to {}", report.summaries.len(), path.display());
    }
    Ok(())
}

fn run_info(config_path: &PathBuf, data: Option<PathBuf>) -> Result<(), GridtraderError> {
    let config = load_config(config_path)?;
    let base = data.unwrap_or_else(|| {
        PathBuf::from(config.get_string("data", "path").unwrap_or_else(|| ".".into()))
    });
    let symbol = config
        .get_string("data", "symbol")
        .ok_or_else(|| GridtraderError::ConfigMissing {
            section: "data".into(),
            key: "symbol".into(),
        })?;
    let interval = config.get_string("data", "interval").unwrap_or_else(|| "1h".into());

    let adapter = CsvCandleAdapter::new(base);
    match adapter.data_range(&symbol, &interval)? {
        Some((first, last, count)) => {
            println!("{} {}: {} candles, {} .. {}", symbol, interval, count, first, last);
        }
        None => println!("{} {}: no data", symbol, interval),
    }
    Ok(())
}
