//! Backtest driver: candles -> signals -> trade loops -> metrics.
//!
//! Each signal trade seeds a provisional position whose price fields are
//! populated through the binding resolver, promoted to a durable identity
//! in the position book, and advanced by its own trade loop. Aggregated
//! metrics feed the optimizer's summaries.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::binding::{BindOwner, BindingResolver, CandleBindSource, OwnerId, Transform};
use super::candle::{Candle, TimestampMs};
use super::error::GridtraderError;
use super::indicator::IndicatorEngine;
use super::position::{Position, PositionStatus};
use super::strategy::CrossSignalStrategy;
use super::trade::{Side, Trade};
use super::trade_action::TradeAction;
use super::trade_loop::{LoopOutcome, TradeLoop, TradeLoopConfig};

/// Declarative action attached to every position the backtest opens.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub kind: String,
    pub config: Value,
}

/// Entry sizing and exit levels, in percent offsets from the entry price.
/// A zero percentage disables the corresponding level.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRules {
    pub size: f64,
    pub target_pct: f64,
    pub stop_pct: f64,
}

impl Default for TradeRules {
    fn default() -> Self {
        TradeRules {
            size: 1.0,
            target_pct: 0.0,
            stop_pct: 0.0,
        }
    }
}

/// Cloneable tester state: one sweep job clones this and merges its
/// parameter combination in before running.
#[derive(Debug, Clone)]
pub struct BacktestSpec {
    pub strategy: CrossSignalStrategy,
    pub rules: TradeRules,
    pub actions: Vec<ActionSpec>,
    pub loop_config: TradeLoopConfig,
}

impl BacktestSpec {
    /// Merge one named parameter in. The override set is closed; an
    /// unknown name is a configuration error, not a silent no-op.
    pub fn apply_override(&mut self, name: &str, value: f64) -> Result<(), GridtraderError> {
        let as_period = |value: f64| -> Result<usize, GridtraderError> {
            if value >= 1.0 && value.fract() == 0.0 {
                Ok(value as usize)
            } else {
                Err(GridtraderError::ConfigInvalid {
                    section: "sweep".into(),
                    key: name.to_string(),
                    reason: format!("expected a positive integer, got {}", value),
                })
            }
        };

        match name {
            "fast_period" => {
                self.strategy = CrossSignalStrategy::new(as_period(value)?, self.strategy.slow_period)?;
            }
            "slow_period" => {
                self.strategy = CrossSignalStrategy::new(self.strategy.fast_period, as_period(value)?)?;
            }
            "size" => self.rules.size = value,
            "target_pct" => self.rules.target_pct = value,
            "stop_pct" => self.rules.stop_pct = value,
            "timeout_ticks" => self.loop_config.timeout_ticks = Some(as_period(value)?),
            _ => {
                // Dotted names address an action config key, e.g.
                // "move_stop.new_stop_price".
                let Some((kind, key)) = name.split_once('.') else {
                    return Err(GridtraderError::ConfigInvalid {
                        section: "sweep".into(),
                        key: name.to_string(),
                        reason: "unknown override path".into(),
                    });
                };
                let action = self
                    .actions
                    .iter_mut()
                    .find(|a| a.kind == kind)
                    .ok_or_else(|| GridtraderError::ConfigInvalid {
                        section: "sweep".into(),
                        key: name.to_string(),
                        reason: format!("no configured action of kind '{}'", kind),
                    })?;
                set_nested(&mut action.config, key, value);
            }
        }
        Ok(())
    }
}

/// Set `a.b.c`-style keys inside an action config, creating intermediate
/// objects as needed.
fn set_nested(config: &mut Value, path: &str, value: f64) {
    if !config.is_object() {
        *config = Value::Object(serde_json::Map::new());
    }
    let Some(map) = config.as_object_mut() else { return };
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), Value::from(value));
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            set_nested(child, rest, value);
        }
    }
}

/// Provisional position awaiting promotion; fields are written through
/// the binding resolver.
struct PositionSeed {
    id: OwnerId,
    side: Side,
    size: f64,
    entry_timestamp: TimestampMs,
    entry_price: f64,
    target_price: f64,
    stop_price: f64,
}

impl BindOwner for PositionSeed {
    fn owner_id(&self) -> OwnerId {
        self.id
    }

    fn is_persisted(&self) -> bool {
        false
    }

    fn set_bound_field(&mut self, field: &str, value: f64) -> Result<(), GridtraderError> {
        match field {
            "entry_price" => self.entry_price = value,
            "target_price" => self.target_price = value,
            "stop_price" => self.stop_price = value,
            other => {
                return Err(GridtraderError::InvalidArgument {
                    reason: format!("position has no bindable field '{}'", other),
                })
            }
        }
        Ok(())
    }
}

/// A promoted position with its durable identity.
pub struct BookedPosition {
    pub id: OwnerId,
    pub position: Position,
}

impl BindOwner for BookedPosition {
    fn owner_id(&self) -> OwnerId {
        self.id
    }

    fn is_persisted(&self) -> bool {
        true
    }

    fn set_bound_field(&mut self, field: &str, value: f64) -> Result<(), GridtraderError> {
        let timestamp = self.position.entry_timestamp;
        let price = match field {
            "entry_price" => &mut self.position.entry,
            "target_price" => &mut self.position.target,
            "stop_price" => &mut self.position.stop,
            other => {
                return Err(GridtraderError::InvalidArgument {
                    reason: format!("position has no bindable field '{}'", other),
                })
            }
        };
        price.set("binding", value, timestamp, "bound value refreshed")
    }
}

/// Assigns identities: provisional for seeds, durable on promotion.
#[derive(Default)]
pub struct PositionBook {
    next_id: OwnerId,
}

impl PositionBook {
    pub fn new() -> Self {
        PositionBook::default()
    }

    fn next_id(&mut self) -> OwnerId {
        self.next_id += 1;
        self.next_id
    }

    fn seed(&mut self, trade: &Trade, size: f64) -> PositionSeed {
        PositionSeed {
            id: self.next_id(),
            side: trade.side,
            size,
            entry_timestamp: trade.timestamp,
            entry_price: trade.price,
            target_price: 0.0,
            stop_price: 0.0,
        }
    }

    fn promote(&mut self, seed: PositionSeed) -> BookedPosition {
        BookedPosition {
            id: self.next_id(),
            position: Position::new(
                seed.side,
                seed.size,
                seed.entry_timestamp,
                seed.entry_price,
                seed.target_price,
                seed.stop_price,
            ),
        }
    }
}

#[derive(Debug)]
pub struct BacktestReport {
    pub outcomes: Vec<LoopOutcome>,
    pub metrics: BTreeMap<String, f64>,
}

/// Percent offset transform for a level derived from the entry price. A
/// zero percentage disables the level entirely.
fn level_transform(pct: f64, direction: f64) -> Transform {
    Arc::new(move |entry| {
        if pct == 0.0 {
            0.0
        } else {
            entry * (1.0 + direction * pct / 100.0)
        }
    })
}

/// Run one full backtest over the window: generate signals, then advance
/// one trade loop per signal trade.
pub fn run_backtest(
    spec: &BacktestSpec,
    candles: &[Candle],
) -> Result<BacktestReport, GridtraderError> {
    let mut engine = IndicatorEngine::new(candles);
    let trades = spec.strategy.generate_trades(&mut engine)?;

    let mut resolver = BindingResolver::new(CandleBindSource::new(candles));
    let mut book = PositionBook::new();
    let mut outcomes = Vec::with_capacity(trades.len());

    for trade in trades.trades() {
        let mut seed = book.seed(trade, spec.rules.size);
        let seed_id = seed.id;
        let entry_ts = trade.timestamp;

        let (target_dir, stop_dir) = match trade.side {
            Side::Buy => (1.0, -1.0),
            Side::Sell => (-1.0, 1.0),
        };
        resolver.bind(&mut seed, "entry_price", "close", None, Some(entry_ts))?;
        resolver.bind(
            &mut seed,
            "target_price",
            "close",
            Some(level_transform(spec.rules.target_pct, target_dir)),
            Some(entry_ts),
        )?;
        resolver.bind(
            &mut seed,
            "stop_price",
            "close",
            Some(level_transform(spec.rules.stop_pct, stop_dir)),
            Some(entry_ts),
        )?;

        let booked = book.promote(seed);
        resolver.replace_owner(seed_id, booked.id);
        resolver.save_bindings(&booked)?;

        let actions = spec
            .actions
            .iter()
            .map(|a| TradeAction::new(&a.kind, &a.config))
            .collect::<Result<Vec<_>, _>>()?;

        let booked_id = booked.id;
        let tl = TradeLoop::new(
            booked.position,
            actions,
            candles,
            &trades,
            spec.loop_config.clone(),
        );
        outcomes.push(tl.run()?);
        resolver.remove_owner(booked_id);
    }

    let metrics = compute_metrics(&outcomes);
    Ok(BacktestReport { outcomes, metrics })
}

/// Aggregate closed-position metrics. Open outcomes (end of data) are
/// excluded from roi.
fn compute_metrics(outcomes: &[LoopOutcome]) -> BTreeMap<String, f64> {
    let mut roi_total = 0.0;
    let mut wins = 0usize;
    let mut losses = 0usize;
    let mut closed = 0usize;

    for outcome in outcomes {
        if let PositionStatus::Closed { exit_price, .. } = outcome.position.status() {
            closed += 1;
            let roi = outcome.position.roi(*exit_price);
            roi_total += roi;
            if roi > 0.0 {
                wins += 1;
            } else if roi < 0.0 {
                losses += 1;
            }
        }
    }

    let mut metrics = BTreeMap::new();
    metrics.insert("roi".to_string(), roi_total);
    metrics.insert("trades".to_string(), closed as f64);
    metrics.insert("wins".to_string(), wins as f64);
    metrics.insert("losses".to_string(), losses as f64);
    metrics.insert(
        "win_rate".to_string(),
        if closed > 0 {
            wins as f64 / closed as f64
        } else {
            0.0
        },
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "TEST".into(),
                interval: "1h".into(),
                timestamp: 1000 * (i as i64 + 1),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn sample_spec() -> BacktestSpec {
        BacktestSpec {
            strategy: CrossSignalStrategy::new(2, 4).unwrap(),
            rules: TradeRules {
                size: 1.0,
                target_pct: 10.0,
                stop_pct: 5.0,
            },
            actions: Vec::new(),
            loop_config: TradeLoopConfig::default(),
        }
    }

    #[test]
    fn override_known_paths() {
        let mut spec = sample_spec();
        spec.apply_override("fast_period", 3.0).unwrap();
        spec.apply_override("slow_period", 8.0).unwrap();
        spec.apply_override("target_pct", 12.0).unwrap();
        spec.apply_override("timeout_ticks", 24.0).unwrap();

        assert_eq!(spec.strategy.fast_period, 3);
        assert_eq!(spec.strategy.slow_period, 8);
        assert!((spec.rules.target_pct - 12.0).abs() < f64::EPSILON);
        assert_eq!(spec.loop_config.timeout_ticks, Some(24));
    }

    #[test]
    fn override_action_config_by_dotted_path() {
        let mut spec = sample_spec();
        spec.actions.push(ActionSpec {
            kind: "move_stop".into(),
            config: json!({"new_stop_price": 1.0, "target": {"roi": 50.0}}),
        });
        spec.apply_override("move_stop.target.roi", 25.0).unwrap();
        assert_eq!(
            spec.actions[0].config.pointer("/target/roi"),
            Some(&json!(25.0))
        );
    }

    #[test]
    fn override_unknown_path_fails() {
        let mut spec = sample_spec();
        assert!(spec.apply_override("slippage", 1.0).is_err());
        assert!(spec.apply_override("move_stop.target.roi", 1.0).is_err());
        assert!(spec.apply_override("fast_period", 2.5).is_err());
    }

    #[test]
    fn invalid_period_combination_surfaces_at_override() {
        let mut spec = sample_spec();
        assert!(spec.apply_override("fast_period", 10.0).is_err());
    }

    #[test]
    fn backtest_produces_metrics_and_outcomes() {
        // Two reversals so the strategy emits entries and opposite exits.
        let closes = [10.0, 8.0, 6.0, 4.0, 6.0, 8.0, 10.0, 8.0, 6.0, 4.0, 6.0, 8.0];
        let candles = make_candles(&closes);
        let spec = sample_spec();

        let report = run_backtest(&spec, &candles).unwrap();
        assert!(!report.outcomes.is_empty());
        assert!(report.metrics.contains_key("roi"));
        assert!(report.metrics.contains_key("win_rate"));
        let closed = report.metrics["trades"];
        assert!(closed >= 1.0);
    }

    #[test]
    fn backtest_is_deterministic() {
        let closes = [10.0, 8.0, 6.0, 4.0, 6.0, 8.0, 10.0, 8.0, 6.0, 4.0, 6.0, 8.0];
        let candles = make_candles(&closes);
        let spec = sample_spec();

        let first = run_backtest(&spec, &candles).unwrap();
        let second = run_backtest(&spec, &candles).unwrap();
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.outcomes.len(), second.outcomes.len());
    }

    #[test]
    fn position_levels_derive_from_entry_price() {
        let closes = [10.0, 8.0, 6.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0];
        let candles = make_candles(&closes);
        let spec = sample_spec();

        let report = run_backtest(&spec, &candles).unwrap();
        for outcome in &report.outcomes {
            let entry = outcome.position.entry.get();
            let target = outcome.position.target.get();
            let stop = outcome.position.stop.get();
            match outcome.position.side {
                Side::Buy => {
                    assert!((target - entry * 1.10).abs() < 1e-9);
                    // The stop may have been moved by an action, but its
                    // first audit entry is the bound level.
                    assert!((stop - entry * 0.95).abs() < 1e-9 || !outcome.actions_taken.is_empty());
                }
                Side::Sell => {
                    assert!((target - entry * 0.90).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn zero_percent_levels_are_disabled() {
        let closes = [10.0, 8.0, 6.0, 4.0, 6.0, 8.0, 10.0];
        let candles = make_candles(&closes);
        let mut spec = sample_spec();
        spec.rules.target_pct = 0.0;
        spec.rules.stop_pct = 0.0;

        let report = run_backtest(&spec, &candles).unwrap();
        for outcome in &report.outcomes {
            assert_eq!(outcome.position.target.get(), 0.0);
            assert_eq!(outcome.position.stop.get(), 0.0);
        }
    }
}
