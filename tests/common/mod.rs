#![allow(dead_code)]

use gridtrader::domain::backtest::{ActionSpec, BacktestSpec, TradeRules};
pub use gridtrader::domain::candle::{Candle, TimestampMs};
use gridtrader::domain::error::GridtraderError;
use gridtrader::domain::strategy::CrossSignalStrategy;
use gridtrader::domain::trade_loop::TradeLoopConfig;
use gridtrader::ports::candle_port::CandlePort;
use std::collections::HashMap;

pub struct MockCandlePort {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
}

impl MockCandlePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl CandlePort for MockCandlePort {
    fn fetch_candles(
        &self,
        symbol: &str,
        _interval: &str,
        start: TimestampMs,
        end: TimestampMs,
    ) -> Result<Vec<Candle>, GridtraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(GridtraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|candles| {
                candles
                    .iter()
                    .filter(|c| c.timestamp >= start && c.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self, _interval: &str) -> Result<Vec<String>, GridtraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn data_range(
        &self,
        symbol: &str,
        _interval: &str,
    ) -> Result<Option<(TimestampMs, TimestampMs, usize)>, GridtraderError> {
        Ok(self.data.get(symbol).and_then(|candles| {
            match (candles.first(), candles.last()) {
                (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, candles.len())),
                _ => None,
            }
        }))
    }
}

pub fn make_candle(timestamp: TimestampMs, close: f64) -> Candle {
    Candle {
        symbol: "BTCUSD".to_string(),
        interval: "1h".to_string(),
        timestamp,
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
    }
}

/// Candles following the given closes, one per 1000 ms starting at 1000.
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_candle(1000 * (i as i64 + 1), close))
        .collect()
}

/// A close sequence with repeated reversals, enough for EMA crossovers.
pub fn zigzag_closes(cycles: usize) -> Vec<f64> {
    let mut closes = Vec::new();
    for _ in 0..cycles {
        closes.extend_from_slice(&[10.0, 8.0, 6.0, 4.0, 6.0, 8.0, 10.0, 12.0]);
    }
    closes
}

pub fn sample_spec() -> BacktestSpec {
    BacktestSpec {
        strategy: CrossSignalStrategy::new(2, 4).unwrap(),
        rules: TradeRules {
            size: 1.0,
            target_pct: 20.0,
            stop_pct: 10.0,
        },
        actions: Vec::new(),
        loop_config: TradeLoopConfig::default(),
    }
}

pub fn spec_with_action(kind: &str, config: serde_json::Value) -> BacktestSpec {
    let mut spec = sample_spec();
    spec.actions.push(ActionSpec {
        kind: kind.to_string(),
        config,
    });
    spec
}
