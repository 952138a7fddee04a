//! Crossover signal strategy.
//!
//! Walks a candle window with a cursor view over a fast/slow composite
//! and emits a time-ordered trade sequence: a buy on crossover, a sell on
//! crossunder. The emitted trades both seed positions and serve as the
//! exit-matching sequence for the trade loop.

use super::error::GridtraderError;
use super::indicator::{IndicatorEngine, IndicatorKind};
use super::trade::{Side, Trade, TradeCollection};

#[derive(Debug, Clone, PartialEq)]
pub struct CrossSignalStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl CrossSignalStrategy {
    pub fn new(fast_period: usize, slow_period: usize) -> Result<Self, GridtraderError> {
        if fast_period == 0 || slow_period == 0 {
            return Err(GridtraderError::ConfigInvalid {
                section: "strategy".into(),
                key: "period".into(),
                reason: "periods must be positive".into(),
            });
        }
        if fast_period >= slow_period {
            return Err(GridtraderError::ConfigInvalid {
                section: "strategy".into(),
                key: "fast_period".into(),
                reason: format!(
                    "fast period {} must be shorter than slow period {}",
                    fast_period, slow_period
                ),
            });
        }
        Ok(CrossSignalStrategy {
            fast_period,
            slow_period,
        })
    }

    /// The composite the strategy evaluates: fast and slow EMAs merged on
    /// shared timestamps.
    pub fn indicator_kind(&self) -> IndicatorKind {
        IndicatorKind::Composite(vec![
            ("fast".into(), IndicatorKind::Ema(self.fast_period)),
            ("slow".into(), IndicatorKind::Ema(self.slow_period)),
        ])
    }

    /// Generate the trade sequence over the engine's window. Warm-up
    /// candles produce no signals (missing fields never cross).
    pub fn generate_trades(
        &self,
        engine: &mut IndicatorEngine<'_>,
    ) -> Result<TradeCollection, GridtraderError> {
        let kind = self.indicator_kind();
        engine.ensure(&kind);
        let mut view = engine
            .view(&kind)
            .ok_or_else(|| GridtraderError::LogicError {
                reason: "indicator series missing after ensure".into(),
            })?;

        let mut trades = Vec::new();
        loop {
            let Some(candle) = view.candle() else { break };
            if view.crossover("fast", "slow") {
                trades.push(Trade {
                    side: Side::Buy,
                    price: candle.close,
                    timestamp: candle.timestamp,
                });
            } else if view.crossunder("fast", "slow") {
                trades.push(Trade {
                    side: Side::Sell,
                    price: candle.close,
                    timestamp: candle.timestamp,
                });
            }
            view.advance();
        }

        Ok(TradeCollection::new(trades))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Candle;

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

    #[test]
    fn construction_validates_periods() {
        assert!(CrossSignalStrategy::new(0, 5).is_err());
        assert!(CrossSignalStrategy::new(5, 5).is_err());
        assert!(CrossSignalStrategy::new(8, 5).is_err());
        assert!(CrossSignalStrategy::new(2, 5).is_ok());
    }

    #[test]
    fn v_shape_emits_buy_after_reversal() {
        // Falling then rising closes: the fast EMA crosses the slow one
        // upward on the way back up.
        let closes = [10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 6.5, 8.0, 9.5, 11.0];
        let candles = make_candles(&closes);
        let mut engine = IndicatorEngine::new(&candles);
        let strategy = CrossSignalStrategy::new(2, 4).unwrap();

        let trades = strategy.generate_trades(&mut engine).unwrap();
        assert!(!trades.is_empty());
        assert!(trades.trades().iter().any(|t| t.side == Side::Buy));
    }

    #[test]
    fn monotonic_prices_emit_no_signals() {
        let closes: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let candles = make_candles(&closes);
        let mut engine = IndicatorEngine::new(&candles);
        let strategy = CrossSignalStrategy::new(2, 4).unwrap();

        // The fast EMA stays above the slow EMA the whole way up, so no
        // cross ever completes.
        let trades = strategy.generate_trades(&mut engine).unwrap();
        assert!(trades.is_empty());
    }

    #[test]
    fn trades_are_time_ordered_and_alternate_around_reversals() {
        let closes = [10.0, 8.0, 6.0, 4.0, 6.0, 8.0, 10.0, 8.0, 6.0, 4.0, 6.0, 8.0];
        let candles = make_candles(&closes);
        let mut engine = IndicatorEngine::new(&candles);
        let strategy = CrossSignalStrategy::new(2, 4).unwrap();

        let trades = strategy.generate_trades(&mut engine).unwrap();
        let timestamps: Vec<_> = trades.trades().iter().map(|t| t.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_unstable();
        assert_eq!(timestamps, sorted);
        assert!(trades.len() >= 2);
    }
}
