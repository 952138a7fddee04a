//! Simple Moving Average indicator.
//!
//! Rolling mean of closes over `period` bars; the first (period - 1) bars
//! are warm-up and produce no points.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorKind, IndicatorPoint, IndicatorSeries, IndicatorValue};

pub fn calculate_sma(candles: &[Candle], period: usize) -> IndicatorSeries {
    let kind = IndicatorKind::Sma(period);
    if period == 0 || candles.len() < period {
        return IndicatorSeries { kind, points: Vec::new() };
    }

    let mut points = Vec::with_capacity(candles.len() - period + 1);
    let mut sum: f64 = candles[..period - 1].iter().map(|c| c.close).sum();

    for i in (period - 1)..candles.len() {
        sum += candles[i].close;
        points.push(IndicatorPoint {
            timestamp: candles[i].timestamp,
            value: IndicatorValue::Simple(sum / period as f64),
        });
        sum -= candles[i + 1 - period].close;
    }

    IndicatorSeries { kind, points }
}
