//! Rolling population standard deviation of closes.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorKind, IndicatorPoint, IndicatorSeries, IndicatorValue};

pub fn calculate_stddev(candles: &[Candle], period: usize) -> IndicatorSeries {
    let kind = IndicatorKind::Stddev(period);
    if period == 0 || candles.len() < period {
        return IndicatorSeries { kind, points: Vec::new() };
    }

    let mut points = Vec::with_capacity(candles.len() - period + 1);
    for i in (period - 1)..candles.len() {
        let window = &candles[i + 1 - period..=i];
        let mean = window.iter().map(|c| c.close).sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|c| (c.close - mean).powi(2))
            .sum::<f64>()
            / period as f64;
        points.push(IndicatorPoint {
            timestamp: candles[i].timestamp,
            value: IndicatorValue::Simple(variance.sqrt()),
        });
    }

    IndicatorSeries { kind, points }
}
