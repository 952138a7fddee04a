//! Bollinger bands composite indicator.
//!
//! Merges the SMA middle band with the rolling standard deviation into
//! `{upper, middle, lower}` records on shared timestamp keys.

use std::collections::BTreeMap;

use crate::domain::candle::Candle;
use crate::domain::indicator::{
    sma, stddev, IndicatorKind, IndicatorPoint, IndicatorSeries, IndicatorValue,
};

pub fn calculate_bollinger(candles: &[Candle], period: usize, mult: f64) -> IndicatorSeries {
    let kind = IndicatorKind::Bollinger {
        period,
        stddev_mult_x100: (mult * 100.0).round() as u32,
    };
    if period == 0 || candles.len() < period {
        return IndicatorSeries { kind, points: Vec::new() };
    }

    let middle = sma::calculate_sma(candles, period);
    let deviation = stddev::calculate_stddev(candles, period);

    // Both sub-series share the same warm-up, so the keys line up 1:1.
    let points = middle
        .points
        .iter()
        .zip(deviation.points.iter())
        .map(|(mid, dev)| {
            let m = match &mid.value {
                IndicatorValue::Simple(v) => *v,
                _ => 0.0,
            };
            let d = match &dev.value {
                IndicatorValue::Simple(v) => *v,
                _ => 0.0,
            };
            let mut record = BTreeMap::new();
            record.insert("middle".to_string(), m);
            record.insert("upper".to_string(), m + mult * d);
            record.insert("lower".to_string(), m - mult * d);
            IndicatorPoint {
                timestamp: mid.timestamp,
                value: IndicatorValue::Record(record),
            }
        })
        .collect();

    IndicatorSeries { kind, points }
}
