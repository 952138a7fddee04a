//! MACD composite indicator.
//!
//! Merges three sub-series on shared timestamp keys: `line` (fast EMA -
//! slow EMA), `signal` (EMA of the line) and `histogram` (line - signal).
//! The signal has its own warm-up on top of the line's, so leading records
//! carry only the `line` field.

use std::collections::BTreeMap;

use crate::domain::candle::{Candle, TimestampMs};
use crate::domain::indicator::ema::ema_points;
use crate::domain::indicator::{
    IndicatorKind, IndicatorPoint, IndicatorSeries, IndicatorValue,
};

pub fn calculate_macd(
    candles: &[Candle],
    fast: usize,
    slow: usize,
    signal: usize,
) -> IndicatorSeries {
    let kind = IndicatorKind::Macd { fast, slow, signal };
    let warmup = fast.max(slow);
    if fast == 0 || slow == 0 || signal == 0 || candles.len() < warmup {
        return IndicatorSeries { kind, points: Vec::new() };
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let timestamps: Vec<TimestampMs> = candles.iter().map(|c| c.timestamp).collect();

    let fast_ema = ema_points(&closes, &timestamps, fast);
    let slow_ema = ema_points(&closes, &timestamps, slow);

    // Line exists where both EMAs do: the suffix starting at the longer seed.
    let mut line: Vec<(TimestampMs, f64)> = Vec::with_capacity(candles.len() - warmup + 1);
    for i in (warmup - 1)..candles.len() {
        let fast_point = &fast_ema[i - (fast - 1)];
        let slow_point = &slow_ema[i - (slow - 1)];
        if let (IndicatorValue::Simple(f), IndicatorValue::Simple(s)) =
            (&fast_point.value, &slow_point.value)
        {
            line.push((timestamps[i], f - s));
        }
    }

    let line_values: Vec<f64> = line.iter().map(|(_, v)| *v).collect();
    let line_timestamps: Vec<TimestampMs> = line.iter().map(|(t, _)| *t).collect();
    let signal_ema = ema_points(&line_values, &line_timestamps, signal);

    let signal_by_ts: BTreeMap<TimestampMs, f64> = signal_ema
        .iter()
        .filter_map(|p| match p.value {
            IndicatorValue::Simple(v) => Some((p.timestamp, v)),
            _ => None,
        })
        .collect();

    let points = line
        .into_iter()
        .map(|(timestamp, line_value)| {
            let mut record = BTreeMap::new();
            record.insert("line".to_string(), line_value);
            if let Some(signal_value) = signal_by_ts.get(&timestamp) {
                record.insert("signal".to_string(), *signal_value);
                record.insert("histogram".to_string(), line_value - signal_value);
            }
            IndicatorPoint {
                timestamp,
                value: IndicatorValue::Record(record),
            }
        })
        .collect();

    IndicatorSeries { kind, points }
}
