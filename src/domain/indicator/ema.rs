//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warm-up: the first (n-1) bars produce no points.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorKind, IndicatorPoint, IndicatorSeries, IndicatorValue};

pub fn calculate_ema(candles: &[Candle], period: usize) -> IndicatorSeries {
    let kind = IndicatorKind::Ema(period);
    if period == 0 || candles.len() < period {
        return IndicatorSeries { kind, points: Vec::new() };
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let timestamps: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
    let points = ema_points(&closes, &timestamps, period);

    IndicatorSeries { kind, points }
}

/// EMA over an arbitrary aligned (values, timestamps) pair. Shared with
/// derived series such as the MACD signal line.
pub(crate) fn ema_points(values: &[f64], timestamps: &[i64], period: usize) -> Vec<IndicatorPoint> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut points = Vec::with_capacity(values.len() - period + 1);
    let mut ema: f64 = values[..period].iter().sum::<f64>() / period as f64;
    points.push(IndicatorPoint {
        timestamp: timestamps[period - 1],
        value: IndicatorValue::Simple(ema),
    });

    for i in period..values.len() {
        ema = values[i] * k + ema * (1.0 - k);
        points.push(IndicatorPoint {
            timestamp: timestamps[i],
            value: IndicatorValue::Simple(ema),
        });
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "TEST".into(),
                interval: "1h".into(),
                timestamp: 1000 * (i as i64 + 1),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn simple(point: &IndicatorPoint) -> f64 {
        match point.value {
            IndicatorValue::Simple(v) => v,
            _ => panic!("expected simple value"),
        }
    }

    #[test]
    fn ema_seed_is_sma() {
        let candles = make_candles(&[10.0, 20.0, 30.0]);
        let series = calculate_ema(&candles, 3);

        assert_eq!(series.len(), 1);
        assert_eq!(series.points[0].timestamp, 3000);
        let expected_sma = (10.0 + 20.0 + 30.0) / 3.0;
        assert!((simple(&series.points[0]) - expected_sma).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_recursive_calculation() {
        let candles = make_candles(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let series = calculate_ema(&candles, 3);

        let k = 2.0 / 4.0;
        let sma = (10.0 + 20.0 + 30.0) / 3.0;
        let ema_3 = 40.0 * k + sma * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);

        assert_eq!(series.len(), 3);
        assert!((simple(&series.points[1]) - ema_3).abs() < f64::EPSILON);
        assert!((simple(&series.points[2]) - ema_4).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_equal_prices() {
        let candles = make_candles(&[100.0; 5]);
        let series = calculate_ema(&candles, 3);
        for point in &series.points {
            assert!((simple(point) - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn ema_insufficient_bars() {
        let candles = make_candles(&[10.0, 20.0]);
        assert!(calculate_ema(&candles, 3).is_empty());
        assert!(calculate_ema(&candles, 0).is_empty());
    }
}
