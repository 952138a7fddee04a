//! Relative Strength Index indicator.
//!
//! Wilder smoothing: seed averages over the first `period` price changes,
//! then avg = (prev * (n-1) + current) / n. The first point lands on bar
//! index `period`.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorKind, IndicatorPoint, IndicatorSeries, IndicatorValue};

pub fn calculate_rsi(candles: &[Candle], period: usize) -> IndicatorSeries {
    let kind = IndicatorKind::Rsi(period);
    if period == 0 || candles.len() <= period {
        return IndicatorSeries { kind, points: Vec::new() };
    }

    let mut gains = Vec::with_capacity(candles.len() - 1);
    let mut losses = Vec::with_capacity(candles.len() - 1);
    for pair in candles.windows(2) {
        let change = pair[1].close - pair[0].close;
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain: f64 = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss: f64 = losses[..period].iter().sum::<f64>() / period as f64;

    let mut points = Vec::with_capacity(candles.len() - period);
    points.push(IndicatorPoint {
        timestamp: candles[period].timestamp,
        value: IndicatorValue::Simple(rsi_value(avg_gain, avg_loss)),
    });

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        points.push(IndicatorPoint {
            timestamp: candles[i + 1].timestamp,
            value: IndicatorValue::Simple(rsi_value(avg_gain, avg_loss)),
        });
    }

    IndicatorSeries { kind, points }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
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
    fn rsi_all_gains_is_100() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = calculate_rsi(&candles, 3);
        assert_eq!(series.len(), 2);
        for point in &series.points {
            assert!((simple(point) - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let candles = make_candles(&[5.0, 4.0, 3.0, 2.0, 1.0]);
        let series = calculate_rsi(&candles, 3);
        for point in &series.points {
            assert!(simple(point).abs() < 1e-9);
        }
    }

    #[test]
    fn rsi_balanced_is_50() {
        // Alternating +1/-1 over the seed window gives equal avg gain/loss.
        let candles = make_candles(&[10.0, 11.0, 10.0, 11.0, 10.0]);
        let series = calculate_rsi(&candles, 4);
        assert_eq!(series.len(), 1);
        assert!((simple(&series.points[0]) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_first_point_lands_after_seed_window() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let series = calculate_rsi(&candles, 3);
        assert_eq!(series.points[0].timestamp, candles[3].timestamp);
    }

    #[test]
    fn rsi_insufficient_bars() {
        let candles = make_candles(&[1.0, 2.0, 3.0]);
        assert!(calculate_rsi(&candles, 3).is_empty());
        assert!(calculate_rsi(&candles, 0).is_empty());
    }
}
