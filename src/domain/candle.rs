//! OHLCV candle representation.

/// Millisecond unix timestamp, the key type for every series in the core.
pub type TimestampMs = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub interval: String,
    pub timestamp: TimestampMs,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Named OHLCV field lookup, used by the binding layer.
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume),
            _ => None,
        }
    }
}

/// Index of the candle with the given timestamp, if present.
/// Candles are required to be sorted ascending by timestamp.
pub fn index_of(candles: &[Candle], timestamp: TimestampMs) -> Option<usize> {
    candles
        .binary_search_by_key(&timestamp, |c| c.timestamp)
        .ok()
}

/// Index of the first candle at or after the given timestamp.
pub fn index_at_or_after(candles: &[Candle], timestamp: TimestampMs) -> Option<usize> {
    let idx = candles.partition_point(|c| c.timestamp < timestamp);
    (idx < candles.len()).then_some(idx)
}
