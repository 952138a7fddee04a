//! Candle data access port trait.

use crate::domain::candle::{Candle, TimestampMs};
use crate::domain::error::GridtraderError;

pub trait CandlePort {
    /// Ordered candle sequence for (symbol, interval) within the
    /// inclusive timestamp range.
    fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        start: TimestampMs,
        end: TimestampMs,
    ) -> Result<Vec<Candle>, GridtraderError>;

    fn list_symbols(&self, interval: &str) -> Result<Vec<String>, GridtraderError>;

    /// (first, last, count) of available candles, or None when there is
    /// no data for the pair.
    fn data_range(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Option<(TimestampMs, TimestampMs, usize)>, GridtraderError>;
}
