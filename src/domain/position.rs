//! Position tracking with lockable price fields.

use super::candle::TimestampMs;
use super::error::GridtraderError;
use super::price::Price;
use super::trade::Side;

#[derive(Debug, Clone, PartialEq)]
pub enum PositionStatus {
    Open,
    Closed {
        exit_price: f64,
        exit_timestamp: TimestampMs,
        reason: String,
    },
}

/// An open trading position. `entry`, `target` and `stop` are lockable
/// [`Price`] cells so trade-action handlers can coordinate mutations.
#[derive(Debug, Clone)]
pub struct Position {
    pub side: Side,
    pub size: f64,
    pub entry_timestamp: TimestampMs,
    pub entry: Price,
    pub target: Price,
    pub stop: Price,
    status: PositionStatus,
}

impl Position {
    pub fn new(
        side: Side,
        size: f64,
        entry_timestamp: TimestampMs,
        entry_price: f64,
        target_price: f64,
        stop_price: f64,
    ) -> Self {
        Position {
            side,
            size,
            entry_timestamp,
            entry: Price::new("entry", entry_price),
            target: Price::new("target", target_price),
            stop: Price::new("stop", stop_price),
            status: PositionStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn status(&self) -> &PositionStatus {
        &self.status
    }

    /// Return on investment at `price`, in percent of the entry price.
    /// Pure function of entry price, side and the given price.
    pub fn roi(&self, price: f64) -> f64 {
        let entry = self.entry.get();
        if entry == 0.0 {
            return 0.0;
        }
        match self.side {
            Side::Buy => (price - entry) / entry * 100.0,
            Side::Sell => (entry - price) / entry * 100.0,
        }
    }

    /// Whether `low`/`high` of a candle pierces the stop, direction-aware.
    pub fn stop_pierced(&self, high: f64, low: f64) -> bool {
        let stop = self.stop.get();
        if stop == 0.0 {
            return false;
        }
        match self.side {
            Side::Buy => low <= stop,
            Side::Sell => high >= stop,
        }
    }

    /// Whether `low`/`high` of a candle pierces the target, direction-aware.
    pub fn target_pierced(&self, high: f64, low: f64) -> bool {
        let target = self.target.get();
        if target == 0.0 {
            return false;
        }
        match self.side {
            Side::Buy => high >= target,
            Side::Sell => low <= target,
        }
    }

    /// Close the position. Closing an already-closed position is a logic
    /// defect and fails.
    pub fn close(
        &mut self,
        exit_price: f64,
        exit_timestamp: TimestampMs,
        reason: &str,
    ) -> Result<(), GridtraderError> {
        if !self.is_open() {
            return Err(GridtraderError::LogicError {
                reason: format!("position entered at {} already closed", self.entry_timestamp),
            });
        }
        self.status = PositionStatus::Closed {
            exit_price,
            exit_timestamp,
            reason: reason.to_string(),
        };
        Ok(())
    }
}
