//! Stop-moving trade action.
//!
//! Fires when the candle's favorable extreme crosses the configured
//! target (a price level or an ROI threshold, exactly one of the two).
//! On trigger it unlocks the stop if locked, moves it to
//! `new_stop_price`, re-locks it under itself, then re-checks the current
//! candle's close against the new stop: a close already past it closes
//! the position at the close price instead of waiting for the next tick.

use serde_json::{json, Value};

use super::{merge_config, validate_required, ActionHandler};
use crate::domain::candle::{Candle, TimestampMs};
use crate::domain::error::GridtraderError;
use crate::domain::position::Position;
use crate::domain::trade::Side;

pub const KIND: &str = "move_stop";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Price(f64),
    Roi(f64),
}

#[derive(Debug, Clone)]
pub struct MoveStop {
    target: Target,
    new_stop_price: f64,
    lock: bool,
}

impl MoveStop {
    pub fn defaults() -> Value {
        json!({
            "lock": true,
            "target": {},
        })
    }

    pub fn from_config(config: &Value) -> Result<Self, GridtraderError> {
        let merged = merge_config(&Self::defaults(), config);
        validate_required(KIND, &merged, &["new_stop_price", "target"])?;

        let target_price = merged.pointer("/target/price").and_then(Value::as_f64);
        let target_roi = merged.pointer("/target/roi").and_then(Value::as_f64);
        let target = match (target_price, target_roi) {
            (Some(_), Some(_)) => {
                return Err(GridtraderError::LogicError {
                    reason: "move_stop: target.price and target.roi are mutually exclusive".into(),
                });
            }
            (Some(price), None) => Target::Price(price),
            (None, Some(roi)) => Target::Roi(roi),
            (None, None) => {
                return Err(GridtraderError::MissingActionKey {
                    action: KIND.into(),
                    key: "target.price|target.roi".into(),
                });
            }
        };

        let new_stop_price = merged
            .get("new_stop_price")
            .and_then(Value::as_f64)
            .ok_or_else(|| GridtraderError::InvalidArgument {
                reason: "move_stop: new_stop_price must be a number".into(),
            })?;

        let lock = merged.get("lock").and_then(Value::as_bool).unwrap_or(true);

        Ok(MoveStop {
            target,
            new_stop_price,
            lock,
        })
    }

    fn triggered(&self, position: &Position, candle: &Candle) -> bool {
        // Favorable extreme: high for a buy, low for a sell.
        let favorable = match position.side {
            Side::Buy => candle.high,
            Side::Sell => candle.low,
        };
        match self.target {
            Target::Price(price) => match position.side {
                Side::Buy => favorable >= price,
                Side::Sell => favorable <= price,
            },
            Target::Roi(roi) => position.roi(favorable) >= roi,
        }
    }

    fn close_pierces_stop(&self, position: &Position, close: f64) -> bool {
        match position.side {
            Side::Buy => close < self.new_stop_price,
            Side::Sell => close > self.new_stop_price,
        }
    }
}

impl ActionHandler for MoveStop {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn perform(
        &self,
        position: &mut Position,
        candle: &Candle,
        tick: TimestampMs,
    ) -> Result<bool, GridtraderError> {
        if !self.triggered(position, candle) {
            return Ok(false);
        }

        if let Some(holder) = position.stop.lock_holder().map(str::to_string) {
            position.stop.unlock(&holder)?;
        }

        let reason = match self.target {
            Target::Price(price) => format!("target price {} reached, stop moved", price),
            Target::Roi(roi) => format!("target roi {}% reached, stop moved", roi),
        };
        position
            .stop
            .set(KIND, self.new_stop_price, tick, &reason)?;
        if self.lock {
            position.stop.lock(KIND)?;
        }

        // The close may already sit past the stop we just placed; waiting
        // for the next tick would fill at a stale price.
        if self.close_pierces_stop(position, candle.close) {
            position.close(
                candle.close,
                tick,
                "missed stop: close already past moved stop",
            )?;
        }

        Ok(true)
    }
}
