//! ROI-threshold exit action.
//!
//! Closes the position at the candle close once ROI at the adverse
//! extreme (low for a buy, high for a sell) falls to or below the
//! configured threshold. A one-shot emergency exit driven by ROI rather
//! than a price level.

use serde_json::{json, Value};

use super::{merge_config, validate_required, ActionHandler};
use crate::domain::candle::{Candle, TimestampMs};
use crate::domain::error::GridtraderError;
use crate::domain::position::Position;
use crate::domain::trade::Side;

pub const KIND: &str = "roi_exit";

#[derive(Debug, Clone)]
pub struct RoiExit {
    roi: f64,
    lock: bool,
}

impl RoiExit {
    pub fn defaults() -> Value {
        json!({"lock": true})
    }

    pub fn from_config(config: &Value) -> Result<Self, GridtraderError> {
        let merged = merge_config(&Self::defaults(), config);
        validate_required(KIND, &merged, &["roi"])?;

        let roi = merged
            .get("roi")
            .and_then(Value::as_f64)
            .ok_or_else(|| GridtraderError::InvalidArgument {
                reason: "roi_exit: roi must be a number".into(),
            })?;
        let lock = merged.get("lock").and_then(Value::as_bool).unwrap_or(true);

        Ok(RoiExit { roi, lock })
    }
}

impl ActionHandler for RoiExit {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn perform(
        &self,
        position: &mut Position,
        candle: &Candle,
        tick: TimestampMs,
    ) -> Result<bool, GridtraderError> {
        let adverse = match position.side {
            Side::Buy => candle.low,
            Side::Sell => candle.high,
        };
        if position.roi(adverse) > self.roi {
            return Ok(false);
        }

        position.close(
            candle.close,
            tick,
            &format!("roi exit: roi at extreme fell to threshold {}%", self.roi),
        )?;
        Ok(true)
    }

    fn acquire_locks(&self, position: &mut Position) -> Result<(), GridtraderError> {
        if self.lock {
            position.stop.lock(KIND)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "TEST".into(),
            interval: "1h".into(),
            timestamp: 2000,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn missing_roi_is_config_error() {
        assert!(RoiExit::from_config(&json!({})).is_err());
    }

    #[test]
    fn buy_side_exit_at_threshold() {
        let handler = RoiExit::from_config(&json!({"roi": -10.0})).unwrap();
        let mut position = Position::new(Side::Buy, 1.0, 1000, 100.0, 0.0, 0.0);

        // Low 90 puts roi at exactly -10: fires.
        let candle = make_candle(101.0, 90.0, 95.0);
        assert!(handler.perform(&mut position, &candle, 2000).unwrap());
        assert!(!position.is_open());
    }

    #[test]
    fn buy_side_above_threshold_does_not_fire() {
        let handler = RoiExit::from_config(&json!({"roi": -10.0})).unwrap();
        let mut position = Position::new(Side::Buy, 1.0, 1000, 100.0, 0.0, 0.0);

        let candle = make_candle(101.0, 91.0, 95.0);
        assert!(!handler.perform(&mut position, &candle, 2000).unwrap());
        assert!(position.is_open());
    }

    #[test]
    fn sell_side_uses_high_as_adverse_extreme() {
        let handler = RoiExit::from_config(&json!({"roi": -5.0})).unwrap();
        let mut position = Position::new(Side::Sell, 1.0, 1000, 100.0, 0.0, 0.0);

        // High 106 puts sell-side roi at -6.
        let candle = make_candle(106.0, 99.0, 103.0);
        assert!(handler.perform(&mut position, &candle, 2000).unwrap());
        assert!(!position.is_open());
    }
}
