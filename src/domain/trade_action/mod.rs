//! One-shot trade actions.
//!
//! A trade action pairs a handler (from a closed registry) with a merged
//! configuration and runs at most once against its Position. Construction
//! merges the declarative config over the handler's defaults (supplied
//! keys win, deep merge) and validates required keys; a missing or empty
//! required key is a construction-time failure.

pub mod move_stop;
pub mod roi_exit;

use serde_json::{Map, Value};

use super::candle::{Candle, TimestampMs};
use super::error::GridtraderError;
use super::position::Position;

/// Evaluated per tick against an open position. Implementations decide in
/// `perform` whether the action fires; lock choreography beyond the
/// generic on-success acquisition lives inside the handler.
pub trait ActionHandler {
    fn kind(&self) -> &'static str;

    /// Evaluate the action for this tick. Returns true when the action
    /// fired (and has applied its effect to the position).
    fn perform(
        &self,
        position: &mut Position,
        candle: &Candle,
        tick: TimestampMs,
    ) -> Result<bool, GridtraderError>;

    /// Locks acquired after a successful fire when `lock: true`.
    fn acquire_locks(&self, _position: &mut Position) -> Result<(), GridtraderError> {
        Ok(())
    }
}

/// Closed handler registry: a kind identifier resolves to a constructor
/// or the configuration is rejected.
pub fn build_handler(
    kind: &str,
    config: &Value,
) -> Result<Box<dyn ActionHandler>, GridtraderError> {
    match kind {
        move_stop::KIND => Ok(Box::new(move_stop::MoveStop::from_config(config)?)),
        roi_exit::KIND => Ok(Box::new(roi_exit::RoiExit::from_config(config)?)),
        other => Err(GridtraderError::InvalidArgument {
            reason: format!("unknown trade action kind '{}'", other),
        }),
    }
}

/// Deep-merge `supplied` over `defaults`; supplied keys win, nested
/// objects merge recursively.
pub fn merge_config(defaults: &Value, supplied: &Value) -> Value {
    match (defaults, supplied) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (key, value) in over {
                let entry = merged.entry(key.clone());
                match entry {
                    serde_json::map::Entry::Occupied(mut slot) => {
                        let combined = merge_config(slot.get(), value);
                        slot.insert(combined);
                    }
                    serde_json::map::Entry::Vacant(slot) => {
                        slot.insert(value.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        _ => supplied.clone(),
    }
}

/// A required key must be present and non-empty in the merged config.
pub fn validate_required(
    action: &str,
    config: &Value,
    required: &[&str],
) -> Result<(), GridtraderError> {
    for key in required {
        let missing = match config.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        };
        if missing {
            return Err(GridtraderError::MissingActionKey {
                action: action.to_string(),
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

/// One action instance per (handler, Position). Immutable once taken.
pub struct TradeAction {
    kind: String,
    config: Value,
    handler: Box<dyn ActionHandler>,
    lock_on_success: bool,
    taken: bool,
    taken_at: Option<TimestampMs>,
}

impl TradeAction {
    /// Build from a declarative config. The config is merged over the
    /// handler defaults before validation, so partial configs are fine.
    pub fn new(kind: &str, config: &Value) -> Result<Self, GridtraderError> {
        let handler = build_handler(kind, config)?;
        let lock_on_success = config
            .get("lock")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Ok(TradeAction {
            kind: kind.to_string(),
            config: config.clone(),
            handler,
            lock_on_success,
            taken: false,
            taken_at: None,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn is_taken(&self) -> bool {
        self.taken
    }

    pub fn taken_at(&self) -> Option<TimestampMs> {
        self.taken_at
    }

    /// Evaluate for one tick. A no-op once taken. On success, acquires
    /// the handler's locks (unless `lock: false`), marks the action taken
    /// and stamps the tick timestamp.
    pub fn run(
        &mut self,
        position: &mut Position,
        candle: &Candle,
        tick: TimestampMs,
    ) -> Result<bool, GridtraderError> {
        if self.taken {
            return Ok(false);
        }
        if !self.handler.perform(position, candle, tick)? {
            return Ok(false);
        }
        if self.lock_on_success {
            self.handler.acquire_locks(position)?;
        }
        self.taken = true;
        self.taken_at = Some(tick);
        Ok(true)
    }
}

impl std::fmt::Debug for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeAction")
            .field("kind", &self.kind)
            .field("taken", &self.taken)
            .field("taken_at", &self.taken_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::Side;
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
    fn merge_supplied_keys_win() {
        let defaults = json!({"lock": true, "target": {"roi": 10.0, "kind": "soft"}});
        let supplied = json!({"target": {"roi": 50.0}});
        let merged = merge_config(&defaults, &supplied);

        assert_eq!(merged["lock"], json!(true));
        assert_eq!(merged["target"]["roi"], json!(50.0));
        assert_eq!(merged["target"]["kind"], json!("soft"));
    }

    #[test]
    fn merge_non_object_replaces() {
        let defaults = json!({"target": {"roi": 10.0}});
        let supplied = json!({"target": 5.0});
        let merged = merge_config(&defaults, &supplied);
        assert_eq!(merged["target"], json!(5.0));
    }

    #[test]
    fn required_keys_must_be_present_and_non_empty() {
        let config = json!({"a": 1, "empty": "", "obj": {}});
        assert!(validate_required("x", &config, &["a"]).is_ok());
        assert!(validate_required("x", &config, &["missing"]).is_err());
        assert!(validate_required("x", &config, &["empty"]).is_err());
        assert!(validate_required("x", &config, &["obj"]).is_err());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(TradeAction::new("trailing_unicorn", &json!({})).is_err());
    }

    #[test]
    fn run_is_one_shot() {
        let mut action = TradeAction::new(
            "roi_exit",
            &json!({"roi": -10.0, "lock": false}),
        )
        .unwrap();
        let mut position = Position::new(Side::Buy, 1.0, 1000, 100.0, 0.0, 0.0);

        // Low of 85 puts roi at -15, beyond the -10 threshold.
        let candle = make_candle(101.0, 85.0, 90.0);
        assert!(action.run(&mut position, &candle, 2000).unwrap());
        assert!(action.is_taken());
        assert_eq!(action.taken_at(), Some(2000));

        // Second run is a no-op even with a triggering candle.
        let mut position2 = Position::new(Side::Buy, 1.0, 1000, 100.0, 0.0, 0.0);
        assert!(!action.run(&mut position2, &candle, 3000).unwrap());
        assert_eq!(action.taken_at(), Some(2000));
    }

    #[test]
    fn non_triggering_run_reports_nothing() {
        let mut action = TradeAction::new("roi_exit", &json!({"roi": -10.0})).unwrap();
        let mut position = Position::new(Side::Buy, 1.0, 1000, 100.0, 0.0, 0.0);
        let candle = make_candle(101.0, 99.0, 100.0);

        assert!(!action.run(&mut position, &candle, 2000).unwrap());
        assert!(!action.is_taken());
        assert_eq!(action.taken_at(), None);
    }
}
