//! Lockable price cell with an audit trail.
//!
//! The lock is a cooperative marker between trade-action handlers, not an
//! OS mutex: a Position is owned by exactly one trade loop for its whole
//! lifetime, and correctness depends on handlers respecting the holder.

use super::candle::TimestampMs;
use super::error::GridtraderError;

/// One recorded mutation. Every `set` carries a justification string.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceChange {
    pub value: f64,
    pub timestamp: TimestampMs,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Price {
    name: String,
    value: f64,
    lock_holder: Option<String>,
    history: Vec<PriceChange>,
}

impl Price {
    pub fn new(name: &str, value: f64) -> Self {
        Price {
            name: name.to_string(),
            value,
            lock_holder: None,
            history: Vec::new(),
        }
    }

    pub fn get(&self) -> f64 {
        self.value
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_locked(&self) -> bool {
        self.lock_holder.is_some()
    }

    pub fn lock_holder(&self) -> Option<&str> {
        self.lock_holder.as_deref()
    }

    /// Audit trail of applied mutations, oldest first.
    pub fn history(&self) -> &[PriceChange] {
        &self.history
    }

    /// Set the value. Fails with a LockViolation if the price is locked by
    /// a holder other than `caller`.
    pub fn set(
        &mut self,
        caller: &str,
        value: f64,
        timestamp: TimestampMs,
        reason: &str,
    ) -> Result<(), GridtraderError> {
        if let Some(held_by) = &self.lock_holder {
            if held_by != caller {
                return Err(GridtraderError::LockViolation {
                    price: self.name.clone(),
                    attempted: "set".into(),
                    holder: caller.to_string(),
                    held_by: held_by.clone(),
                });
            }
        }
        self.value = value;
        self.history.push(PriceChange {
            value,
            timestamp,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Acquire the lock. Re-locking by the current holder is a no-op.
    pub fn lock(&mut self, holder: &str) -> Result<(), GridtraderError> {
        match &self.lock_holder {
            Some(held_by) if held_by != holder => Err(GridtraderError::LockViolation {
                price: self.name.clone(),
                attempted: "lock".into(),
                holder: holder.to_string(),
                held_by: held_by.clone(),
            }),
            _ => {
                self.lock_holder = Some(holder.to_string());
                Ok(())
            }
        }
    }

    /// Release the lock. Unlocking by a non-holder is a fatal error; there
    /// is no implicit unlocking anywhere in the core.
    pub fn unlock(&mut self, holder: &str) -> Result<(), GridtraderError> {
        match &self.lock_holder {
            Some(held_by) if held_by == holder => {
                self.lock_holder = None;
                Ok(())
            }
            Some(held_by) => Err(GridtraderError::LockViolation {
                price: self.name.clone(),
                attempted: "unlock".into(),
                holder: holder.to_string(),
                held_by: held_by.clone(),
            }),
            None => Err(GridtraderError::LockViolation {
                price: self.name.clone(),
                attempted: "unlock".into(),
                holder: holder.to_string(),
                held_by: "<unlocked>".into(),
            }),
        }
    }
}
