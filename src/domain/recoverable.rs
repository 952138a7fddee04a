//! Bounded, category-filtered retry wrapper.
//!
//! Wraps an operation that may fail transiently: failures whose category
//! is in the allowlist are retried after a fixed blocking delay until the
//! budget runs out, then the original failure is re-raised. A failure
//! outside the allowlist propagates immediately, with no delay and no
//! retry. The sleep blocks the calling thread; the wrapper exists for
//! inherently blocking work.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use log::warn;

use super::error::{FailureCategory, GridtraderError};

/// Errors a [`Recoverable`] can classify.
pub trait Categorized {
    fn category(&self) -> FailureCategory;
}

impl Categorized for GridtraderError {
    fn category(&self) -> FailureCategory {
        GridtraderError::category(self)
    }
}

#[derive(Debug, Clone)]
pub struct Recoverable {
    retry_delay: Duration,
    retry_limit: u32,
    handled: HashSet<FailureCategory>,
}

impl Recoverable {
    /// An empty allowlist would mean "retry nothing", which is always a
    /// misconfiguration; it fails at construction.
    pub fn new(
        retry_delay: Duration,
        retry_limit: u32,
        handled: HashSet<FailureCategory>,
    ) -> Result<Self, GridtraderError> {
        if handled.is_empty() {
            return Err(GridtraderError::LogicError {
                reason: "recoverable requires at least one handled failure category".into(),
            });
        }
        Ok(Recoverable {
            retry_delay,
            retry_limit,
            handled,
        })
    }

    pub fn handles(&self, category: FailureCategory) -> bool {
        self.handled.contains(&category)
    }

    /// Execute `op`, retrying handled failures. The default hook logs the
    /// failure before sleeping.
    pub fn run<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: Categorized + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        self.run_with_hook(op, |failure| {
            warn!("recoverable operation failed, retrying: {}", failure);
        })
    }

    /// Execute `op` with a custom per-failure hook, invoked before each
    /// retry delay.
    pub fn run_with_hook<T, E, F, H>(&self, mut op: F, mut handle: H) -> Result<T, E>
    where
        E: Categorized,
        F: FnMut() -> Result<T, E>,
        H: FnMut(&E),
    {
        let mut budget = self.retry_limit;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    if !self.handles(failure.category()) || budget == 0 {
                        return Err(failure);
                    }
                    handle(&failure);
                    thread::sleep(self.retry_delay);
                    budget -= 1;
                }
            }
        }
    }
}
