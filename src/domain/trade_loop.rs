//! Trade loop state machine.
//!
//! Advances one Position candle-by-candle from its entry timestamp:
//! `Pending -> Running -> Closed`. At each tick every configured trade
//! action runs in registration order, then the loop checks the close
//! conditions: stop pierced, target pierced, a matching opposite exit
//! trade, and the tick timeout. Given identical candles and config the
//! fired actions and the closing tick are fully reproducible.

use log::debug;

use super::candle::{index_at_or_after, Candle, TimestampMs};
use super::error::GridtraderError;
use super::position::{Position, PositionStatus};
use super::trade::{Trade, TradeCollection};
use super::trade_action::TradeAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Pending,
    Running,
    Closed,
}

/// Exit-trade matching policy: with `opposite_only` the loop matches the
/// next trade on the opposite side, skipping same-side trades; otherwise
/// strictly the next trade.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchPolicy {
    pub opposite_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TradeLoopConfig {
    pub match_policy: MatchPolicy,
    /// Close after this many elapsed ticks since entry, if set.
    pub timeout_ticks: Option<usize>,
}

/// One fired action: kind and the tick it was taken at.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub kind: String,
    pub taken_at: TimestampMs,
}

/// Terminal (or end-of-data) outcome of a loop run.
#[derive(Debug)]
pub struct LoopOutcome {
    pub position: Position,
    pub entry_timestamp: TimestampMs,
    pub exit_timestamp: Option<TimestampMs>,
    pub actions_taken: Vec<ActionRecord>,
    pub ticks: usize,
}

pub struct TradeLoop<'a> {
    state: LoopState,
    position: Position,
    actions: Vec<TradeAction>,
    candles: &'a [Candle],
    trades: &'a TradeCollection,
    config: TradeLoopConfig,
}

impl<'a> TradeLoop<'a> {
    pub fn new(
        position: Position,
        actions: Vec<TradeAction>,
        candles: &'a [Candle],
        trades: &'a TradeCollection,
        config: TradeLoopConfig,
    ) -> Self {
        TradeLoop {
            state: LoopState::Pending,
            position,
            actions,
            candles,
            trades,
            config,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run to completion. Consumes the loop; the outcome owns the
    /// position. A loop that exhausts its candles without a close stays
    /// `Running` and reports no exit timestamp.
    pub fn run(mut self) -> Result<LoopOutcome, GridtraderError> {
        let entry_timestamp = self.position.entry_timestamp;
        self.state = LoopState::Running;

        // The exit trade, if any, is fixed at entry: the next trade after
        // the entry timestamp under the matching policy.
        let exit_trade: Option<Trade> = self
            .trades
            .next_after(
                entry_timestamp,
                self.position.side,
                self.config.match_policy.opposite_only,
            )
            .cloned();

        let start = index_at_or_after(self.candles, entry_timestamp);
        let mut ticks = 0usize;

        if let Some(start) = start {
            for candle in &self.candles[start..] {
                ticks += 1;
                let tick = candle.timestamp;

                // Handlers first, in registration order. A handler may
                // close the position itself (e.g. a missed stop).
                for action in &mut self.actions {
                    action.run(&mut self.position, candle, tick)?;
                    if !self.position.is_open() {
                        break;
                    }
                }

                if self.position.is_open() && self.position.stop_pierced(candle.high, candle.low) {
                    let stop = self.position.stop.get();
                    self.position.close(stop, tick, "stop pierced")?;
                } else if self.position.is_open()
                    && self.position.target_pierced(candle.high, candle.low)
                {
                    let target = self.position.target.get();
                    self.position.close(target, tick, "target pierced")?;
                } else if self.position.is_open() {
                    if let Some(exit) = &exit_trade {
                        if tick >= exit.timestamp {
                            self.position.close(exit.price, tick, "matched exit trade")?;
                        }
                    }
                }

                if self.position.is_open() {
                    if let Some(timeout) = self.config.timeout_ticks {
                        if ticks >= timeout {
                            self.position.close(candle.close, tick, "timeout")?;
                        }
                    }
                }

                if !self.position.is_open() {
                    self.state = LoopState::Closed;
                    break;
                }
            }
        }

        let exit_timestamp = match self.position.status() {
            PositionStatus::Closed { exit_timestamp, .. } => Some(*exit_timestamp),
            PositionStatus::Open => None,
        };
        debug!(
            "trade loop finished: entry {} exit {:?} after {} ticks",
            entry_timestamp, exit_timestamp, ticks
        );

        let actions_taken = self
            .actions
            .iter()
            .filter_map(|a| {
                a.taken_at().map(|taken_at| ActionRecord {
                    kind: a.kind().to_string(),
                    taken_at,
                })
            })
            .collect();

        Ok(LoopOutcome {
            position: self.position,
            entry_timestamp,
            exit_timestamp,
            actions_taken,
            ticks,
        })
    }
}
