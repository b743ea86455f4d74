//! Exchange-side latency model
//!
//! Every command type gets its own one-way delay; the commit time of a
//! command is `now + base + delay(kind)`. All delays are fixed nanosecond
//! values so replays are reproducible.

use serde::{Deserialize, Serialize};

use model::commands::TradingCommand;

/// Fixed per-command-kind latencies in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyModel {
    /// Applied to every command.
    pub base_ns: i64,
    /// Extra delay for order submissions.
    pub insert_ns: i64,
    /// Extra delay for order modifications.
    pub update_ns: i64,
    /// Extra delay for cancels.
    pub delete_ns: i64,
}

impl LatencyModel {
    pub fn new(base_ns: i64, insert_ns: i64, update_ns: i64, delete_ns: i64) -> Self {
        assert!(base_ns >= 0 && insert_ns >= 0 && update_ns >= 0 && delete_ns >= 0);
        Self {
            base_ns,
            insert_ns,
            update_ns,
            delete_ns,
        }
    }

    /// Zero latency: commands commit at the next `process` call.
    pub fn none() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// One-way delay for a command.
    pub fn delay_for(&self, command: &TradingCommand) -> i64 {
        let kind_ns = match command {
            TradingCommand::SubmitOrder(_) | TradingCommand::SubmitOrderList(_) => self.insert_ns,
            TradingCommand::ModifyOrder(_) => self.update_ns,
            TradingCommand::CancelOrder(_) | TradingCommand::CancelAllOrders(_) => self.delete_ns,
            TradingCommand::QueryOrder(_) => 0,
        };
        self.base_ns + kind_ns
    }
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self::none()
    }
}
