//! Inflight command queue
//!
//! Commands wait here between `send` and their latency-adjusted commit time.
//! A min-heap on (commit time, arrival sequence) gives timestamp order with
//! FIFO tie-break, so two commands committing at the same nanosecond drain
//! in submission order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use model::commands::TradingCommand;

#[derive(Debug, Clone)]
struct Inflight {
    commit_ns: i64,
    seq: u64,
    command: TradingCommand,
}

impl PartialEq for Inflight {
    fn eq(&self, other: &Self) -> bool {
        self.commit_ns == other.commit_ns && self.seq == other.seq
    }
}

impl Eq for Inflight {}

impl PartialOrd for Inflight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Inflight {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest first.
        (other.commit_ns, other.seq).cmp(&(self.commit_ns, self.seq))
    }
}

/// Min-heap of commands awaiting their commit time.
#[derive(Debug, Default)]
pub struct InflightQueue {
    heap: BinaryHeap<Inflight>,
    seq: u64,
}

impl InflightQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a command to commit at `commit_ns`.
    pub fn push(&mut self, command: TradingCommand, commit_ns: i64) {
        self.heap.push(Inflight {
            commit_ns,
            seq: self.seq,
            command,
        });
        self.seq += 1;
    }

    /// Pop every command with `commit_ns <= now_ns`, earliest first.
    pub fn pop_ready(&mut self, now_ns: i64) -> Vec<(i64, TradingCommand)> {
        let mut ready = Vec::new();
        while let Some(front) = self.heap.peek() {
            if front.commit_ns > now_ns {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry exists");
            ready.push((entry.commit_ns, entry.command));
        }
        ready
    }

    /// The commit time of the earliest waiting command.
    pub fn next_commit_ns(&self) -> Option<i64> {
        self.heap.peek().map(|e| e.commit_ns)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::commands::CancelOrder;
    use model::ids::{ClientOrderId, StrategyId, TraderId};
    use uuid::Uuid;

    fn cancel(tag: &str) -> TradingCommand {
        TradingCommand::CancelOrder(CancelOrder {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("S-001"),
            instrument_id: "ETHUSDT.SIM".into(),
            client_id: None,
            client_order_id: ClientOrderId::new(tag),
            venue_order_id: None,
            command_id: Uuid::new_v4(),
            ts_init: 0,
        })
    }

    fn id_of(command: &TradingCommand) -> String {
        match command {
            TradingCommand::CancelOrder(c) => c.client_order_id.to_string(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_pop_ready_orders_by_commit_time() {
        let mut queue = InflightQueue::new();
        queue.push(cancel("late"), 300);
        queue.push(cancel("early"), 100);
        queue.push(cancel("middle"), 200);

        let ready = queue.pop_ready(250);
        let ids: Vec<String> = ready.iter().map(|(_, c)| id_of(c)).collect();
        assert_eq!(ids, vec!["early", "middle"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_commit_ns(), Some(300));
    }

    #[test]
    fn test_fifo_tie_break() {
        let mut queue = InflightQueue::new();
        queue.push(cancel("first"), 100);
        queue.push(cancel("second"), 100);
        queue.push(cancel("third"), 100);

        let ready = queue.pop_ready(100);
        let ids: Vec<String> = ready.iter().map(|(_, c)| id_of(c)).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_nothing_ready_before_commit() {
        let mut queue = InflightQueue::new();
        queue.push(cancel("a"), 100);
        assert!(queue.pop_ready(99).is_empty());
        assert_eq!(queue.len(), 1);
    }
}
