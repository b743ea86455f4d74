//! A single price level with FIFO order queue
//!
//! Orders at one price are kept in arrival order to enforce time priority.
//! The aggregate size is cached as a raw mantissa so level queries never
//! rescan the queue.

use std::collections::VecDeque;

use model::data::BookOrder;
use model::numeric::Quantity;

/// All orders resting at one price, oldest first.
#[derive(Debug, Clone)]
pub struct BookLevel {
    orders: VecDeque<BookOrder>,
    total_raw: u64,
    size_precision: u8,
}

impl BookLevel {
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_raw: 0,
            size_precision: 0,
        }
    }

    /// Append an order at the back of the queue.
    pub fn add(&mut self, order: BookOrder) {
        self.total_raw += order.size.raw();
        self.size_precision = self.size_precision.max(order.size.precision());
        self.orders.push_back(order);
    }

    /// Replace the size of an order in place, keeping its queue position.
    ///
    /// Returns false if the order is not at this level.
    pub fn update(&mut self, order_id: u64, size: Quantity) -> bool {
        if let Some(entry) = self.orders.iter_mut().find(|o| o.order_id == order_id) {
            self.total_raw = self.total_raw - entry.size.raw() + size.raw();
            entry.size = size;
            if size.is_zero() {
                self.orders.retain(|o| o.order_id != order_id);
            }
            true
        } else {
            false
        }
    }

    /// Remove an order, returning it if present.
    pub fn delete(&mut self, order_id: u64) -> Option<BookOrder> {
        let position = self.orders.iter().position(|o| o.order_id == order_id)?;
        let order = self.orders.remove(position)?;
        self.total_raw -= order.size.raw();
        Some(order)
    }

    /// Consume up to `qty` from the front of the queue (oldest first).
    ///
    /// Returns the quantity actually consumed. Used when an aggressor eats
    /// liquidity at this level.
    pub fn consume(&mut self, qty: Quantity) -> Quantity {
        let mut remaining = qty.raw();
        while remaining > 0 {
            let Some(front) = self.orders.front_mut() else {
                break;
            };
            let take = remaining.min(front.size.raw());
            remaining -= take;
            if take == front.size.raw() {
                self.total_raw -= take;
                self.orders.pop_front();
            } else {
                front.size = Quantity::from_raw(front.size.raw() - take, front.size.precision());
                self.total_raw -= take;
            }
        }
        Quantity::from_raw(qty.raw() - remaining, qty.precision())
    }

    /// Aggregate size at this level.
    pub fn size(&self) -> Quantity {
        Quantity::from_raw(self.total_raw, self.size_precision)
    }

    /// Aggregate size excluding orders matching the predicate.
    pub fn size_excluding(&self, exclude: impl Fn(&BookOrder) -> bool) -> Quantity {
        let raw = self
            .orders
            .iter()
            .filter(|o| !exclude(o))
            .map(|o| o.size.raw())
            .sum();
        Quantity::from_raw(raw, self.size_precision)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn orders(&self) -> impl Iterator<Item = &BookOrder> {
        self.orders.iter()
    }
}

impl Default for BookLevel {
    fn default() -> Self {
        Self::new()
    }
}
