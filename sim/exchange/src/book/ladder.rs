//! One side of an order book
//!
//! Levels are kept in a `BTreeMap` keyed so that ascending iteration is
//! always best-first: ask keys are the raw price mantissa, bid keys are the
//! negated mantissa. An order-id index makes update/delete O(log n) without
//! knowing the price.

use std::collections::BTreeMap;

use model::data::{BookOrder, BookSide};
use model::numeric::{Price, Quantity};

/// Bid or ask ladder of price levels.
#[derive(Debug, Clone)]
pub struct BookLadder {
    side: BookSide,
    levels: BTreeMap<i64, super::BookLevel>,
    /// order_id -> level key, for O(log n) update/delete.
    index: BTreeMap<u64, i64>,
}

impl BookLadder {
    pub fn new(side: BookSide) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
            index: BTreeMap::new(),
        }
    }

    /// Best-first sort key for a price on this side.
    fn key(&self, price: Price) -> i64 {
        match self.side {
            BookSide::Ask => price.raw(),
            BookSide::Bid => -price.raw(),
        }
    }

    fn price_from_key(&self, key: i64, precision: u8) -> Price {
        match self.side {
            BookSide::Ask => Price::from_raw(key, precision),
            BookSide::Bid => Price::from_raw(-key, precision),
        }
    }

    /// Add an order, creating its level if needed.
    pub fn add(&mut self, order: BookOrder) {
        debug_assert_eq!(order.side, self.side);
        let key = self.key(order.price);
        self.index.insert(order.order_id, key);
        self.levels.entry(key).or_default().add(order);
    }

    /// Update an order's size (in place, keeping priority) or price
    /// (re-keyed to the back of the new level's queue).
    pub fn update(&mut self, order: BookOrder) {
        let Some(&old_key) = self.index.get(&order.order_id) else {
            self.add(order);
            return;
        };
        let new_key = self.key(order.price);
        if new_key == old_key {
            if let Some(level) = self.levels.get_mut(&old_key) {
                level.update(order.order_id, order.size);
                if level.is_empty() {
                    self.levels.remove(&old_key);
                    self.index.remove(&order.order_id);
                }
            }
        } else {
            // Price change: time priority is forfeited.
            self.delete(order.order_id);
            if !order.size.is_zero() {
                self.add(order);
            }
        }
    }

    /// Remove an order, returning it if present.
    pub fn delete(&mut self, order_id: u64) -> Option<BookOrder> {
        let key = self.index.remove(&order_id)?;
        let level = self.levels.get_mut(&key)?;
        let order = level.delete(order_id);
        if level.is_empty() {
            self.levels.remove(&key);
        }
        order
    }

    /// Drop every level.
    pub fn clear(&mut self) {
        self.levels.clear();
        self.index.clear();
    }

    /// Best price on this side.
    pub fn best_price(&self) -> Option<Price> {
        let (&key, level) = self.levels.iter().next()?;
        let precision = level.orders().next().map(|o| o.price.precision())?;
        Some(self.price_from_key(key, precision))
    }

    /// Aggregate size at the best level.
    pub fn best_size(&self) -> Option<Quantity> {
        self.levels.values().next().map(|l| l.size())
    }

    /// Best price considering only orders below the id offset (external
    /// liquidity), with the external size at that level.
    pub fn best_price_excluding(&self, offset: u64) -> Option<(Price, Quantity)> {
        for (&key, level) in &self.levels {
            let size = level.size_excluding(|o| o.order_id >= offset);
            if size.is_zero() {
                continue;
            }
            let precision = level.orders().next()?.price.precision();
            return Some((self.price_from_key(key, precision), size));
        }
        None
    }

    /// Aggregate size at an exact price.
    pub fn volume_at(&self, price: Price) -> Quantity {
        self.levels
            .get(&self.key(price))
            .map(|l| l.size())
            .unwrap_or(Quantity::zero(0))
    }

    /// Walk levels best-first, consuming up to `qty` of liquidity.
    ///
    /// `limit` bounds how deep the walk may go (a BUY taker stops above its
    /// limit, a SELL taker below). `external_only` skips user-owned orders
    /// (ids at or above the caller's offset) so simulated orders never match
    /// each other.
    pub fn simulate_fills(
        &self,
        qty: Quantity,
        limit: Option<Price>,
        external_only: Option<u64>,
        max_depth: usize,
    ) -> Vec<(Price, Quantity)> {
        let mut fills = Vec::new();
        let mut remaining = qty.raw();

        for (depth, (&key, level)) in self.levels.iter().enumerate() {
            if remaining == 0 || depth >= max_depth {
                break;
            }
            let precision = match level.orders().next() {
                Some(order) => order.price.precision(),
                None => continue,
            };
            let price = self.price_from_key(key, precision);
            if let Some(limit) = limit {
                let crosses = match self.side {
                    // Walking the ask side as a BUY taker.
                    BookSide::Ask => price <= limit,
                    // Walking the bid side as a SELL taker.
                    BookSide::Bid => price >= limit,
                };
                if !crosses {
                    break;
                }
            }
            let available = match external_only {
                Some(offset) => level.size_excluding(|o| o.order_id >= offset),
                None => level.size(),
            };
            if available.is_zero() {
                continue;
            }
            let take = remaining.min(available.raw());
            fills.push((
                price,
                Quantity::from_raw(take, qty.precision().max(available.precision())),
            ));
            remaining -= take;
        }

        fills
    }

    /// Consume liquidity at an exact price, front of queue first.
    ///
    /// Used after fills are decided, to take the matched size out of the
    /// book. User-owned orders are skipped when `external_only` is set.
    pub fn consume_at(&mut self, price: Price, qty: Quantity, external_only: Option<u64>) {
        let key = self.key(price);
        let Some(level) = self.levels.get_mut(&key) else {
            return;
        };
        let mut remaining = qty.raw();
        let orders: Vec<BookOrder> = level.orders().copied().collect();
        for order in orders {
            if remaining == 0 {
                break;
            }
            if matches!(external_only, Some(offset) if order.order_id >= offset) {
                continue;
            }
            let take = remaining.min(order.size.raw());
            remaining -= take;
            let left = order.size.raw() - take;
            if left == 0 {
                level.delete(order.order_id);
                self.index.remove(&order.order_id);
            } else {
                level.update(
                    order.order_id,
                    Quantity::from_raw(left, order.size.precision()),
                );
            }
        }
        if level.is_empty() {
            self.levels.remove(&key);
        }
    }

    /// Levels in best-first order as (price, aggregate size).
    pub fn depth(&self, max_levels: usize) -> Vec<(Price, Quantity)> {
        self.levels
            .iter()
            .take(max_levels)
            .filter_map(|(&key, level)| {
                let precision = level.orders().next()?.price.precision();
                Some((self.price_from_key(key, precision), level.size()))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// All orders, best level first, FIFO within a level.
    pub fn orders(&self) -> impl Iterator<Item = &BookOrder> {
        self.levels.values().flat_map(|l| l.orders())
    }
}
