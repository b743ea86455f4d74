//! Per-instrument order book
//!
//! Supports L1 (top-of-book synthesized from quote/trade ticks), L2
//! (price-aggregated deltas) and L3 (per-order deltas). Simulated user
//! orders share the ladders with external liquidity but carry ids at or
//! above [`USER_ORDER_ID_OFFSET`] so matching can tell them apart.

use model::data::{
    BookAction, BookOrder, BookSide, BookType, OrderBookDelta, OrderBookSnapshot, QuoteTick,
    TradeTick,
};
use model::ids::InstrumentId;
use model::numeric::{Price, Quantity};
use model::order::OrderSide;

use super::BookLadder;

/// Synthetic order id for the L1 bid entry.
const L1_BID_ORDER_ID: u64 = 1;
/// Synthetic order id for the L1 ask entry.
const L1_ASK_ORDER_ID: u64 = 2;

/// Order ids at or above this offset belong to simulated user orders.
pub const USER_ORDER_ID_OFFSET: u64 = 1 << 48;

/// An order book for one instrument.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub instrument_id: InstrumentId,
    pub book_type: BookType,
    bids: BookLadder,
    asks: BookLadder,
    sequence: u64,
    ts_last: i64,
    update_count: u64,
}

impl OrderBook {
    pub fn new(instrument_id: InstrumentId, book_type: BookType) -> Self {
        Self {
            instrument_id,
            book_type,
            bids: BookLadder::new(BookSide::Bid),
            asks: BookLadder::new(BookSide::Ask),
            sequence: 0,
            ts_last: 0,
            update_count: 0,
        }
    }

    fn ladder_mut(&mut self, side: BookSide) -> &mut BookLadder {
        match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        }
    }

    fn ladder(&self, side: BookSide) -> &BookLadder {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    /// Apply a single delta.
    pub fn apply_delta(&mut self, delta: &OrderBookDelta) {
        match delta.action {
            BookAction::Add => self.ladder_mut(delta.order.side).add(delta.order),
            BookAction::Update => self.ladder_mut(delta.order.side).update(delta.order),
            BookAction::Delete => {
                self.ladder_mut(delta.order.side).delete(delta.order.order_id);
            }
            BookAction::Clear => {
                self.bids.clear();
                self.asks.clear();
            }
        }
        self.sequence = delta.sequence;
        self.ts_last = delta.ts_event;
        self.update_count += 1;
    }

    /// Apply a batch of deltas in order.
    pub fn apply_deltas(&mut self, deltas: &[OrderBookDelta]) {
        for delta in deltas {
            self.apply_delta(delta);
        }
    }

    /// Replace the whole book atomically: clear, then load both sides.
    ///
    /// User orders resting on the book survive a snapshot — the external
    /// image replaces external liquidity only.
    pub fn apply_snapshot(&mut self, snapshot: &OrderBookSnapshot) {
        let user_orders: Vec<BookOrder> = self
            .bids
            .orders()
            .chain(self.asks.orders())
            .filter(|o| o.order_id >= USER_ORDER_ID_OFFSET)
            .copied()
            .collect();
        self.bids.clear();
        self.asks.clear();
        for order in &snapshot.bids {
            self.bids.add(*order);
        }
        for order in &snapshot.asks {
            self.asks.add(*order);
        }
        for order in user_orders {
            self.ladder_mut(order.side).add(order);
        }
        self.sequence = snapshot.sequence;
        self.ts_last = snapshot.ts_event;
        self.update_count += 1;
    }

    /// Refresh the synthetic L1 entries from a top-of-book quote.
    pub fn update_quote_tick(&mut self, tick: &QuoteTick) {
        self.bids.delete(L1_BID_ORDER_ID);
        self.asks.delete(L1_ASK_ORDER_ID);
        self.bids.add(BookOrder::new(
            BookSide::Bid,
            tick.bid,
            tick.bid_size,
            L1_BID_ORDER_ID,
        ));
        self.asks.add(BookOrder::new(
            BookSide::Ask,
            tick.ask,
            tick.ask_size,
            L1_ASK_ORDER_ID,
        ));
        self.ts_last = tick.ts_event;
        self.update_count += 1;
    }

    /// For L1 books a trade pins both synthetic entries at the trade price.
    pub fn update_trade_tick(&mut self, tick: &TradeTick) {
        if self.book_type != BookType::L1Tbbo {
            return;
        }
        self.bids.delete(L1_BID_ORDER_ID);
        self.asks.delete(L1_ASK_ORDER_ID);
        self.bids.add(BookOrder::new(
            BookSide::Bid,
            tick.price,
            tick.size,
            L1_BID_ORDER_ID,
        ));
        self.asks.add(BookOrder::new(
            BookSide::Ask,
            tick.price,
            tick.size,
            L1_ASK_ORDER_ID,
        ));
        self.ts_last = tick.ts_event;
        self.update_count += 1;
    }

    /// Rest a simulated user order on the book.
    pub fn add_user_order(&mut self, order: BookOrder) {
        debug_assert!(order.order_id >= USER_ORDER_ID_OFFSET);
        self.ladder_mut(order.side).add(order);
    }

    /// Update a resting user order's size in place (keeps priority) or
    /// price (re-keyed, loses priority).
    pub fn update_user_order(&mut self, order: BookOrder) {
        self.ladder_mut(order.side).update(order);
    }

    /// Remove a resting user order.
    pub fn delete_user_order(&mut self, side: BookSide, order_id: u64) {
        self.ladder_mut(side).delete(order_id);
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        self.bids.best_price()
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.asks.best_price()
    }

    pub fn best_bid_size(&self) -> Option<Quantity> {
        self.bids.best_size()
    }

    pub fn best_ask_size(&self) -> Option<Quantity> {
        self.asks.best_size()
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid_price(), self.best_ask_price()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Midpoint with one extra digit of precision.
    pub fn midpoint(&self) -> Option<Price> {
        match (self.best_bid_price(), self.best_ask_price()) {
            (Some(bid), Some(ask)) => {
                let precision = (bid.precision().max(ask.precision()) + 1).min(9);
                Some(Price::from_raw((bid.raw() + ask.raw()) / 2, precision))
            }
            _ => None,
        }
    }

    /// Aggregate size resting at an exact price on a side.
    pub fn volume_at(&self, side: BookSide, price: Price) -> Quantity {
        self.ladder(side).volume_at(price)
    }

    /// Best bid considering external liquidity only.
    pub fn best_external_bid(&self) -> Option<(Price, Quantity)> {
        self.bids.best_price_excluding(USER_ORDER_ID_OFFSET)
    }

    /// Best ask considering external liquidity only.
    pub fn best_external_ask(&self) -> Option<(Price, Quantity)> {
        self.asks.best_price_excluding(USER_ORDER_ID_OFFSET)
    }

    /// Whether best bid >= best ask.
    pub fn is_crossed(&self) -> bool {
        matches!(
            (self.best_bid_price(), self.best_ask_price()),
            (Some(bid), Some(ask)) if bid >= ask
        )
    }

    /// Determine the (price, quantity) pairs a taker of `side` would fill,
    /// consuming opposing liquidity top-down.
    pub fn simulate_fills(
        &self,
        side: OrderSide,
        qty: Quantity,
        limit: Option<Price>,
        external_only: bool,
        max_depth: usize,
    ) -> Vec<(Price, Quantity)> {
        let exclude = external_only.then_some(USER_ORDER_ID_OFFSET);
        match side {
            OrderSide::Buy => self.asks.simulate_fills(qty, limit, exclude, max_depth),
            OrderSide::Sell => self.bids.simulate_fills(qty, limit, exclude, max_depth),
        }
    }

    /// Take filled liquidity out of the opposing side after a taker match.
    pub fn consume_fills(
        &mut self,
        taker_side: OrderSide,
        fills: &[(Price, Quantity)],
        external_only: bool,
    ) {
        let exclude = external_only.then_some(USER_ORDER_ID_OFFSET);
        let ladder = match taker_side {
            OrderSide::Buy => &mut self.asks,
            OrderSide::Sell => &mut self.bids,
        };
        for (price, qty) in fills {
            ladder.consume_at(*price, *qty, exclude);
        }
    }

    /// Depth per side, best first.
    pub fn depth(&self, max_levels: usize) -> (Vec<(Price, Quantity)>, Vec<(Price, Quantity)>) {
        (self.bids.depth(max_levels), self.asks.depth(max_levels))
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn ts_last(&self) -> i64 {
        self.ts_last
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::data::AggressorSide;
    use model::ids::TradeId;

    fn instrument_id() -> InstrumentId {
        "ETHUSDT.SIM".into()
    }

    fn quote(bid: &str, ask: &str, bid_size: &str, ask_size: &str, ts: i64) -> QuoteTick {
        QuoteTick::new(
            instrument_id(),
            bid.parse().unwrap(),
            ask.parse().unwrap(),
            bid_size.parse().unwrap(),
            ask_size.parse().unwrap(),
            ts,
            ts,
        )
        .unwrap()
    }

    fn delta(action: BookAction, side: BookSide, price: &str, size: &str, id: u64, seq: u64) -> OrderBookDelta {
        OrderBookDelta::new(
            instrument_id(),
            action,
            BookOrder::new(side, price.parse().unwrap(), size.parse().unwrap(), id),
            seq,
            seq as i64,
            seq as i64,
        )
        .unwrap()
    }

    #[test]
    fn test_quote_tick_replaces_top_of_book() {
        let mut book = OrderBook::new(instrument_id(), BookType::L1Tbbo);
        book.update_quote_tick(&quote("100.00", "100.02", "10", "10", 1));
        assert_eq!(book.best_bid_price().unwrap().to_string(), "100.00");
        assert_eq!(book.best_ask_price().unwrap().to_string(), "100.02");

        book.update_quote_tick(&quote("100.01", "100.03", "5", "5", 2));
        assert_eq!(book.best_bid_price().unwrap().to_string(), "100.01");
        assert_eq!(book.best_bid_size().unwrap().to_string(), "5");
        // The old synthetic entries are gone, not stacked.
        let (bids, asks) = book.depth(10);
        assert_eq!(bids.len(), 1);
        assert_eq!(asks.len(), 1);
    }

    #[test]
    fn test_trade_tick_pins_l1_book() {
        let mut book = OrderBook::new(instrument_id(), BookType::L1Tbbo);
        let tick = TradeTick::new(
            instrument_id(),
            "99.49".parse().unwrap(),
            "2".parse().unwrap(),
            AggressorSide::Seller,
            TradeId::new("T-1"),
            1,
            1,
        )
        .unwrap();
        book.update_trade_tick(&tick);
        assert_eq!(book.best_bid_price().unwrap().to_string(), "99.49");
        assert_eq!(book.best_ask_price().unwrap().to_string(), "99.49");
    }

    #[test]
    fn test_apply_deltas_l2() {
        let mut book = OrderBook::new(instrument_id(), BookType::L2Mbp);
        book.apply_delta(&delta(BookAction::Add, BookSide::Bid, "100.00", "10", 1, 1));
        book.apply_delta(&delta(BookAction::Add, BookSide::Ask, "100.02", "10", 2, 2));
        book.apply_delta(&delta(BookAction::Add, BookSide::Ask, "100.03", "5", 3, 3));
        assert_eq!(book.spread().unwrap().to_string(), "0.02");
        assert_eq!(book.volume_at(BookSide::Ask, "100.03".parse().unwrap()).to_string(), "5");

        book.apply_delta(&delta(BookAction::Update, BookSide::Ask, "100.02", "4", 2, 4));
        assert_eq!(book.best_ask_size().unwrap().to_string(), "4");

        book.apply_delta(&delta(BookAction::Delete, BookSide::Ask, "100.02", "0", 2, 5));
        assert_eq!(book.best_ask_price().unwrap().to_string(), "100.03");
        assert_eq!(book.sequence(), 5);
    }

    #[test]
    fn test_snapshot_preserves_user_orders() {
        let mut book = OrderBook::new(instrument_id(), BookType::L2Mbp);
        book.apply_delta(&delta(BookAction::Add, BookSide::Bid, "100.00", "10", 1, 1));
        book.add_user_order(BookOrder::new(
            BookSide::Bid,
            "100.01".parse().unwrap(),
            "5".parse().unwrap(),
            USER_ORDER_ID_OFFSET + 1,
        ));

        let snapshot = OrderBookSnapshot::new(
            instrument_id(),
            vec![BookOrder::new(
                BookSide::Bid,
                "99.90".parse().unwrap(),
                "8".parse().unwrap(),
                7,
            )],
            vec![BookOrder::new(
                BookSide::Ask,
                "100.10".parse().unwrap(),
                "8".parse().unwrap(),
                8,
            )],
            10,
            10,
            10,
        )
        .unwrap();
        book.apply_snapshot(&snapshot);

        // User order survived and is still best bid.
        assert_eq!(book.best_bid_price().unwrap().to_string(), "100.01");
        assert_eq!(book.volume_at(BookSide::Bid, "99.90".parse().unwrap()).to_string(), "8");
        assert_eq!(book.volume_at(BookSide::Bid, "100.00".parse().unwrap()).to_string(), "0");
    }

    #[test]
    fn test_midpoint_extra_digit() {
        let mut book = OrderBook::new(instrument_id(), BookType::L1Tbbo);
        book.update_quote_tick(&quote("100.01", "100.02", "1", "1", 1));
        let mid = book.midpoint().unwrap();
        assert_eq!(mid.precision(), 3);
        assert_eq!(mid.to_string(), "100.015");
    }

    #[test]
    fn test_simulate_and_consume_fills() {
        let mut book = OrderBook::new(instrument_id(), BookType::L2Mbp);
        book.apply_delta(&delta(BookAction::Add, BookSide::Ask, "100.02", "3", 1, 1));
        book.apply_delta(&delta(BookAction::Add, BookSide::Ask, "100.03", "5", 2, 2));

        let fills = book.simulate_fills(
            OrderSide::Buy,
            "6".parse().unwrap(),
            Some("100.03".parse().unwrap()),
            true,
            usize::MAX,
        );
        assert_eq!(fills.len(), 2);

        book.consume_fills(OrderSide::Buy, &fills, true);
        assert_eq!(book.best_ask_price().unwrap().to_string(), "100.03");
        assert_eq!(book.best_ask_size().unwrap().to_string(), "2");
    }

    #[test]
    fn test_is_crossed() {
        let mut book = OrderBook::new(instrument_id(), BookType::L2Mbp);
        book.apply_delta(&delta(BookAction::Add, BookSide::Bid, "100.05", "1", 1, 1));
        book.apply_delta(&delta(BookAction::Add, BookSide::Ask, "100.02", "1", 2, 2));
        assert!(book.is_crossed());
    }
}
