//! Order matching engine for a single instrument
//!
//! Owns the instrument's book and every order routed to it, from acceptance
//! to terminal state. The match loop runs after each book update and each
//! command commit: trailing stops re-peg, stops trigger, GTD orders expire,
//! then resting orders that cross the external top of book are filled in
//! price/time priority.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use model::data::{Bar, BookOrder, BookSide, OrderBookDelta, OrderBookSnapshot, PriceType, QuoteTick, TradeTick};
use model::events::{
    OrderAccepted, OrderCanceled, OrderCancelRejected, OrderDenied, OrderEventAny, OrderExpired,
    OrderFilled, OrderModifyRejected, OrderPendingCancel, OrderPendingUpdate, OrderRejected,
    OrderSubmitted, OrderTriggered, OrderUpdated,
};
use model::ids::{AccountId, ClientOrderId, PositionId};
use model::instrument::Instrument;
use model::numeric::{Price, Quantity};
use model::account::OmsType;
use model::commands::{CancelAllOrders, CancelOrder, ModifyOrder};
use model::order::{
    ContingencyType, LiquiditySide, Order, OrderKind, OrderList, OrderSide, OrderStatus,
    TimeInForce, TrailingOffsetType, TriggerType,
};

use crate::book::{OrderBook, USER_ORDER_ID_OFFSET};
use crate::idgen::IdGenerator;
use crate::models::commission::CommissionModel;
use crate::models::fill::FillModel;

/// Venue behavior switches for one matching engine.
#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    pub oms_type: OmsType,
    /// Reject stop orders whose trigger is already marketable at submit.
    pub reject_stop_orders: bool,
    /// When false GTD orders never expire venue-side.
    pub support_gtd_orders: bool,
    pub support_contingent_orders: bool,
    pub bar_execution: bool,
    pub trade_execution: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            oms_type: OmsType::Netting,
            reject_stop_orders: false,
            support_gtd_orders: true,
            support_contingent_orders: true,
            bar_execution: true,
            trade_execution: true,
        }
    }
}

/// A resting order's position in the priority queue.
///
/// Sorted ascending by (side-aware price, acceptance time, venue sequence):
/// best price first, then earliest, then lowest venue id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RestingEntry {
    sort_price: i64,
    ts_accepted: i64,
    seq: u64,
    client_order_id: ClientOrderId,
}

/// Matching engine for one instrument.
pub struct OrderMatchingEngine {
    pub instrument: Instrument,
    pub book: OrderBook,
    config: MatchingConfig,
    account_id: AccountId,
    fill_model: FillModel,
    commission_model: Box<dyn CommissionModel>,
    orders: BTreeMap<ClientOrderId, Order>,
    /// Venue sequence per order; book entry id is OFFSET + seq.
    order_seqs: BTreeMap<ClientOrderId, u64>,
    resting_bid: Vec<RestingEntry>,
    resting_ask: Vec<RestingEntry>,
    /// Accepted stops and trailing stops awaiting their trigger.
    stops: Vec<ClientOrderId>,
    /// Triggered market-style stops waiting for liquidity.
    triggered_pending: Vec<ClientOrderId>,
    /// OTO children parked until the parent's first fill.
    pending_children: BTreeMap<ClientOrderId, Vec<ClientOrderId>>,
    last_px: Option<Price>,
    /// Venue view of the net position, maintained by the exchange.
    position_net: Decimal,
    events: Vec<OrderEventAny>,
    ts_now: i64,
}

impl OrderMatchingEngine {
    pub fn new(
        instrument: Instrument,
        book: OrderBook,
        config: MatchingConfig,
        account_id: AccountId,
        fill_model: FillModel,
        commission_model: Box<dyn CommissionModel>,
    ) -> Self {
        Self {
            instrument,
            book,
            config,
            account_id,
            fill_model,
            commission_model,
            orders: BTreeMap::new(),
            order_seqs: BTreeMap::new(),
            resting_bid: Vec::new(),
            resting_ask: Vec::new(),
            stops: Vec::new(),
            triggered_pending: Vec::new(),
            pending_children: BTreeMap::new(),
            last_px: None,
            position_net: Decimal::ZERO,
            events: Vec::new(),
            ts_now: 0,
        }
    }

    pub fn set_fill_model(&mut self, fill_model: FillModel) {
        self.fill_model = fill_model;
    }

    pub fn set_commission_model(&mut self, model: Box<dyn CommissionModel>) {
        self.commission_model = model;
    }

    /// Take everything emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<OrderEventAny> {
        std::mem::take(&mut self.events)
    }

    pub fn order(&self, client_order_id: &ClientOrderId) -> Option<&Order> {
        self.orders.get(client_order_id)
    }

    /// Orders currently working at the venue.
    pub fn open_orders(&self) -> Vec<&Order> {
        self.orders.values().filter(|o| o.is_open()).collect()
    }

    /// Every order this engine has seen (for mass status reports).
    pub fn all_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn last_price(&self) -> Option<Price> {
        self.last_px
    }

    /// Exchange callback after accounting: refresh the venue's net position
    /// view, auto-reduce open reduce-only orders, and keep contingent exit
    /// orders bound to the position sized to the remaining exposure.
    pub fn update_position(&mut self, position_id: &PositionId, net: Decimal, ids: &mut IdGenerator) {
        self.position_net = net;
        let max_abs = net.abs();

        let reduce_only: Vec<ClientOrderId> = self
            .orders
            .values()
            .filter(|o| o.is_open() && o.reduce_only)
            .map(|o| o.client_order_id.clone())
            .collect();
        for id in reduce_only {
            self.shrink_to_exposure(&id, max_abs, "reduce-only", ids);
        }

        if !self.config.support_contingent_orders {
            return;
        }
        let contingent: Vec<ClientOrderId> = self
            .orders
            .values()
            .filter(|o| o.is_open())
            .filter(|o| {
                matches!(
                    o.contingency_type,
                    ContingencyType::Oco | ContingencyType::Ouo
                )
            })
            .filter(|o| o.position_id.as_ref() == Some(position_id))
            .map(|o| o.client_order_id.clone())
            .collect();
        for id in contingent {
            self.shrink_to_exposure(&id, max_abs, "contingency", ids);
        }
    }

    /// Cap an order's working quantity at the current exposure, canceling it
    /// outright when the exposure is gone.
    fn shrink_to_exposure(
        &mut self,
        id: &ClientOrderId,
        max_abs: Decimal,
        reason: &str,
        ids: &mut IdGenerator,
    ) {
        let Some(order) = self.orders.get(id) else { return };
        let leaves = order.leaves_qty().as_decimal();
        if leaves <= max_abs {
            return;
        }
        if max_abs.is_zero() {
            self.cancel_order_venue(id, Some(reason.to_string()), ids);
        } else {
            let filled = self.orders[id].filled_qty.as_decimal();
            let new_qty = self.instrument.make_qty(filled + max_abs);
            self.update_order_venue(id, new_qty, None, None, ids);
        }
    }

    // === MARKET DATA ===

    pub fn process_quote_tick(&mut self, tick: &QuoteTick, ids: &mut IdGenerator) {
        self.ts_now = self.ts_now.max(tick.ts_event);
        self.book.update_quote_tick(tick);
        self.iterate(ids);
    }

    pub fn process_trade_tick(&mut self, tick: &TradeTick, ids: &mut IdGenerator) {
        if !self.config.trade_execution {
            return;
        }
        self.ts_now = self.ts_now.max(tick.ts_event);
        self.last_px = Some(tick.price);
        self.book.update_trade_tick(tick);
        self.iterate(ids);
    }

    pub fn process_delta(&mut self, delta: &OrderBookDelta, ids: &mut IdGenerator) {
        self.ts_now = self.ts_now.max(delta.ts_event);
        self.book.apply_delta(delta);
        self.iterate(ids);
    }

    pub fn process_deltas(&mut self, deltas: &[OrderBookDelta], ids: &mut IdGenerator) {
        if let Some(last) = deltas.last() {
            self.ts_now = self.ts_now.max(last.ts_event);
        }
        self.book.apply_deltas(deltas);
        self.iterate(ids);
    }

    pub fn process_snapshot(&mut self, snapshot: &OrderBookSnapshot, ids: &mut IdGenerator) {
        self.ts_now = self.ts_now.max(snapshot.ts_event);
        self.book.apply_snapshot(snapshot);
        self.iterate(ids);
    }

    /// Bar-driven execution: the bar is decomposed into a fixed sequence of
    /// price touches (open, then low/high by direction, then close), each
    /// run through the book as a zero-spread top-of-book update.
    pub fn process_bar(&mut self, bar: &Bar, ids: &mut IdGenerator) {
        if !self.config.bar_execution {
            return;
        }
        if bar.bar_type.spec.price_type != PriceType::Last {
            debug!(bar_type = %bar.bar_type, "skipping non-LAST bar for execution");
            return;
        }
        self.ts_now = self.ts_now.max(bar.ts_event);
        let touches = if bar.is_bullish() {
            [bar.open, bar.low, bar.high, bar.close]
        } else {
            [bar.open, bar.high, bar.low, bar.close]
        };
        let size_raw = (bar.volume.raw() / 4).max(self.instrument.size_increment.raw());
        let size = Quantity::from_raw(size_raw, self.instrument.size_precision);
        for price in touches {
            self.set_top_of_book(price, size, bar.ts_event);
            self.iterate(ids);
        }
    }

    fn set_top_of_book(&mut self, price: Price, size: Quantity, ts: i64) {
        let tick = QuoteTick::new(
            self.instrument.id.clone(),
            price,
            price,
            size,
            size,
            ts,
            ts,
        )
        .expect("bar touch timestamps are consistent");
        self.last_px = Some(price);
        self.book.update_quote_tick(&tick);
    }

    /// Advance the engine's clock without new data and run the match loop,
    /// so time alone can expire GTD orders and retry waiting stops.
    pub fn process_time(&mut self, now_ns: i64, ids: &mut IdGenerator) {
        self.ts_now = self.ts_now.max(now_ns);
        self.iterate(ids);
    }

    // === COMMANDS ===

    /// Handle an atomically submitted order list: entry orders are processed
    /// immediately, OTO children are parked until the parent's first fill.
    pub fn process_order_list(&mut self, list: OrderList, ids: &mut IdGenerator, ts: i64) {
        let mut parents = Vec::new();
        let mut children = Vec::new();
        for order in list.orders {
            if order.parent_order_id.is_some() {
                children.push(order);
            } else {
                parents.push(order);
            }
        }
        for mut child in children.drain(..) {
            let parent_id = child.parent_order_id.clone().expect("child has parent");
            // Children are submitted (in flight) but held at the venue until
            // the parent fills.
            let submitted = OrderEventAny::Submitted(OrderSubmitted {
                trader_id: child.trader_id.clone(),
                strategy_id: child.strategy_id.clone(),
                instrument_id: child.instrument_id.clone(),
                client_order_id: child.client_order_id.clone(),
                account_id: self.account_id.clone(),
                event_id: ids.event_id(),
                ts_event: ts,
                ts_init: ts,
            });
            if child.apply(submitted.clone()).is_ok() {
                self.events.push(submitted);
            }
            self.pending_children
                .entry(parent_id)
                .or_default()
                .push(child.client_order_id.clone());
            self.orders.insert(child.client_order_id.clone(), child);
        }
        for parent in parents {
            let parent_id = parent.client_order_id.clone();
            self.process_order(parent, ids, ts);
            let failed = self
                .orders
                .get(&parent_id)
                .map(|o| {
                    matches!(
                        o.status,
                        OrderStatus::Rejected | OrderStatus::Denied | OrderStatus::Canceled
                    )
                })
                .unwrap_or(true);
            if failed {
                self.reject_children_of(&parent_id, "parent order rejected", ids);
            }
        }
    }

    /// Handle a submitted order at its commit time.
    pub fn process_order(&mut self, order: Order, ids: &mut IdGenerator, ts: i64) {
        self.ts_now = self.ts_now.max(ts);
        let id = order.client_order_id.clone();

        if self.orders.contains_key(&id) {
            warn!(client_order_id = %id, "duplicate client order id");
            return;
        }

        // Refusals before the order reaches the venue book.
        if let Some(reason) = self.denial_reason(&order) {
            let mut order = order;
            let denied = OrderEventAny::Denied(OrderDenied {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_order_id: id.clone(),
                reason,
                event_id: ids.event_id(),
                ts_event: self.ts_now,
                ts_init: self.ts_now,
            });
            if order.apply(denied.clone()).is_ok() {
                self.events.push(denied);
            }
            self.orders.insert(id, order);
            return;
        }

        let mut order = order;
        let submitted = OrderEventAny::Submitted(OrderSubmitted {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            account_id: self.account_id.clone(),
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        if order.apply(submitted.clone()).is_ok() {
            self.events.push(submitted);
        }
        self.orders.insert(id.clone(), order);

        if let Some(reason) = self.rejection_reason(&id) {
            self.reject_order(&id, &reason, ids);
            return;
        }

        self.accept_order(&id, ids);
        self.dispatch_new_order(&id, ids);
    }

    /// Route a just-accepted order by kind: match immediately, rest on the
    /// book, or arm its trigger.
    fn dispatch_new_order(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        match self.orders[id].kind.clone() {
            OrderKind::Market => self.fill_market_order(id, ids),
            OrderKind::Limit { price } => {
                if self.is_limit_marketable(self.orders[id].side, price) {
                    self.execute_marketable_limit(id, ids);
                } else {
                    self.handle_unmarketable_limit(id, ids);
                }
            }
            OrderKind::MarketToLimit { .. } => self.execute_market_to_limit(id, ids),
            OrderKind::StopMarket { trigger_price, trigger_type }
            | OrderKind::StopLimit { trigger_price, trigger_type, .. } => {
                let side = self.orders[id].side;
                if self.is_stop_triggered(side, trigger_price, trigger_type) {
                    self.trigger_stop_order(id, ids);
                } else {
                    self.stops.push(id.clone());
                }
            }
            OrderKind::TrailingStopMarket { trigger_price, .. }
            | OrderKind::TrailingStopLimit { trigger_price, .. } => {
                if trigger_price.is_none() {
                    self.initialize_trailing_trigger(id, ids);
                }
                self.stops.push(id.clone());
            }
        }
    }

    /// Modify an open order's quantity, price and/or trigger price.
    pub fn process_modify(&mut self, command: &ModifyOrder, ids: &mut IdGenerator, ts: i64) {
        self.ts_now = self.ts_now.max(ts);
        let id = command.client_order_id.clone();

        let Some(order) = self.orders.get(&id) else {
            self.events.push(OrderEventAny::ModifyRejected(OrderModifyRejected {
                trader_id: command.trader_id.clone(),
                strategy_id: command.strategy_id.clone(),
                instrument_id: command.instrument_id.clone(),
                client_order_id: id,
                venue_order_id: command.venue_order_id.clone(),
                reason: "order not found".to_string(),
                event_id: ids.event_id(),
                ts_event: self.ts_now,
                ts_init: self.ts_now,
            }));
            return;
        };
        if order.is_closed() {
            // Command response only; the terminal order's FSM is untouched.
            let event = OrderEventAny::ModifyRejected(OrderModifyRejected {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_order_id: id.clone(),
                venue_order_id: order.venue_order_id.clone(),
                reason: "order already closed".to_string(),
                event_id: ids.event_id(),
                ts_event: self.ts_now,
                ts_init: self.ts_now,
            });
            self.events.push(event);
            return;
        }

        self.pending_update(&id, ids);

        let order = &self.orders[&id];
        let new_qty = command.quantity.unwrap_or(order.quantity);
        if new_qty < order.filled_qty {
            let venue_order_id = order.venue_order_id.clone();
            self.modify_rejected(&id, venue_order_id, "quantity below filled quantity", ids);
            return;
        }

        self.update_order_venue(&id, new_qty, command.price, command.trigger_price, ids);
        if self.config.support_contingent_orders {
            self.mirror_quantity_to_peers(&id, new_qty, ids);
        }
    }

    /// Cancel one order.
    pub fn process_cancel(&mut self, command: &CancelOrder, ids: &mut IdGenerator, ts: i64) {
        self.ts_now = self.ts_now.max(ts);
        let id = command.client_order_id.clone();

        let Some(order) = self.orders.get(&id) else {
            self.events.push(OrderEventAny::CancelRejected(OrderCancelRejected {
                trader_id: command.trader_id.clone(),
                strategy_id: command.strategy_id.clone(),
                instrument_id: command.instrument_id.clone(),
                client_order_id: id,
                venue_order_id: command.venue_order_id.clone(),
                reason: "order not found".to_string(),
                event_id: ids.event_id(),
                ts_event: self.ts_now,
                ts_init: self.ts_now,
            }));
            return;
        };
        if order.is_closed() {
            let event = OrderEventAny::CancelRejected(OrderCancelRejected {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_order_id: id.clone(),
                venue_order_id: order.venue_order_id.clone(),
                reason: "order already closed".to_string(),
                event_id: ids.event_id(),
                ts_event: self.ts_now,
                ts_init: self.ts_now,
            });
            self.events.push(event);
            return;
        }

        self.pending_cancel(&id, ids);
        self.cancel_order_venue(&id, None, ids);
    }

    /// Cancel every open order for the command's strategy, optionally
    /// restricted to one side.
    pub fn process_cancel_all(&mut self, command: &CancelAllOrders, ids: &mut IdGenerator, ts: i64) {
        self.ts_now = self.ts_now.max(ts);
        let targets: Vec<ClientOrderId> = self
            .orders
            .values()
            .filter(|o| o.is_open())
            .filter(|o| o.strategy_id == command.strategy_id)
            .filter(|o| command.order_side.map_or(true, |side| o.side == side))
            .map(|o| o.client_order_id.clone())
            .collect();
        for id in targets {
            self.cancel_order_venue(&id, None, ids);
        }
    }

    // === MATCH LOOP ===

    /// Run the full match loop against the current book state.
    pub fn iterate(&mut self, ids: &mut IdGenerator) {
        self.update_trailing_stops(ids);
        self.retry_triggered_stops(ids);
        self.check_stop_triggers(ids);
        self.check_expirations(ids);
        self.match_resting_orders(ids);
    }

    fn update_trailing_stops(&mut self, ids: &mut IdGenerator) {
        let stop_ids = self.stops.clone();
        for id in stop_ids {
            let Some(order) = self.orders.get(&id) else { continue };
            if !order.is_open() {
                continue;
            }
            let side = order.side;
            let (current, trigger_type, trailing_offset, offset_type) = match &order.kind {
                OrderKind::TrailingStopMarket {
                    trigger_price,
                    trigger_type,
                    trailing_offset,
                    offset_type,
                } => (*trigger_price, *trigger_type, *trailing_offset, *offset_type),
                OrderKind::TrailingStopLimit {
                    trigger_price,
                    trigger_type,
                    trailing_offset,
                    offset_type,
                    ..
                } => (*trigger_price, *trigger_type, *trailing_offset, *offset_type),
                _ => continue,
            };
            let Some(reference) = self.trigger_reference(side, trigger_type) else {
                continue;
            };
            let offset = self.offset_decimal(reference, trailing_offset, offset_type);
            let candidate = match side {
                OrderSide::Buy => self.instrument.make_price(reference.as_decimal() + offset),
                OrderSide::Sell => self.instrument.make_price(reference.as_decimal() - offset),
            };
            let improved = match (current, side) {
                (None, _) => true,
                (Some(current), OrderSide::Buy) => candidate < current,
                (Some(current), OrderSide::Sell) => candidate > current,
            };
            if improved {
                let quantity = self.orders[&id].quantity;
                self.emit_updated(&id, quantity, None, Some(candidate), ids);
            }
        }
    }

    fn retry_triggered_stops(&mut self, ids: &mut IdGenerator) {
        let pending = std::mem::take(&mut self.triggered_pending);
        for id in pending {
            let open = self.orders.get(&id).map(|o| o.is_open()).unwrap_or(false);
            if open {
                self.fill_market_order(&id, ids);
            }
        }
    }

    fn check_stop_triggers(&mut self, ids: &mut IdGenerator) {
        let stop_ids = std::mem::take(&mut self.stops);
        let mut keep = Vec::with_capacity(stop_ids.len());
        for id in stop_ids {
            let Some(order) = self.orders.get(&id) else { continue };
            if !order.is_open() {
                continue;
            }
            let side = order.side;
            let (trigger_price, trigger_type) = match (order.trigger_price(), order.trigger_type()) {
                (Some(price), Some(trigger_type)) => (price, trigger_type),
                _ => {
                    keep.push(id);
                    continue;
                }
            };
            if self.is_stop_triggered(side, trigger_price, trigger_type) {
                self.trigger_stop_order(&id, ids);
            } else {
                keep.push(id);
            }
        }
        self.stops.extend(keep);
    }

    fn check_expirations(&mut self, ids: &mut IdGenerator) {
        if !self.config.support_gtd_orders {
            return;
        }
        let expired: Vec<ClientOrderId> = self
            .orders
            .values()
            .filter(|o| o.is_open())
            .filter(|o| o.time_in_force == TimeInForce::Gtd)
            .filter(|o| o.expire_time_ns.map_or(false, |t| t <= self.ts_now))
            .map(|o| o.client_order_id.clone())
            .collect();
        for id in expired {
            self.expire_order(&id, ids);
        }
    }

    fn match_resting_orders(&mut self, ids: &mut IdGenerator) {
        for side in [OrderSide::Buy, OrderSide::Sell] {
            let entries = match side {
                OrderSide::Buy => self.resting_bid.clone(),
                OrderSide::Sell => self.resting_ask.clone(),
            };
            for entry in entries {
                let id = entry.client_order_id;
                let Some(order) = self.orders.get(&id) else { continue };
                if !order.is_open() {
                    continue;
                }
                let Some(limit) = order.price() else { continue };
                let Some((best, _)) = self.best_external_opposing(side) else {
                    continue;
                };
                let crosses = match side {
                    OrderSide::Buy => best <= limit,
                    OrderSide::Sell => best >= limit,
                };
                if !crosses {
                    continue;
                }
                // Touched exactly: queue position decides whether we fill.
                if best == limit && !self.fill_model.is_limit_filled() {
                    continue;
                }
                let leaves = order.leaves_qty();
                let fills =
                    self.book
                        .simulate_fills(side, leaves, Some(limit), true, usize::MAX);
                if fills.is_empty() {
                    continue;
                }
                self.apply_fills(&id, fills, LiquiditySide::Maker, ids);
            }
        }
    }

    // === ORDER PLACEMENT HELPERS ===

    /// Refusals checked before the order is considered submitted.
    fn denial_reason(&self, order: &Order) -> Option<String> {
        if let OrderKind::TrailingStopMarket { offset_type, .. }
        | OrderKind::TrailingStopLimit { offset_type, .. } = &order.kind
        {
            if *offset_type == TrailingOffsetType::PriceTier {
                return Some("unsupported trailing offset type PRICE_TIER".to_string());
            }
        }
        if order.contingency_type != ContingencyType::NoContingency
            && !self.config.support_contingent_orders
        {
            return Some("contingent orders not supported".to_string());
        }
        None
    }

    /// Venue-side refusals evaluated after submission.
    fn rejection_reason(&self, id: &ClientOrderId) -> Option<String> {
        let order = &self.orders[id];

        if let Some(min) = self.instrument.min_quantity {
            if order.quantity < min {
                return Some(format!("quantity {} below minimum {min}", order.quantity));
            }
        }
        if let Some(max) = self.instrument.max_quantity {
            if order.quantity > max {
                return Some(format!("quantity {} above maximum {max}", order.quantity));
            }
        }

        if order.reduce_only && !self.would_reduce(order.side, order.quantity) {
            return Some("reduce-only order would increase position".to_string());
        }

        if order.time_in_force == TimeInForce::Gtd {
            if let Some(expire) = order.expire_time_ns {
                if expire <= self.ts_now {
                    return Some("GTD expire time already passed".to_string());
                }
            }
        }

        match &order.kind {
            OrderKind::Market | OrderKind::MarketToLimit { .. } => {
                if self.best_external_opposing(order.side).is_none() {
                    return Some(format!(
                        "no market for {}",
                        self.instrument.id
                    ));
                }
            }
            OrderKind::Limit { price } => {
                if order.post_only && self.is_limit_marketable(order.side, *price) {
                    return Some(format!(
                        "POST_ONLY {} order limit px of {price} would have been a TAKER",
                        order.side
                    ));
                }
                if order.time_in_force == TimeInForce::Fok && !self.fok_fillable(order.side, order.quantity, Some(*price)) {
                    return Some("insufficient depth".to_string());
                }
            }
            OrderKind::StopMarket { trigger_price, trigger_type }
            | OrderKind::StopLimit { trigger_price, trigger_type, .. } => {
                if self.config.reject_stop_orders
                    && self.is_stop_marketable(order.side, *trigger_price, *trigger_type)
                {
                    return Some(format!(
                        "{} stop px of {trigger_price} was already marketable",
                        order.side
                    ));
                }
            }
            OrderKind::TrailingStopMarket { trigger_price, trigger_type, .. }
            | OrderKind::TrailingStopLimit { trigger_price, trigger_type, .. } => {
                if trigger_price.is_none()
                    && self.trigger_reference(order.side, *trigger_type).is_none()
                {
                    return Some("no market to initialize trailing stop".to_string());
                }
            }
        }
        None
    }

    fn accept_order(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        let (venue_order_id, seq) = ids.venue_order_id(&self.instrument.id);
        self.order_seqs.insert(id.clone(), seq);
        let order = &self.orders[id];
        let event = OrderEventAny::Accepted(OrderAccepted {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            venue_order_id,
            account_id: self.account_id.clone(),
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(id, event);
    }

    fn reject_order(&mut self, id: &ClientOrderId, reason: &str, ids: &mut IdGenerator) {
        let order = &self.orders[id];
        let event = OrderEventAny::Rejected(OrderRejected {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            account_id: self.account_id.clone(),
            reason: reason.to_string(),
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(id, event);
        self.handle_peer_terminal(id, ids);
        self.reject_children_of(id, "parent order rejected", ids);
    }

    fn handle_unmarketable_limit(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        let tif = self.orders[id].time_in_force;
        match tif {
            TimeInForce::Ioc => self.cancel_order_venue(id, Some("ioc".to_string()), ids),
            _ => self.rest_limit_order(id),
        }
    }

    /// Put a limit order on the book at (price, now), keyed for price/time
    /// priority.
    fn rest_limit_order(&mut self, id: &ClientOrderId) {
        let order = &self.orders[id];
        let Some(price) = order.price() else { return };
        let seq = self.order_seqs[id];
        let leaves = order.leaves_qty();
        let shown = order
            .display_qty
            .map(|display| display.min(leaves))
            .unwrap_or(leaves);
        let side = order.side;
        let book_side = match side {
            OrderSide::Buy => BookSide::Bid,
            OrderSide::Sell => BookSide::Ask,
        };
        self.book.add_user_order(BookOrder::new(
            book_side,
            price,
            shown,
            USER_ORDER_ID_OFFSET + seq,
        ));
        let entry = RestingEntry {
            sort_price: match side {
                OrderSide::Buy => -price.raw(),
                OrderSide::Sell => price.raw(),
            },
            ts_accepted: self.ts_now,
            seq,
            client_order_id: id.clone(),
        };
        let list = match side {
            OrderSide::Buy => &mut self.resting_bid,
            OrderSide::Sell => &mut self.resting_ask,
        };
        let position = list.partition_point(|e| e <= &entry);
        list.insert(position, entry);
    }

    fn remove_resting(&mut self, id: &ClientOrderId) {
        self.resting_bid.retain(|e| &e.client_order_id != id);
        self.resting_ask.retain(|e| &e.client_order_id != id);
        self.stops.retain(|other| other != id);
        self.triggered_pending.retain(|other| other != id);
        if let Some(order) = self.orders.get(id) {
            let seq = self.order_seqs.get(id).copied();
            if let Some(seq) = seq {
                let side = match order.side {
                    OrderSide::Buy => BookSide::Bid,
                    OrderSide::Sell => BookSide::Ask,
                };
                self.book.delete_user_order(side, USER_ORDER_ID_OFFSET + seq);
            }
        }
    }

    /// Immediate taker execution for a marketable limit (also used when a
    /// stop-limit triggers into a marketable price).
    fn execute_marketable_limit(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        let order = &self.orders[id];
        let side = order.side;
        let tif = order.time_in_force;
        let leaves = order.leaves_qty();
        let Some(limit) = order.price() else { return };

        let fills = self
            .book
            .simulate_fills(side, leaves, Some(limit), true, usize::MAX);
        if !fills.is_empty() {
            self.apply_fills(id, fills, LiquiditySide::Taker, ids);
        }

        let still_open = self.orders.get(id).map(|o| o.is_open()).unwrap_or(false);
        if still_open {
            match tif {
                TimeInForce::Ioc => self.cancel_order_venue(id, Some("ioc".to_string()), ids),
                TimeInForce::Fok => {
                    // FOK fillability was proven before acceptance.
                    warn!(client_order_id = %id, "FOK order left unfilled leaves");
                    self.cancel_order_venue(id, Some("fok".to_string()), ids);
                }
                _ => self.rest_limit_order(id),
            }
        }
    }

    /// Market execution: drain opposing external depth; any shortfall fills
    /// at the last consumed level, one tick worse when the fill model says
    /// the order slipped.
    fn fill_market_order(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        let order = &self.orders[id];
        let side = order.side;
        let leaves = order.leaves_qty();
        let mut fills = self
            .book
            .simulate_fills(side, leaves, None, true, usize::MAX);
        if fills.is_empty() {
            // Triggered into an empty book: wait for liquidity.
            self.triggered_pending.push(id.clone());
            return;
        }
        let total: u64 = fills.iter().map(|(_, q)| q.raw()).sum();
        if total < leaves.raw() {
            let (last_px, _) = *fills.last().expect("fills not empty");
            let residual_px = if self.fill_model.is_slipped() {
                let tick = self.instrument.tick_raw();
                let raw = match side {
                    OrderSide::Buy => last_px.raw() + tick,
                    OrderSide::Sell => last_px.raw() - tick,
                };
                Price::from_raw(raw, last_px.precision())
            } else {
                last_px
            };
            fills.push((
                residual_px,
                Quantity::from_raw(leaves.raw() - total, leaves.precision()),
            ));
        }
        self.apply_fills(id, fills, LiquiditySide::Taker, ids);
    }

    /// Market-to-limit: take the best level, convert the remainder into a
    /// limit at the last fill price.
    fn execute_market_to_limit(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        let order = &self.orders[id];
        let side = order.side;
        let leaves = order.leaves_qty();
        let fills = self.book.simulate_fills(side, leaves, None, true, 1);
        let Some(&(last_px, _)) = fills.last() else {
            self.triggered_pending.push(id.clone());
            return;
        };
        self.apply_fills(id, fills, LiquiditySide::Taker, ids);

        let still_open = self.orders.get(id).map(|o| o.is_open()).unwrap_or(false);
        if still_open {
            let quantity = self.orders[id].quantity;
            self.emit_updated(id, quantity, Some(last_px), None, ids);
            match self.orders[id].time_in_force {
                TimeInForce::Ioc => self.cancel_order_venue(id, Some("ioc".to_string()), ids),
                _ => self.rest_limit_order(id),
            }
        }
    }

    fn trigger_stop_order(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        self.stops.retain(|other| other != id);
        let order = &self.orders[id];
        let event = OrderEventAny::Triggered(OrderTriggered {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(id, event);

        match self.orders[id].kind.clone() {
            OrderKind::StopMarket { .. } | OrderKind::TrailingStopMarket { .. } => {
                self.fill_market_order(id, ids);
            }
            OrderKind::StopLimit { price, .. } => {
                if self.is_limit_marketable(self.orders[id].side, price) {
                    self.execute_marketable_limit(id, ids);
                } else {
                    self.rest_limit_order(id);
                }
            }
            OrderKind::TrailingStopLimit { limit_offset, offset_type, trigger_price, .. } => {
                // The limit price pegs off the trigger by the limit offset.
                let trigger = trigger_price.expect("triggered stop has a trigger price");
                let offset = self.offset_decimal(trigger, limit_offset, offset_type);
                let side = self.orders[id].side;
                let price = match side {
                    OrderSide::Buy => self.instrument.make_price(trigger.as_decimal() + offset),
                    OrderSide::Sell => self.instrument.make_price(trigger.as_decimal() - offset),
                };
                let quantity = self.orders[id].quantity;
                self.emit_updated(id, quantity, Some(price), None, ids);
                if self.is_limit_marketable(side, price) {
                    self.execute_marketable_limit(id, ids);
                } else {
                    self.rest_limit_order(id);
                }
            }
            _ => unreachable!("only stop kinds are triggered"),
        }
    }

    fn initialize_trailing_trigger(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        let order = &self.orders[id];
        let side = order.side;
        let (trigger_type, trailing_offset, offset_type) = match &order.kind {
            OrderKind::TrailingStopMarket { trigger_type, trailing_offset, offset_type, .. }
            | OrderKind::TrailingStopLimit { trigger_type, trailing_offset, offset_type, .. } => {
                (*trigger_type, *trailing_offset, *offset_type)
            }
            _ => return,
        };
        let Some(reference) = self.trigger_reference(side, trigger_type) else {
            return;
        };
        let offset = self.offset_decimal(reference, trailing_offset, offset_type);
        let trigger = match side {
            OrderSide::Buy => self.instrument.make_price(reference.as_decimal() + offset),
            OrderSide::Sell => self.instrument.make_price(reference.as_decimal() - offset),
        };
        let quantity = self.orders[id].quantity;
        self.emit_updated(id, quantity, None, Some(trigger), ids);
    }

    // === FILLS ===

    fn position_id_for(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) -> PositionId {
        match self.config.oms_type {
            OmsType::Netting => {
                let strategy_id = self.orders[id].strategy_id.clone();
                ids.netting_position_id(&self.instrument.id, &strategy_id)
            }
            OmsType::Hedging => {
                if let Some(position_id) = self.orders[id].position_id.clone() {
                    return position_id;
                }
                let position_id = ids.position_id(&self.instrument.id);
                if let Some(order) = self.orders.get_mut(id) {
                    order.position_id = Some(position_id.clone());
                }
                position_id
            }
        }
    }

    fn apply_fills(
        &mut self,
        id: &ClientOrderId,
        fills: Vec<(Price, Quantity)>,
        liquidity_side: LiquiditySide,
        ids: &mut IdGenerator,
    ) {
        for (px, qty) in fills {
            let open = self.orders.get(id).map(|o| o.is_open()).unwrap_or(false);
            if !open {
                break;
            }
            // Contingent resizes mid-loop can shrink the order under us.
            let qty = qty.min(self.orders[id].leaves_qty());
            if qty.is_zero() {
                continue;
            }
            let venue_position_id = Some(self.position_id_for(id, ids));
            let order = &self.orders[id];
            let venue_order_id = order
                .venue_order_id
                .clone()
                .expect("orders are accepted before they fill");
            let commission =
                self.commission_model
                    .commission(&self.instrument, qty, px, liquidity_side);
            let event = OrderEventAny::Filled(OrderFilled {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_order_id: id.clone(),
                venue_order_id,
                account_id: self.account_id.clone(),
                trade_id: ids.trade_id(),
                venue_position_id,
                order_side: order.side,
                last_qty: qty,
                last_px: px,
                commission,
                liquidity_side,
                event_id: ids.event_id(),
                ts_event: self.ts_now,
                ts_init: self.ts_now,
            });
            self.apply_and_emit(id, event);
            self.last_px = Some(px);

            let taker_side = self.orders[id].side;
            self.book.consume_fills(taker_side, &[(px, qty)], true);

            if liquidity_side == LiquiditySide::Maker {
                self.refresh_user_book_entry(id);
            }
            self.handle_contingencies_after_fill(id, ids);
        }

        let closed = self.orders.get(id).map(|o| o.is_closed()).unwrap_or(false);
        if closed {
            self.remove_resting(id);
        }
    }

    /// Resize or remove the user's book entry after maker fills or venue
    /// updates.
    fn refresh_user_book_entry(&mut self, id: &ClientOrderId) {
        let Some(order) = self.orders.get(id) else { return };
        let Some(seq) = self.order_seqs.get(id).copied() else { return };
        let Some(price) = order.price() else { return };
        let side = match order.side {
            OrderSide::Buy => BookSide::Bid,
            OrderSide::Sell => BookSide::Ask,
        };
        let leaves = order.leaves_qty();
        let shown = order
            .display_qty
            .map(|display| display.min(leaves))
            .unwrap_or(leaves);
        if shown.is_zero() || order.is_closed() {
            self.book.delete_user_order(side, USER_ORDER_ID_OFFSET + seq);
        } else {
            self.book.update_user_order(BookOrder::new(
                side,
                price,
                shown,
                USER_ORDER_ID_OFFSET + seq,
            ));
        }
    }

    // === CONTINGENCIES ===

    fn handle_contingencies_after_fill(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        if !self.config.support_contingent_orders {
            return;
        }
        // OTO: the first fill of the parent releases its children.
        if let Some(children) = self.pending_children.remove(id) {
            let parent_position = self.orders.get(id).and_then(|o| o.position_id.clone());
            for child_id in children {
                if let Some(mut child) = self.orders.remove(&child_id) {
                    debug!(parent = %id, child = %child_id, "activating OTO child");
                    // Children inherit the position their parent opened so
                    // the venue can keep them sized to the exposure.
                    if child.position_id.is_none() {
                        child.position_id = parent_position.clone();
                    }
                    self.activate_child(child, ids);
                }
            }
        }

        let Some(order) = self.orders.get(id) else { return };
        let contingency = order.contingency_type;
        let status = order.status;
        let leaves = order.leaves_qty();
        let linked = order.linked_order_ids.clone();

        match contingency {
            ContingencyType::Oco => {
                if status == OrderStatus::Filled {
                    for peer in linked {
                        self.cancel_peer(&peer, ids);
                    }
                } else {
                    // Partial fill reduces the peers to the remaining
                    // quantity instead of canceling them.
                    for peer in linked {
                        self.update_peer_quantity(&peer, leaves, ids);
                    }
                }
            }
            ContingencyType::Ouo => {
                for peer in linked {
                    self.update_peer_quantity(&peer, leaves, ids);
                }
            }
            _ => {}
        }
    }

    /// An OTO child re-enters the engine as a fresh venue order. Its
    /// Submitted event was already emitted at list submission.
    fn activate_child(&mut self, mut child: Order, ids: &mut IdGenerator) {
        let id = child.client_order_id.clone();
        if child.status == OrderStatus::Initialized {
            let submitted = OrderEventAny::Submitted(OrderSubmitted {
                trader_id: child.trader_id.clone(),
                strategy_id: child.strategy_id.clone(),
                instrument_id: child.instrument_id.clone(),
                client_order_id: id.clone(),
                account_id: self.account_id.clone(),
                event_id: ids.event_id(),
                ts_event: self.ts_now,
                ts_init: self.ts_now,
            });
            if child.apply(submitted.clone()).is_ok() {
                self.events.push(submitted);
            }
        }
        self.orders.insert(id.clone(), child);

        if let Some(reason) = self.rejection_reason(&id) {
            self.reject_order(&id, &reason, ids);
            return;
        }
        self.accept_order(&id, ids);
        self.dispatch_new_order(&id, ids);
    }

    fn cancel_peer(&mut self, peer: &ClientOrderId, ids: &mut IdGenerator) {
        let open = self.orders.get(peer).map(|o| o.is_open()).unwrap_or(false);
        if open {
            self.cancel_order_venue(peer, Some("contingency".to_string()), ids);
        } else if self.pending_children.values().any(|c| c.contains(peer)) {
            // Parked child never reached the venue; cancel it in place.
            self.cancel_parked_child(peer, ids);
        }
    }

    fn update_peer_quantity(&mut self, peer: &ClientOrderId, quantity: Quantity, ids: &mut IdGenerator) {
        let Some(order) = self.orders.get(peer) else { return };
        if order.quantity == quantity || quantity.is_zero() || quantity < order.filled_qty {
            return;
        }
        if order.is_open() {
            self.update_order_venue(peer, quantity, None, None, ids);
        } else if matches!(
            order.status,
            OrderStatus::Submitted | OrderStatus::Initialized
        ) {
            // Parked OTO child: it has not reached the venue book yet, so
            // adjust the definition in place without a lifecycle event.
            debug!(peer = %peer, %quantity, "resizing parked contingent order");
            if let Some(order) = self.orders.get_mut(peer) {
                if quantity >= order.filled_qty {
                    order.quantity = quantity;
                }
            }
        }
    }

    fn mirror_quantity_to_peers(&mut self, id: &ClientOrderId, quantity: Quantity, ids: &mut IdGenerator) {
        let Some(order) = self.orders.get(id) else { return };
        if !matches!(
            order.contingency_type,
            ContingencyType::Oco | ContingencyType::Ouo
        ) {
            return;
        }
        for peer in order.linked_order_ids.clone() {
            self.update_peer_quantity(&peer, quantity, ids);
        }
    }

    fn handle_peer_terminal(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        if !self.config.support_contingent_orders {
            return;
        }
        let Some(order) = self.orders.get(id) else { return };
        if order.contingency_type != ContingencyType::Oco {
            return;
        }
        for peer in order.linked_order_ids.clone() {
            self.cancel_peer(&peer, ids);
        }
    }

    fn reject_children_of(&mut self, parent: &ClientOrderId, reason: &str, ids: &mut IdGenerator) {
        let Some(children) = self.pending_children.remove(parent) else {
            return;
        };
        for child_id in children {
            let Some(order) = self.orders.get(&child_id) else { continue };
            let event = OrderEventAny::Rejected(OrderRejected {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_order_id: child_id.clone(),
                account_id: self.account_id.clone(),
                reason: reason.to_string(),
                event_id: ids.event_id(),
                ts_event: self.ts_now,
                ts_init: self.ts_now,
            });
            self.apply_and_emit(&child_id, event);
        }
    }

    fn cancel_parked_child(&mut self, child_id: &ClientOrderId, ids: &mut IdGenerator) {
        for children in self.pending_children.values_mut() {
            children.retain(|c| c != child_id);
        }
        let Some(order) = self.orders.get(child_id) else { return };
        let event = OrderEventAny::Canceled(OrderCanceled {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: child_id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            reason: Some("contingency".to_string()),
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(child_id, event);
    }

    // === VENUE-SIDE STATE CHANGES ===

    fn pending_update(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        let order = &self.orders[id];
        let event = OrderEventAny::PendingUpdate(OrderPendingUpdate {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            account_id: self.account_id.clone(),
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(id, event);
    }

    fn pending_cancel(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        let order = &self.orders[id];
        let event = OrderEventAny::PendingCancel(OrderPendingCancel {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            account_id: self.account_id.clone(),
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(id, event);
    }

    fn modify_rejected(
        &mut self,
        id: &ClientOrderId,
        venue_order_id: Option<model::ids::VenueOrderId>,
        reason: &str,
        ids: &mut IdGenerator,
    ) {
        let order = &self.orders[id];
        let event = OrderEventAny::ModifyRejected(OrderModifyRejected {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            venue_order_id,
            reason: reason.to_string(),
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(id, event);
    }

    fn emit_updated(
        &mut self,
        id: &ClientOrderId,
        quantity: Quantity,
        price: Option<Price>,
        trigger_price: Option<Price>,
        ids: &mut IdGenerator,
    ) {
        let order = &self.orders[id];
        let event = OrderEventAny::Updated(OrderUpdated {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            quantity,
            price,
            trigger_price,
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(id, event);
    }

    /// Commit a venue-side update: FSM event plus book/queue maintenance.
    fn update_order_venue(
        &mut self,
        id: &ClientOrderId,
        quantity: Quantity,
        price: Option<Price>,
        trigger_price: Option<Price>,
        ids: &mut IdGenerator,
    ) {
        let old_price = self.orders.get(id).and_then(|o| o.price());
        self.emit_updated(id, quantity, price, trigger_price, ids);

        let price_changed = match (old_price, price) {
            (Some(old), Some(new)) => old != new,
            _ => false,
        };
        if price_changed {
            // Re-key: remove and re-add at the new price; time priority lost.
            let was_resting = self.is_resting(id);
            self.remove_from_resting_lists_and_book(id);
            if was_resting {
                // A repriced order may have become marketable.
                let side = self.orders[id].side;
                let new_price = price.expect("price changed");
                if self.is_limit_marketable(side, new_price) {
                    self.execute_marketable_limit(id, ids);
                } else {
                    self.rest_limit_order(id);
                }
            }
        } else {
            self.refresh_user_book_entry(id);
        }
    }

    fn is_resting(&self, id: &ClientOrderId) -> bool {
        self.resting_bid.iter().any(|e| &e.client_order_id == id)
            || self.resting_ask.iter().any(|e| &e.client_order_id == id)
    }

    fn remove_from_resting_lists_and_book(&mut self, id: &ClientOrderId) {
        self.resting_bid.retain(|e| &e.client_order_id != id);
        self.resting_ask.retain(|e| &e.client_order_id != id);
        if let (Some(order), Some(seq)) = (self.orders.get(id), self.order_seqs.get(id).copied()) {
            let side = match order.side {
                OrderSide::Buy => BookSide::Bid,
                OrderSide::Sell => BookSide::Ask,
            };
            self.book.delete_user_order(side, USER_ORDER_ID_OFFSET + seq);
        }
    }

    fn cancel_order_venue(
        &mut self,
        id: &ClientOrderId,
        reason: Option<String>,
        ids: &mut IdGenerator,
    ) {
        let open = self
            .orders
            .get(id)
            .map(|o| !o.is_closed())
            .unwrap_or(false);
        if !open {
            return;
        }
        let order = &self.orders[id];
        let event = OrderEventAny::Canceled(OrderCanceled {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            reason,
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(id, event);
        self.remove_resting(id);
        self.handle_peer_terminal(id, ids);
        // Canceling an un-filled OTO parent takes its children with it.
        let had_children = self.pending_children.contains_key(id);
        if had_children {
            let children = self.pending_children.remove(id).unwrap_or_default();
            for child in children {
                self.cancel_parked_child(&child, ids);
            }
        }
    }

    fn expire_order(&mut self, id: &ClientOrderId, ids: &mut IdGenerator) {
        let order = &self.orders[id];
        let event = OrderEventAny::Expired(OrderExpired {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            event_id: ids.event_id(),
            ts_event: self.ts_now,
            ts_init: self.ts_now,
        });
        self.apply_and_emit(id, event);
        self.remove_resting(id);
        self.handle_peer_terminal(id, ids);
    }

    fn apply_and_emit(&mut self, id: &ClientOrderId, event: OrderEventAny) {
        let Some(order) = self.orders.get_mut(id) else {
            return;
        };
        match order.apply(event.clone()) {
            Ok(()) => self.events.push(event),
            Err(error) => warn!(
                client_order_id = %id,
                %error,
                "refused illegal order state transition"
            ),
        }
    }

    // === PRICING ===

    fn best_external_opposing(&self, side: OrderSide) -> Option<(Price, Quantity)> {
        match side {
            OrderSide::Buy => self.book.best_external_ask(),
            OrderSide::Sell => self.book.best_external_bid(),
        }
    }

    fn is_limit_marketable(&self, side: OrderSide, limit: Price) -> bool {
        match self.best_external_opposing(side) {
            Some((best, _)) => match side {
                OrderSide::Buy => limit >= best,
                OrderSide::Sell => limit <= best,
            },
            None => false,
        }
    }

    fn fok_fillable(&self, side: OrderSide, quantity: Quantity, limit: Option<Price>) -> bool {
        let fills = self
            .book
            .simulate_fills(side, quantity, limit, true, usize::MAX);
        let total: u64 = fills.iter().map(|(_, q)| q.raw()).sum();
        total >= quantity.raw()
    }

    fn trigger_reference(&self, side: OrderSide, trigger_type: TriggerType) -> Option<Price> {
        match trigger_type {
            TriggerType::Default | TriggerType::BidAsk => match side {
                OrderSide::Buy => self.book.best_external_ask().map(|(p, _)| p),
                OrderSide::Sell => self.book.best_external_bid().map(|(p, _)| p),
            },
            TriggerType::LastPrice | TriggerType::MarkPrice | TriggerType::IndexPrice => {
                self.last_px
            }
            TriggerType::Bid => self.book.best_external_bid().map(|(p, _)| p),
            TriggerType::Ask => self.book.best_external_ask().map(|(p, _)| p),
            TriggerType::Mid => self.book.midpoint(),
        }
    }

    /// Inclusive, draw-free trigger comparison (submission-time checks).
    fn is_stop_marketable(&self, side: OrderSide, trigger: Price, trigger_type: TriggerType) -> bool {
        match self.trigger_reference(side, trigger_type) {
            Some(reference) => match side {
                OrderSide::Buy => reference >= trigger,
                OrderSide::Sell => reference <= trigger,
            },
            None => false,
        }
    }

    fn is_stop_triggered(&mut self, side: OrderSide, trigger: Price, trigger_type: TriggerType) -> bool {
        let Some(reference) = self.trigger_reference(side, trigger_type) else {
            return false;
        };
        let beyond = match side {
            OrderSide::Buy => reference > trigger,
            OrderSide::Sell => reference < trigger,
        };
        if beyond {
            return true;
        }
        if reference == trigger {
            // Touched exactly: the fill model decides.
            return self.fill_model.is_stop_filled();
        }
        false
    }

    fn offset_decimal(
        &self,
        reference: Price,
        offset: Decimal,
        offset_type: TrailingOffsetType,
    ) -> Decimal {
        match offset_type {
            TrailingOffsetType::Price => offset,
            TrailingOffsetType::BasisPoints => {
                reference.as_decimal() * offset / Decimal::from(10_000)
            }
            TrailingOffsetType::Ticks => offset * self.instrument.price_increment.as_decimal(),
            TrailingOffsetType::PriceTier => {
                unreachable!("PRICE_TIER offsets are denied at submission")
            }
        }
    }

    fn would_reduce(&self, side: OrderSide, quantity: Quantity) -> bool {
        let qty = quantity.as_decimal();
        if self.position_net > Decimal::ZERO {
            side == OrderSide::Sell && qty <= self.position_net
        } else if self.position_net < Decimal::ZERO {
            side == OrderSide::Buy && qty <= -self.position_net
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::commission::MakerTakerCommission;
    use model::ids::{StrategyId, TraderId, Venue};
    use model::instrument::spot_instrument;
    use model::order::OrderDef;
    use uuid::Uuid;

    fn instrument() -> Instrument {
        spot_instrument("ETHUSDT.SIM".into(), 2, 0)
    }

    fn engine() -> OrderMatchingEngine {
        let instrument = instrument();
        let book = OrderBook::new(instrument.id.clone(), model::data::BookType::L1Tbbo);
        OrderMatchingEngine::new(
            instrument,
            book,
            MatchingConfig::default(),
            AccountId::new("SIM-001"),
            FillModel::ideal(42),
            Box::new(MakerTakerCommission),
        )
    }

    fn ids() -> IdGenerator {
        IdGenerator::new(Venue::new("SIM"), 42)
    }

    fn quote(bid: &str, ask: &str, size: &str, ts: i64) -> QuoteTick {
        QuoteTick::new(
            "ETHUSDT.SIM".into(),
            bid.parse().unwrap(),
            ask.parse().unwrap(),
            size.parse().unwrap(),
            size.parse().unwrap(),
            ts,
            ts,
        )
        .unwrap()
    }

    fn limit(id: &str, side: OrderSide, qty: &str, price: &str, tif: TimeInForce) -> Order {
        Order::new(OrderDef {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("S-001"),
            instrument_id: "ETHUSDT.SIM".into(),
            client_order_id: ClientOrderId::new(id),
            side,
            kind: OrderKind::Limit {
                price: price.parse().unwrap(),
            },
            quantity: qty.parse().unwrap(),
            time_in_force: tif,
            expire_time_ns: None,
            post_only: false,
            reduce_only: false,
            display_qty: None,
            contingency_type: ContingencyType::NoContingency,
            order_list_id: None,
            parent_order_id: None,
            linked_order_ids: Vec::new(),
            init_id: Uuid::nil(),
            ts_init: 0,
        })
        .unwrap()
    }

    fn statuses(events: &[OrderEventAny]) -> Vec<&'static str> {
        events.iter().map(|e| e.kind_name()).collect()
    }

    #[test]
    fn test_limit_inside_spread_rests() {
        let mut engine = engine();
        let mut idgen = ids();
        engine.process_quote_tick(&quote("100.00", "100.02", "10", 1), &mut idgen);

        engine.process_order(
            limit("O-1", OrderSide::Buy, "5", "100.01", TimeInForce::Gtc),
            &mut idgen,
            1,
        );

        let events = engine.drain_events();
        assert_eq!(
            statuses(&events),
            vec!["ORDER_SUBMITTED", "ORDER_ACCEPTED"]
        );
        // Resting order is now the best bid.
        assert_eq!(
            engine.book.best_bid_price().unwrap().to_string(),
            "100.01"
        );
        assert_eq!(engine.open_orders().len(), 1);
    }

    #[test]
    fn test_marketable_limit_fills_as_taker() {
        let mut engine = engine();
        let mut idgen = ids();
        engine.process_quote_tick(&quote("100.00", "100.02", "10", 1), &mut idgen);

        engine.process_order(
            limit("O-1", OrderSide::Buy, "5", "100.02", TimeInForce::Gtc),
            &mut idgen,
            1,
        );
        let events = engine.drain_events();
        assert_eq!(
            statuses(&events),
            vec!["ORDER_SUBMITTED", "ORDER_ACCEPTED", "ORDER_FILLED"]
        );
        let order = engine.order(&ClientOrderId::new("O-1")).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.liquidity_side, LiquiditySide::Taker);
    }

    #[test]
    fn test_post_only_crossing_rejected() {
        let mut engine = engine();
        let mut idgen = ids();
        engine.process_quote_tick(&quote("100.00", "100.02", "10", 1), &mut idgen);

        let mut order = limit("O-1", OrderSide::Buy, "5", "100.02", TimeInForce::Gtc);
        order.post_only = true;
        engine.process_order(order, &mut idgen, 1);

        let events = engine.drain_events();
        assert_eq!(statuses(&events), vec!["ORDER_SUBMITTED", "ORDER_REJECTED"]);
    }

    #[test]
    fn test_resting_order_fills_when_book_crosses() {
        let mut engine = engine();
        let mut idgen = ids();
        engine.process_quote_tick(&quote("100.00", "100.02", "10", 1), &mut idgen);
        engine.process_order(
            limit("O-1", OrderSide::Buy, "5", "100.01", TimeInForce::Gtc),
            &mut idgen,
            1,
        );
        engine.drain_events();

        // Ask drops through the resting bid.
        engine.process_quote_tick(&quote("99.98", "100.00", "10", 2), &mut idgen);
        let events = engine.drain_events();
        assert_eq!(statuses(&events), vec!["ORDER_FILLED"]);
        let order = engine.order(&ClientOrderId::new("O-1")).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.liquidity_side, LiquiditySide::Maker);
        // Maker fill at the opposing top price.
        assert_eq!(order.avg_px.unwrap(), Decimal::from(100));
    }

    #[test]
    fn test_market_order_rejected_on_empty_book() {
        let mut engine = engine();
        let mut idgen = ids();
        let mut order = limit("O-1", OrderSide::Buy, "5", "100.00", TimeInForce::Gtc);
        order.kind = OrderKind::Market;
        engine.process_order(order, &mut idgen, 1);

        let events = engine.drain_events();
        assert_eq!(statuses(&events), vec!["ORDER_SUBMITTED", "ORDER_REJECTED"]);
    }

    #[test]
    fn test_stop_market_triggers_on_trade() {
        let mut engine = engine();
        let mut idgen = ids();
        engine.process_quote_tick(&quote("99.99", "100.01", "10", 1), &mut idgen);

        let mut order = limit("O-1", OrderSide::Sell, "2", "99.50", TimeInForce::Gtc);
        order.kind = OrderKind::StopMarket {
            trigger_price: "99.50".parse().unwrap(),
            trigger_type: TriggerType::LastPrice,
        };
        engine.process_order(order, &mut idgen, 1);
        engine.drain_events();

        let tick = TradeTick::new(
            "ETHUSDT.SIM".into(),
            "99.49".parse().unwrap(),
            "5".parse().unwrap(),
            model::data::AggressorSide::Seller,
            model::ids::TradeId::new("X-1"),
            2,
            2,
        )
        .unwrap();
        engine.process_trade_tick(&tick, &mut idgen);

        let events = engine.drain_events();
        assert_eq!(statuses(&events), vec!["ORDER_TRIGGERED", "ORDER_FILLED"]);
    }

    #[test]
    fn test_gtd_expires() {
        let mut engine = engine();
        let mut idgen = ids();
        engine.process_quote_tick(&quote("100.00", "100.02", "10", 1), &mut idgen);

        let mut order = limit("O-1", OrderSide::Buy, "1", "50.00", TimeInForce::Gtc);
        order.time_in_force = TimeInForce::Gtd;
        order.expire_time_ns = Some(10_000_000_000);
        engine.process_order(order, &mut idgen, 1);
        engine.drain_events();

        engine.process_quote_tick(&quote("100.00", "100.02", "10", 10_000_000_001), &mut idgen);
        let events = engine.drain_events();
        assert_eq!(statuses(&events), vec!["ORDER_EXPIRED"]);
    }

    #[test]
    fn test_cancel_and_cancel_reject_on_closed() {
        let mut engine = engine();
        let mut idgen = ids();
        engine.process_quote_tick(&quote("100.00", "100.02", "10", 1), &mut idgen);
        engine.process_order(
            limit("O-1", OrderSide::Buy, "5", "100.01", TimeInForce::Gtc),
            &mut idgen,
            1,
        );
        engine.drain_events();

        let cancel = CancelOrder {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("S-001"),
            instrument_id: "ETHUSDT.SIM".into(),
            client_id: None,
            client_order_id: ClientOrderId::new("O-1"),
            venue_order_id: None,
            command_id: Uuid::new_v4(),
            ts_init: 2,
        };
        engine.process_cancel(&cancel, &mut idgen, 2);
        let events = engine.drain_events();
        assert_eq!(
            statuses(&events),
            vec!["ORDER_PENDING_CANCEL", "ORDER_CANCELED"]
        );
        assert!(engine.book.best_bid_price().unwrap().to_string() == "100.00");

        // Second cancel bounces off the terminal order.
        engine.process_cancel(&cancel, &mut idgen, 3);
        let events = engine.drain_events();
        assert_eq!(statuses(&events), vec!["ORDER_CANCEL_REJECTED"]);
    }

    #[test]
    fn test_modify_quantity_keeps_priority() {
        let mut engine = engine();
        let mut idgen = ids();
        engine.process_quote_tick(&quote("100.00", "100.02", "10", 1), &mut idgen);
        engine.process_order(
            limit("O-1", OrderSide::Buy, "5", "100.01", TimeInForce::Gtc),
            &mut idgen,
            1,
        );
        engine.drain_events();

        let modify = ModifyOrder {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("S-001"),
            instrument_id: "ETHUSDT.SIM".into(),
            client_id: None,
            client_order_id: ClientOrderId::new("O-1"),
            venue_order_id: None,
            quantity: Some("3".parse().unwrap()),
            price: None,
            trigger_price: None,
            command_id: Uuid::new_v4(),
            ts_init: 2,
        };
        engine.process_modify(&modify, &mut idgen, 2);
        let events = engine.drain_events();
        assert_eq!(
            statuses(&events),
            vec!["ORDER_PENDING_UPDATE", "ORDER_UPDATED"]
        );
        let order = engine.order(&ClientOrderId::new("O-1")).unwrap();
        assert_eq!(order.quantity.to_string(), "3");
        assert_eq!(
            engine
                .book
                .volume_at(BookSide::Bid, "100.01".parse().unwrap())
                .to_string(),
            "3"
        );
    }
}
