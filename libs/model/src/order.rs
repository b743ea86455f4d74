//! Orders and the order state machine
//!
//! An order is a shared header plus a tagged [`OrderKind`] carrying the
//! per-type parameters. Its status evolves only through
//! [`Order::apply`], which checks every transition against a fixed legal
//! table; anything outside the table is an [`InvalidStateTrigger`] and
//! leaves the order untouched.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{InvalidStateTrigger, ValidationError};
use crate::events::{OrderEventAny, OrderInitialized};
use crate::ids::{
    AccountId, ClientOrderId, InstrumentId, OrderListId, PositionId, StrategyId, TradeId,
    TraderId, VenueOrderId,
};
use crate::numeric::{Price, Quantity};

/// Buyer or seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// How long an order stays working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    Gtd,
    Day,
    AtTheOpen,
    AtTheClose,
}

/// Which reference price arms a stop trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    /// Venue default: BID_ASK.
    Default,
    LastPrice,
    BidAsk,
    Bid,
    Ask,
    Mid,
    /// Resolved to the last traded price in this simulation.
    MarkPrice,
    /// Resolved to the last traded price in this simulation.
    IndexPrice,
}

/// Units of a trailing offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrailingOffsetType {
    Price,
    BasisPoints,
    Ticks,
    PriceTier,
}

/// Linkage between orders of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContingencyType {
    #[serde(rename = "NONE")]
    NoContingency,
    Oto,
    Oco,
    Ouo,
}

/// Which side of a fill provided liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquiditySide {
    #[serde(rename = "NONE")]
    NoLiquiditySide,
    Maker,
    Taker,
}

/// The order type discriminant (for reports and wire records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    MarketToLimit,
    TrailingStopMarket,
    TrailingStopLimit,
}

/// Per-type order parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "order_type")]
pub enum OrderKind {
    #[serde(rename = "MARKET")]
    Market,
    #[serde(rename = "LIMIT")]
    Limit { price: Price },
    #[serde(rename = "STOP_MARKET")]
    StopMarket {
        trigger_price: Price,
        trigger_type: TriggerType,
    },
    #[serde(rename = "STOP_LIMIT")]
    StopLimit {
        price: Price,
        trigger_price: Price,
        trigger_type: TriggerType,
    },
    #[serde(rename = "MARKET_TO_LIMIT")]
    MarketToLimit {
        /// Assigned from the last fill price once the marketable part fills.
        price: Option<Price>,
    },
    #[serde(rename = "TRAILING_STOP_MARKET")]
    TrailingStopMarket {
        /// Recomputed as the market moves; absent until first observation.
        trigger_price: Option<Price>,
        trigger_type: TriggerType,
        trailing_offset: Decimal,
        offset_type: TrailingOffsetType,
    },
    #[serde(rename = "TRAILING_STOP_LIMIT")]
    TrailingStopLimit {
        price: Option<Price>,
        limit_offset: Decimal,
        trigger_price: Option<Price>,
        trigger_type: TriggerType,
        trailing_offset: Decimal,
        offset_type: TrailingOffsetType,
    },
}

impl OrderKind {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::Market => OrderType::Market,
            OrderKind::Limit { .. } => OrderType::Limit,
            OrderKind::StopMarket { .. } => OrderType::StopMarket,
            OrderKind::StopLimit { .. } => OrderType::StopLimit,
            OrderKind::MarketToLimit { .. } => OrderType::MarketToLimit,
            OrderKind::TrailingStopMarket { .. } => OrderType::TrailingStopMarket,
            OrderKind::TrailingStopLimit { .. } => OrderType::TrailingStopLimit,
        }
    }
}

/// Order status lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Initialized,
    Denied,
    Submitted,
    Accepted,
    Rejected,
    Canceled,
    Expired,
    Triggered,
    PendingUpdate,
    PendingCancel,
    PartiallyFilled,
    Filled,
}

impl OrderStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Denied
                | OrderStatus::Rejected
                | OrderStatus::Canceled
                | OrderStatus::Expired
                | OrderStatus::Filled
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Initialized => "INITIALIZED",
            OrderStatus::Denied => "DENIED",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Triggered => "TRIGGERED",
            OrderStatus::PendingUpdate => "PENDING_UPDATE",
            OrderStatus::PendingCancel => "PENDING_CANCEL",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
        };
        write!(f, "{name}")
    }
}

/// Resolved target of a legal transition.
enum Target {
    Status(OrderStatus),
    /// Restore `previous_status` (pending-state reject/commit paths).
    Previous,
}

/// The legal-transition table: `(current, trigger) -> target`.
///
/// Triggers are event kinds; anything not listed here is illegal.
fn transition(current: OrderStatus, event: &OrderEventAny) -> Result<Target, InvalidStateTrigger> {
    use OrderEventAny as E;
    use OrderStatus as S;

    let target = match (current, event) {
        (S::Initialized, E::Denied(_)) => Target::Status(S::Denied),
        (S::Initialized, E::Submitted(_)) => Target::Status(S::Submitted),
        (S::Initialized, E::Accepted(_)) => Target::Status(S::Accepted),
        (S::Initialized, E::Rejected(_)) => Target::Status(S::Rejected),
        (S::Initialized, E::Canceled(_)) => Target::Status(S::Canceled),

        (S::Submitted, E::Accepted(_)) => Target::Status(S::Accepted),
        (S::Submitted, E::Rejected(_)) => Target::Status(S::Rejected),
        (S::Submitted, E::Canceled(_)) => Target::Status(S::Canceled),
        (S::Submitted, E::Filled(_)) => Target::Status(S::Filled),

        (S::Accepted, E::Rejected(_)) => Target::Status(S::Rejected),
        (S::Accepted, E::PendingUpdate(_)) => Target::Status(S::PendingUpdate),
        (S::Accepted, E::PendingCancel(_)) => Target::Status(S::PendingCancel),
        (S::Accepted, E::Updated(_)) => Target::Status(S::Accepted),
        (S::Accepted, E::Canceled(_)) => Target::Status(S::Canceled),
        (S::Accepted, E::Triggered(_)) => Target::Status(S::Triggered),
        (S::Accepted, E::Expired(_)) => Target::Status(S::Expired),
        (S::Accepted, E::Filled(_)) => Target::Status(S::Filled),

        (S::PendingUpdate, E::ModifyRejected(_)) => Target::Previous,
        (S::PendingUpdate, E::Updated(_)) => Target::Previous,
        (S::PendingUpdate, E::PendingUpdate(_)) => Target::Status(S::PendingUpdate),
        (S::PendingUpdate, E::PendingCancel(_)) => Target::Status(S::PendingCancel),
        (S::PendingUpdate, E::Canceled(_)) => Target::Status(S::Canceled),
        (S::PendingUpdate, E::Expired(_)) => Target::Status(S::Expired),
        (S::PendingUpdate, E::Triggered(_)) => Target::Status(S::Triggered),
        (S::PendingUpdate, E::Filled(_)) => Target::Status(S::Filled),

        (S::PendingCancel, E::CancelRejected(_)) => Target::Previous,
        (S::PendingCancel, E::PendingCancel(_)) => Target::Status(S::PendingCancel),
        (S::PendingCancel, E::Canceled(_)) => Target::Status(S::Canceled),
        (S::PendingCancel, E::Expired(_)) => Target::Status(S::Expired),
        (S::PendingCancel, E::Filled(_)) => Target::Status(S::Filled),

        (S::Triggered, E::Rejected(_)) => Target::Status(S::Rejected),
        (S::Triggered, E::PendingUpdate(_)) => Target::Status(S::PendingUpdate),
        (S::Triggered, E::PendingCancel(_)) => Target::Status(S::PendingCancel),
        (S::Triggered, E::Updated(_)) => Target::Status(S::Triggered),
        (S::Triggered, E::Canceled(_)) => Target::Status(S::Canceled),
        (S::Triggered, E::Expired(_)) => Target::Status(S::Expired),
        (S::Triggered, E::Filled(_)) => Target::Status(S::Filled),

        (S::PartiallyFilled, E::Rejected(_)) => Target::Status(S::Rejected),
        (S::PartiallyFilled, E::PendingUpdate(_)) => Target::Status(S::PendingUpdate),
        (S::PartiallyFilled, E::PendingCancel(_)) => Target::Status(S::PendingCancel),
        (S::PartiallyFilled, E::Updated(_)) => Target::Status(S::PartiallyFilled),
        (S::PartiallyFilled, E::Canceled(_)) => Target::Status(S::Canceled),
        (S::PartiallyFilled, E::Expired(_)) => Target::Status(S::Expired),
        (S::PartiallyFilled, E::Filled(_)) => Target::Status(S::Filled),

        (current, event) => {
            return Err(InvalidStateTrigger {
                current: format!("{current}"),
                trigger: event.kind_name().to_string(),
            })
        }
    };
    Ok(target)
}

/// Definition used to build a new order.
///
/// Optionals default sensibly so call sites only set what they need.
#[derive(Debug, Clone)]
pub struct OrderDef {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Quantity,
    pub time_in_force: TimeInForce,
    pub expire_time_ns: Option<i64>,
    pub post_only: bool,
    pub reduce_only: bool,
    pub display_qty: Option<Quantity>,
    pub contingency_type: ContingencyType,
    pub order_list_id: Option<OrderListId>,
    pub parent_order_id: Option<ClientOrderId>,
    pub linked_order_ids: Vec<ClientOrderId>,
    pub init_id: uuid::Uuid,
    pub ts_init: i64,
}

/// An order through its whole life.
///
/// Owned by exactly one matching engine from submission until terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub account_id: Option<AccountId>,
    pub position_id: Option<PositionId>,
    pub order_list_id: Option<OrderListId>,
    pub parent_order_id: Option<ClientOrderId>,
    pub linked_order_ids: Vec<ClientOrderId>,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Quantity,
    pub filled_qty: Quantity,
    pub time_in_force: TimeInForce,
    pub expire_time_ns: Option<i64>,
    pub post_only: bool,
    pub reduce_only: bool,
    pub display_qty: Option<Quantity>,
    pub contingency_type: ContingencyType,
    pub status: OrderStatus,
    pub previous_status: Option<OrderStatus>,
    pub events: Vec<OrderEventAny>,
    pub trade_ids: Vec<TradeId>,
    pub avg_px: Option<Decimal>,
    pub slippage: Decimal,
    pub liquidity_side: LiquiditySide,
    pub ts_init: i64,
    pub ts_last: i64,
}

impl Order {
    /// Validate a definition and build the order, recording the
    /// `OrderInitialized` event as its first lifecycle entry.
    pub fn new(def: OrderDef) -> Result<Self, ValidationError> {
        if def.quantity.is_zero() {
            return Err(ValidationError::QuantityNotPositive);
        }
        if let Some(display) = def.display_qty {
            if display > def.quantity {
                return Err(ValidationError::DisplayQtyExceedsQuantity {
                    display: display.to_string(),
                    quantity: def.quantity.to_string(),
                });
            }
        }
        match (def.time_in_force, def.expire_time_ns) {
            (TimeInForce::Gtd, None) => return Err(ValidationError::GtdWithoutExpireTime),
            (TimeInForce::Gtd, Some(_)) => {}
            (_, Some(_)) => {
                return Err(ValidationError::Invalid {
                    field: "expire_time_ns",
                    reason: "only valid for GTD orders".to_string(),
                })
            }
            _ => {}
        }
        if def.post_only && !kind_has_limit(&def.kind) {
            return Err(ValidationError::Invalid {
                field: "post_only",
                reason: "only valid for orders with a limit price".to_string(),
            });
        }
        if let OrderKind::TrailingStopMarket { trailing_offset, .. }
        | OrderKind::TrailingStopLimit { trailing_offset, .. } = &def.kind
        {
            if *trailing_offset <= Decimal::ZERO {
                return Err(ValidationError::Invalid {
                    field: "trailing_offset",
                    reason: "must be positive".to_string(),
                });
            }
        }

        let size_precision = def.quantity.precision();
        let init = OrderInitialized {
            trader_id: def.trader_id.clone(),
            strategy_id: def.strategy_id.clone(),
            instrument_id: def.instrument_id.clone(),
            client_order_id: def.client_order_id.clone(),
            side: def.side,
            kind: def.kind.clone(),
            quantity: def.quantity,
            time_in_force: def.time_in_force,
            expire_time_ns: def.expire_time_ns,
            post_only: def.post_only,
            reduce_only: def.reduce_only,
            display_qty: def.display_qty,
            contingency_type: def.contingency_type,
            order_list_id: def.order_list_id.clone(),
            parent_order_id: def.parent_order_id.clone(),
            linked_order_ids: def.linked_order_ids.clone(),
            event_id: def.init_id,
            ts_event: def.ts_init,
            ts_init: def.ts_init,
        };

        Ok(Self {
            trader_id: def.trader_id,
            strategy_id: def.strategy_id,
            instrument_id: def.instrument_id,
            client_order_id: def.client_order_id,
            venue_order_id: None,
            account_id: None,
            position_id: None,
            order_list_id: def.order_list_id,
            parent_order_id: def.parent_order_id,
            linked_order_ids: def.linked_order_ids,
            side: def.side,
            kind: def.kind,
            quantity: def.quantity,
            filled_qty: Quantity::zero(size_precision),
            time_in_force: def.time_in_force,
            expire_time_ns: def.expire_time_ns,
            post_only: def.post_only,
            reduce_only: def.reduce_only,
            display_qty: def.display_qty,
            contingency_type: def.contingency_type,
            status: OrderStatus::Initialized,
            previous_status: None,
            events: vec![OrderEventAny::Initialized(init)],
            trade_ids: Vec::new(),
            avg_px: None,
            slippage: Decimal::ZERO,
            liquidity_side: LiquiditySide::NoLiquiditySide,
            ts_init: def.ts_init,
            ts_last: def.ts_init,
        })
    }

    /// Quantity still working: `quantity - filled_qty`.
    pub fn leaves_qty(&self) -> Quantity {
        self.quantity - self.filled_qty
    }

    pub fn order_type(&self) -> OrderType {
        self.kind.order_type()
    }

    pub fn is_buy(&self) -> bool {
        self.side == OrderSide::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.side == OrderSide::Sell
    }

    /// Whether the order is working at the venue.
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Accepted
                | OrderStatus::Triggered
                | OrderStatus::PendingUpdate
                | OrderStatus::PendingCancel
                | OrderStatus::PartiallyFilled
        )
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    /// The limit price, if this order type carries one.
    pub fn price(&self) -> Option<Price> {
        match &self.kind {
            OrderKind::Limit { price } | OrderKind::StopLimit { price, .. } => Some(*price),
            OrderKind::MarketToLimit { price }
            | OrderKind::TrailingStopLimit { price, .. } => *price,
            _ => None,
        }
    }

    /// The trigger price, if this order type carries one.
    pub fn trigger_price(&self) -> Option<Price> {
        match &self.kind {
            OrderKind::StopMarket { trigger_price, .. }
            | OrderKind::StopLimit { trigger_price, .. } => Some(*trigger_price),
            OrderKind::TrailingStopMarket { trigger_price, .. }
            | OrderKind::TrailingStopLimit { trigger_price, .. } => *trigger_price,
            _ => None,
        }
    }

    pub fn trigger_type(&self) -> Option<TriggerType> {
        match &self.kind {
            OrderKind::StopMarket { trigger_type, .. }
            | OrderKind::StopLimit { trigger_type, .. }
            | OrderKind::TrailingStopMarket { trigger_type, .. }
            | OrderKind::TrailingStopLimit { trigger_type, .. } => Some(*trigger_type),
            _ => None,
        }
    }

    /// Reference price for slippage: the limit for limit-ish orders, the
    /// trigger for stops.
    fn slippage_reference(&self) -> Option<Price> {
        match &self.kind {
            OrderKind::Limit { price } | OrderKind::StopLimit { price, .. } => Some(*price),
            OrderKind::StopMarket { trigger_price, .. } => Some(*trigger_price),
            OrderKind::TrailingStopMarket { trigger_price, .. } => *trigger_price,
            OrderKind::TrailingStopLimit { price, .. } => *price,
            _ => None,
        }
    }

    /// Apply a lifecycle event, driving the state machine.
    ///
    /// On error the order is unchanged.
    pub fn apply(&mut self, event: OrderEventAny) -> Result<(), InvalidStateTrigger> {
        // Fills self-transition until the order is done; map them onto the
        // table's PARTIALLY_FILLED/FILLED rows first.
        let resolved = match &event {
            OrderEventAny::Filled(fill) => {
                assert!(
                    fill.last_qty <= self.leaves_qty(),
                    "fill exceeds leaves quantity"
                );
                if self.filled_qty + fill.last_qty < self.quantity {
                    // Reuse the FILLED rows of the table for partial fills.
                    let probe = transition(self.status, &event)?;
                    match probe {
                        Target::Status(OrderStatus::Filled) => {
                            Target::Status(OrderStatus::PartiallyFilled)
                        }
                        other => other,
                    }
                } else {
                    transition(self.status, &event)?
                }
            }
            _ => transition(self.status, &event)?,
        };

        let new_status = match resolved {
            Target::Status(status) => status,
            Target::Previous => self.previous_status.unwrap_or(OrderStatus::Accepted),
        };

        match &event {
            OrderEventAny::Accepted(e) => {
                self.venue_order_id = Some(e.venue_order_id.clone());
                self.account_id = Some(e.account_id.clone());
            }
            OrderEventAny::Submitted(e) => {
                self.account_id = Some(e.account_id.clone());
            }
            OrderEventAny::Updated(e) => {
                // Updates shrinking below filled are rejected upstream.
                assert!(
                    e.quantity >= self.filled_qty,
                    "update below filled quantity"
                );
                self.quantity = e.quantity;
                if let Some(price) = e.price {
                    match &mut self.kind {
                        OrderKind::Limit { price: p } | OrderKind::StopLimit { price: p, .. } => {
                            *p = price
                        }
                        OrderKind::MarketToLimit { price: p }
                        | OrderKind::TrailingStopLimit { price: p, .. } => *p = Some(price),
                        _ => {}
                    }
                }
                if let Some(trigger) = e.trigger_price {
                    match &mut self.kind {
                        OrderKind::StopMarket { trigger_price, .. }
                        | OrderKind::StopLimit { trigger_price, .. } => *trigger_price = trigger,
                        OrderKind::TrailingStopMarket { trigger_price, .. }
                        | OrderKind::TrailingStopLimit { trigger_price, .. } => {
                            *trigger_price = Some(trigger)
                        }
                        _ => {}
                    }
                }
            }
            OrderEventAny::Filled(e) => {
                let prev_filled = self.filled_qty.as_decimal();
                let last_qty = e.last_qty.as_decimal();
                let last_px = e.last_px.as_decimal();
                let total = prev_filled + last_qty;
                let avg = match self.avg_px {
                    Some(avg) => (avg * prev_filled + last_px * last_qty) / total,
                    None => last_px,
                };
                self.avg_px = Some(avg);
                self.filled_qty += e.last_qty;
                self.trade_ids.push(e.trade_id.clone());
                self.liquidity_side = e.liquidity_side;
                if e.venue_position_id.is_some() {
                    self.position_id = e.venue_position_id.clone();
                }
                if let Some(reference) = self.slippage_reference() {
                    self.slippage = match self.side {
                        OrderSide::Buy => avg - reference.as_decimal(),
                        OrderSide::Sell => reference.as_decimal() - avg,
                    };
                }
            }
            _ => {}
        }

        // Pending states remember where to fall back to on reject.
        if matches!(
            new_status,
            OrderStatus::PendingUpdate | OrderStatus::PendingCancel
        ) && !matches!(
            self.status,
            OrderStatus::PendingUpdate | OrderStatus::PendingCancel
        ) {
            self.previous_status = Some(self.status);
        }

        self.status = new_status;
        self.ts_last = event.ts_event();
        self.events.push(event);
        Ok(())
    }

    /// All events applied so far, oldest first.
    pub fn events(&self) -> &[OrderEventAny] {
        &self.events
    }

    /// The most recent event.
    pub fn last_event(&self) -> Option<&OrderEventAny> {
        self.events.last()
    }
}

fn kind_has_limit(kind: &OrderKind) -> bool {
    matches!(
        kind,
        OrderKind::Limit { .. }
            | OrderKind::StopLimit { .. }
            | OrderKind::MarketToLimit { .. }
            | OrderKind::TrailingStopLimit { .. }
    )
}

/// A group of orders submitted atomically for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderList {
    pub id: OrderListId,
    pub instrument_id: InstrumentId,
    pub orders: Vec<Order>,
    pub ts_init: i64,
}

impl OrderList {
    pub fn new(
        id: OrderListId,
        orders: Vec<Order>,
        ts_init: i64,
    ) -> Result<Self, ValidationError> {
        let instrument_id = orders
            .first()
            .map(|o| o.instrument_id.clone())
            .ok_or(ValidationError::Invalid {
                field: "orders",
                reason: "order list must not be empty".to_string(),
            })?;
        for order in &orders {
            if order.instrument_id != instrument_id {
                return Err(ValidationError::MixedInstrumentList {
                    found: order.instrument_id.to_string(),
                });
            }
        }
        Ok(Self {
            id,
            instrument_id,
            orders,
            ts_init,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::events::*;
    use crate::money::Money;
    use uuid::Uuid;

    fn base_def() -> OrderDef {
        OrderDef {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("S-001"),
            instrument_id: "ETHUSDT.SIM".into(),
            client_order_id: ClientOrderId::new("O-1"),
            side: OrderSide::Buy,
            kind: OrderKind::Limit {
                price: "100.01".parse().unwrap(),
            },
            quantity: "5".parse().unwrap(),
            time_in_force: TimeInForce::Gtc,
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
        }
    }

    fn submitted(order: &Order) -> OrderEventAny {
        OrderEventAny::Submitted(OrderSubmitted {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            account_id: AccountId::new("SIM-001"),
            event_id: Uuid::nil(),
            ts_event: 1,
            ts_init: 1,
        })
    }

    fn accepted(order: &Order) -> OrderEventAny {
        OrderEventAny::Accepted(OrderAccepted {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: VenueOrderId::new("SIM-ETHUSDT-1"),
            account_id: AccountId::new("SIM-001"),
            event_id: Uuid::nil(),
            ts_event: 2,
            ts_init: 2,
        })
    }

    fn filled(order: &Order, qty: &str, px: &str, ts: i64) -> OrderEventAny {
        OrderEventAny::Filled(OrderFilled {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: VenueOrderId::new("SIM-ETHUSDT-1"),
            account_id: AccountId::new("SIM-001"),
            trade_id: TradeId::new(format!("SIM-T-{ts}")),
            venue_position_id: None,
            order_side: order.side,
            last_qty: qty.parse().unwrap(),
            last_px: px.parse().unwrap(),
            commission: Money::zero(Currency::default_for("USDT")),
            liquidity_side: LiquiditySide::Taker,
            event_id: Uuid::nil(),
            ts_event: ts,
            ts_init: ts,
        })
    }

    #[test]
    fn test_new_order_initialized() {
        let order = Order::new(base_def()).unwrap();
        assert_eq!(order.status, OrderStatus::Initialized);
        assert_eq!(order.leaves_qty(), order.quantity);
        assert_eq!(order.events().len(), 1);
        assert!(order.venue_order_id.is_none());
    }

    #[test]
    fn test_validation_gtd_requires_expiry() {
        let mut def = base_def();
        def.time_in_force = TimeInForce::Gtd;
        assert!(matches!(
            Order::new(def),
            Err(ValidationError::GtdWithoutExpireTime)
        ));
    }

    #[test]
    fn test_validation_expiry_requires_gtd() {
        let mut def = base_def();
        def.expire_time_ns = Some(10);
        assert!(Order::new(def).is_err());
    }

    #[test]
    fn test_validation_display_qty() {
        let mut def = base_def();
        def.display_qty = Some("6".parse().unwrap());
        assert!(matches!(
            Order::new(def),
            Err(ValidationError::DisplayQtyExceedsQuantity { .. })
        ));
    }

    #[test]
    fn test_validation_post_only_needs_limit() {
        let mut def = base_def();
        def.kind = OrderKind::Market;
        def.post_only = true;
        assert!(Order::new(def).is_err());
    }

    #[test]
    fn test_happy_path_to_filled() {
        let mut order = Order::new(base_def()).unwrap();
        order.apply(submitted(&order)).unwrap();
        order.apply(accepted(&order)).unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert!(order.venue_order_id.is_some());

        order.apply(filled(&order, "2", "100.00", 3)).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_qty.to_string(), "2");
        assert_eq!(order.leaves_qty().to_string(), "3");

        order.apply(filled(&order, "3", "100.01", 4)).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_closed());
        assert_eq!(order.leaves_qty().to_string(), "0");
        assert_eq!(order.trade_ids.len(), 2);
    }

    #[test]
    fn test_avg_px_weighted() {
        let mut def = base_def();
        def.quantity = "6".parse().unwrap();
        def.kind = OrderKind::Limit {
            price: "100.03".parse().unwrap(),
        };
        let mut order = Order::new(def).unwrap();
        order.apply(submitted(&order)).unwrap();
        order.apply(accepted(&order)).unwrap();
        order.apply(filled(&order, "3", "100.02", 3)).unwrap();
        order.apply(filled(&order, "3", "100.03", 4)).unwrap();
        assert_eq!(
            order.avg_px.unwrap(),
            Decimal::from_str_exact("100.025").unwrap()
        );
        // BUY slippage = avg - limit
        assert_eq!(
            order.slippage,
            Decimal::from_str_exact("-0.005").unwrap()
        );
    }

    #[test]
    fn test_terminal_refuses_further_events() {
        let mut order = Order::new(base_def()).unwrap();
        order.apply(submitted(&order)).unwrap();
        order.apply(accepted(&order)).unwrap();
        order.apply(filled(&order, "5", "100.00", 3)).unwrap();

        let err = order
            .apply(OrderEventAny::Canceled(OrderCanceled {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_order_id: order.client_order_id.clone(),
                venue_order_id: order.venue_order_id.clone(),
                reason: None,
                event_id: Uuid::nil(),
                ts_event: 9,
                ts_init: 9,
            }))
            .unwrap_err();
        assert_eq!(err.current, "FILLED");
        assert_eq!(err.trigger, "ORDER_CANCELED");
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_pending_update_reverts_on_reject() {
        let mut order = Order::new(base_def()).unwrap();
        order.apply(submitted(&order)).unwrap();
        order.apply(accepted(&order)).unwrap();

        order
            .apply(OrderEventAny::PendingUpdate(OrderPendingUpdate {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_order_id: order.client_order_id.clone(),
                venue_order_id: order.venue_order_id.clone(),
                account_id: AccountId::new("SIM-001"),
                event_id: Uuid::nil(),
                ts_event: 3,
                ts_init: 3,
            }))
            .unwrap();
        assert_eq!(order.status, OrderStatus::PendingUpdate);

        order
            .apply(OrderEventAny::ModifyRejected(OrderModifyRejected {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_order_id: order.client_order_id.clone(),
                venue_order_id: order.venue_order_id.clone(),
                reason: "quantity below filled".to_string(),
                event_id: Uuid::nil(),
                ts_event: 4,
                ts_init: 4,
            }))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
    }

    #[test]
    fn test_updated_mutates_price_and_quantity() {
        let mut order = Order::new(base_def()).unwrap();
        order.apply(submitted(&order)).unwrap();
        order.apply(accepted(&order)).unwrap();
        order
            .apply(OrderEventAny::Updated(OrderUpdated {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_order_id: order.client_order_id.clone(),
                venue_order_id: order.venue_order_id.clone(),
                quantity: "4".parse().unwrap(),
                price: Some("99.99".parse().unwrap()),
                trigger_price: None,
                event_id: Uuid::nil(),
                ts_event: 3,
                ts_init: 3,
            }))
            .unwrap();
        assert_eq!(order.quantity.to_string(), "4");
        assert_eq!(order.price().unwrap().to_string(), "99.99");
        assert_eq!(order.status, OrderStatus::Accepted);
    }

    #[test]
    fn test_order_list_single_instrument() {
        let a = Order::new(base_def()).unwrap();
        let mut def_b = base_def();
        def_b.client_order_id = ClientOrderId::new("O-2");
        def_b.instrument_id = "BTCUSDT.SIM".into();
        let b = Order::new(def_b).unwrap();
        let err = OrderList::new(OrderListId::new("OL-1"), vec![a, b], 0).unwrap_err();
        assert!(matches!(err, ValidationError::MixedInstrumentList { .. }));
    }

    #[test]
    fn test_order_serde_round_trip() {
        let mut order = Order::new(base_def()).unwrap();
        order.apply(submitted(&order)).unwrap();
        order.apply(accepted(&order)).unwrap();
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
