//! Order lifecycle events
//!
//! Every observable change to an order is one of these records. Events are
//! applied to the owning order (driving its state machine) and published on
//! the exchange's outbound stream. All variants round-trip through JSON with
//! a stable field set; the `type` tag is the event name in UPPER_SNAKE form.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{
    AccountId, ClientOrderId, InstrumentId, OrderListId, PositionId, StrategyId, TradeId,
    TraderId, VenueOrderId,
};
use crate::money::Money;
use crate::numeric::{Price, Quantity};
use crate::order::{
    ContingencyType, LiquiditySide, OrderKind, OrderSide, TimeInForce,
};

/// Order definition captured at creation time.
///
/// This event doubles as the order constructor input: an [`crate::order::Order`]
/// is built from exactly one `OrderInitialized`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInitialized {
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
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// The order failed validation before reaching the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDenied {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub reason: String,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// The order left the trader and is in flight to the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmitted {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub account_id: AccountId,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// The venue accepted the order and assigned a venue order id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: VenueOrderId,
    pub account_id: AccountId,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// The venue refused the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub account_id: AccountId,
    pub reason: String,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// A modify request is awaiting the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPendingUpdate {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub account_id: AccountId,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// A cancel request is awaiting the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPendingCancel {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub account_id: AccountId,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// The venue refused a modify request; the order is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderModifyRejected {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub reason: String,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// The venue refused a cancel request; the order is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelRejected {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub reason: String,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// The order's quantity, price or trigger price changed at the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdated {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub trigger_price: Option<Price>,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// A stop condition fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTriggered {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// The order was removed from the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    /// Populated for venue-initiated cancels (e.g. "contingency", "ioc").
    pub reason: Option<String>,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// The order's time-in-force deadline passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExpired {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// Liquidity changed hands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFilled {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: VenueOrderId,
    pub account_id: AccountId,
    pub trade_id: TradeId,
    pub venue_position_id: Option<PositionId>,
    pub order_side: OrderSide,
    pub last_qty: Quantity,
    pub last_px: Price,
    pub commission: Money,
    pub liquidity_side: LiquiditySide,
    pub event_id: Uuid,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// Any order lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrderEventAny {
    #[serde(rename = "ORDER_INITIALIZED")]
    Initialized(OrderInitialized),
    #[serde(rename = "ORDER_DENIED")]
    Denied(OrderDenied),
    #[serde(rename = "ORDER_SUBMITTED")]
    Submitted(OrderSubmitted),
    #[serde(rename = "ORDER_ACCEPTED")]
    Accepted(OrderAccepted),
    #[serde(rename = "ORDER_REJECTED")]
    Rejected(OrderRejected),
    #[serde(rename = "ORDER_PENDING_UPDATE")]
    PendingUpdate(OrderPendingUpdate),
    #[serde(rename = "ORDER_PENDING_CANCEL")]
    PendingCancel(OrderPendingCancel),
    #[serde(rename = "ORDER_MODIFY_REJECTED")]
    ModifyRejected(OrderModifyRejected),
    #[serde(rename = "ORDER_CANCEL_REJECTED")]
    CancelRejected(OrderCancelRejected),
    #[serde(rename = "ORDER_UPDATED")]
    Updated(OrderUpdated),
    #[serde(rename = "ORDER_TRIGGERED")]
    Triggered(OrderTriggered),
    #[serde(rename = "ORDER_CANCELED")]
    Canceled(OrderCanceled),
    #[serde(rename = "ORDER_EXPIRED")]
    Expired(OrderExpired),
    #[serde(rename = "ORDER_FILLED")]
    Filled(OrderFilled),
}

impl OrderEventAny {
    /// The client order id this event belongs to.
    pub fn client_order_id(&self) -> &ClientOrderId {
        match self {
            Self::Initialized(e) => &e.client_order_id,
            Self::Denied(e) => &e.client_order_id,
            Self::Submitted(e) => &e.client_order_id,
            Self::Accepted(e) => &e.client_order_id,
            Self::Rejected(e) => &e.client_order_id,
            Self::PendingUpdate(e) => &e.client_order_id,
            Self::PendingCancel(e) => &e.client_order_id,
            Self::ModifyRejected(e) => &e.client_order_id,
            Self::CancelRejected(e) => &e.client_order_id,
            Self::Updated(e) => &e.client_order_id,
            Self::Triggered(e) => &e.client_order_id,
            Self::Canceled(e) => &e.client_order_id,
            Self::Expired(e) => &e.client_order_id,
            Self::Filled(e) => &e.client_order_id,
        }
    }

    /// When the event happened in simulated time.
    pub fn ts_event(&self) -> i64 {
        match self {
            Self::Initialized(e) => e.ts_event,
            Self::Denied(e) => e.ts_event,
            Self::Submitted(e) => e.ts_event,
            Self::Accepted(e) => e.ts_event,
            Self::Rejected(e) => e.ts_event,
            Self::PendingUpdate(e) => e.ts_event,
            Self::PendingCancel(e) => e.ts_event,
            Self::ModifyRejected(e) => e.ts_event,
            Self::CancelRejected(e) => e.ts_event,
            Self::Updated(e) => e.ts_event,
            Self::Triggered(e) => e.ts_event,
            Self::Canceled(e) => e.ts_event,
            Self::Expired(e) => e.ts_event,
            Self::Filled(e) => e.ts_event,
        }
    }

    /// The unique event id.
    pub fn event_id(&self) -> Uuid {
        match self {
            Self::Initialized(e) => e.event_id,
            Self::Denied(e) => e.event_id,
            Self::Submitted(e) => e.event_id,
            Self::Accepted(e) => e.event_id,
            Self::Rejected(e) => e.event_id,
            Self::PendingUpdate(e) => e.event_id,
            Self::PendingCancel(e) => e.event_id,
            Self::ModifyRejected(e) => e.event_id,
            Self::CancelRejected(e) => e.event_id,
            Self::Updated(e) => e.event_id,
            Self::Triggered(e) => e.event_id,
            Self::Canceled(e) => e.event_id,
            Self::Expired(e) => e.event_id,
            Self::Filled(e) => e.event_id,
        }
    }

    /// UPPER_SNAKE name of the event kind (the serde tag).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Initialized(_) => "ORDER_INITIALIZED",
            Self::Denied(_) => "ORDER_DENIED",
            Self::Submitted(_) => "ORDER_SUBMITTED",
            Self::Accepted(_) => "ORDER_ACCEPTED",
            Self::Rejected(_) => "ORDER_REJECTED",
            Self::PendingUpdate(_) => "ORDER_PENDING_UPDATE",
            Self::PendingCancel(_) => "ORDER_PENDING_CANCEL",
            Self::ModifyRejected(_) => "ORDER_MODIFY_REJECTED",
            Self::CancelRejected(_) => "ORDER_CANCEL_REJECTED",
            Self::Updated(_) => "ORDER_UPDATED",
            Self::Triggered(_) => "ORDER_TRIGGERED",
            Self::Canceled(_) => "ORDER_CANCELED",
            Self::Expired(_) => "ORDER_EXPIRED",
            Self::Filled(_) => "ORDER_FILLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderKind;

    fn filled_event() -> OrderFilled {
        OrderFilled {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("S-001"),
            instrument_id: "ETHUSDT.SIM".into(),
            client_order_id: ClientOrderId::new("O-1"),
            venue_order_id: VenueOrderId::new("SIM-ETHUSDT-1"),
            account_id: AccountId::new("SIM-001"),
            trade_id: TradeId::new("SIM-T-1"),
            venue_position_id: Some(PositionId::new("P-1")),
            order_side: OrderSide::Buy,
            last_qty: "3".parse().unwrap(),
            last_px: "100.02".parse().unwrap(),
            commission: "0.15 USDT".parse().unwrap(),
            liquidity_side: LiquiditySide::Taker,
            event_id: Uuid::nil(),
            ts_event: 1,
            ts_init: 1,
        }
    }

    #[test]
    fn test_filled_serde_round_trip() {
        let event = OrderEventAny::Filled(filled_event());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ORDER_FILLED\""));
        assert!(json.contains("\"TAKER\""));
        let back: OrderEventAny = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_initialized_serde_round_trip() {
        let event = OrderEventAny::Initialized(OrderInitialized {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("S-001"),
            instrument_id: "ETHUSDT.SIM".into(),
            client_order_id: ClientOrderId::new("O-1"),
            side: OrderSide::Sell,
            kind: OrderKind::Limit {
                price: "101.00".parse().unwrap(),
            },
            quantity: "1".parse().unwrap(),
            time_in_force: TimeInForce::Gtc,
            expire_time_ns: None,
            post_only: true,
            reduce_only: false,
            display_qty: None,
            contingency_type: ContingencyType::NoContingency,
            order_list_id: None,
            parent_order_id: None,
            linked_order_ids: Vec::new(),
            event_id: Uuid::nil(),
            ts_event: 0,
            ts_init: 0,
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: OrderEventAny = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_accessors() {
        let event = OrderEventAny::Filled(filled_event());
        assert_eq!(event.client_order_id().as_str(), "O-1");
        assert_eq!(event.ts_event(), 1);
        assert_eq!(event.kind_name(), "ORDER_FILLED");
    }
}
