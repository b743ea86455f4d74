//! Trading commands accepted by the simulated exchange
//!
//! Commands are created by the trader side, stamped with a UUIDv4 command id,
//! and travel through the exchange's inflight queue before they commit at
//! their latency-adjusted time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{ClientId, ClientOrderId, InstrumentId, PositionId, StrategyId, TraderId, VenueOrderId};
use crate::numeric::{Price, Quantity};
use crate::order::{Order, OrderList, OrderSide};

/// Any command routed to the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TradingCommand {
    #[serde(rename = "SUBMIT_ORDER")]
    SubmitOrder(SubmitOrder),
    #[serde(rename = "SUBMIT_ORDER_LIST")]
    SubmitOrderList(SubmitOrderList),
    #[serde(rename = "MODIFY_ORDER")]
    ModifyOrder(ModifyOrder),
    #[serde(rename = "CANCEL_ORDER")]
    CancelOrder(CancelOrder),
    #[serde(rename = "CANCEL_ALL_ORDERS")]
    CancelAllOrders(CancelAllOrders),
    #[serde(rename = "QUERY_ORDER")]
    QueryOrder(QueryOrder),
}

impl TradingCommand {
    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            Self::SubmitOrder(c) => &c.instrument_id,
            Self::SubmitOrderList(c) => &c.instrument_id,
            Self::ModifyOrder(c) => &c.instrument_id,
            Self::CancelOrder(c) => &c.instrument_id,
            Self::CancelAllOrders(c) => &c.instrument_id,
            Self::QueryOrder(c) => &c.instrument_id,
        }
    }

    pub fn ts_init(&self) -> i64 {
        match self {
            Self::SubmitOrder(c) => c.ts_init,
            Self::SubmitOrderList(c) => c.ts_init,
            Self::ModifyOrder(c) => c.ts_init,
            Self::CancelOrder(c) => c.ts_init,
            Self::CancelAllOrders(c) => c.ts_init,
            Self::QueryOrder(c) => c.ts_init,
        }
    }
}

/// Submit a single order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_id: Option<ClientId>,
    pub order: Order,
    /// Target position for HEDGING venues; ignored for NETTING.
    pub position_id: Option<PositionId>,
    /// Deny the order when `position_id` names a position the venue does
    /// not know.
    pub check_position_exists: bool,
    pub command_id: Uuid,
    pub ts_init: i64,
}

/// Submit a contingent list of orders atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOrderList {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_id: Option<ClientId>,
    pub order_list: OrderList,
    pub command_id: Uuid,
    pub ts_init: i64,
}

/// Modify an open order's quantity, price or trigger price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_id: Option<ClientId>,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub quantity: Option<Quantity>,
    pub price: Option<Price>,
    pub trigger_price: Option<Price>,
    pub command_id: Uuid,
    pub ts_init: i64,
}

/// Cancel one open order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_id: Option<ClientId>,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub command_id: Uuid,
    pub ts_init: i64,
}

/// Cancel every open order for the strategy on an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAllOrders {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_id: Option<ClientId>,
    /// Restrict the sweep to one side; `None` sweeps both.
    pub order_side: Option<OrderSide>,
    pub command_id: Uuid,
    pub ts_init: i64,
}

/// Ask the venue for an order status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOrder {
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub client_id: Option<ClientId>,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub command_id: Uuid,
    pub ts_init: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_order_serde_round_trip() {
        let command = TradingCommand::CancelOrder(CancelOrder {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("S-001"),
            instrument_id: "ETHUSDT.SIM".into(),
            client_id: None,
            client_order_id: ClientOrderId::new("O-1"),
            venue_order_id: Some(VenueOrderId::new("SIM-ETHUSDT-1")),
            command_id: Uuid::new_v4(),
            ts_init: 42,
        });
        let json = serde_json::to_string(&command).unwrap();
        assert!(json.contains("\"type\":\"CANCEL_ORDER\""));
        let back: TradingCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(command, back);
        assert_eq!(back.ts_init(), 42);
    }

    #[test]
    fn test_cancel_all_serde_round_trip() {
        let command = TradingCommand::CancelAllOrders(CancelAllOrders {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("S-001"),
            instrument_id: "ETHUSDT.SIM".into(),
            client_id: None,
            order_side: Some(OrderSide::Buy),
            command_id: Uuid::new_v4(),
            ts_init: 7,
        });
        let json = serde_json::to_string(&command).unwrap();
        let back: TradingCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(command, back);
        assert_eq!(back.instrument_id().to_string(), "ETHUSDT.SIM");
    }
}
