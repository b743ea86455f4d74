//! Execution reports describing observable venue state
//!
//! Reports are pure snapshots generated on demand; they never feed back into
//! the matching path.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{
    AccountId, ClientOrderId, InstrumentId, PositionId, TradeId, VenueOrderId,
};
use crate::money::Money;
use crate::numeric::{Price, Quantity};
use crate::order::{LiquiditySide, OrderSide, OrderStatus, OrderType, TimeInForce};
use crate::position::PositionSide;

/// Snapshot of a single order's state at the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub order_side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub order_status: OrderStatus,
    pub quantity: Quantity,
    pub filled_qty: Quantity,
    pub leaves_qty: Quantity,
    pub price: Option<Price>,
    pub trigger_price: Option<Price>,
    pub avg_px: Option<Decimal>,
    pub post_only: bool,
    pub reduce_only: bool,
    pub ts_accepted: Option<i64>,
    pub ts_last: i64,
    pub ts_init: i64,
}

/// A single fill as reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReport {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: VenueOrderId,
    pub venue_position_id: Option<PositionId>,
    pub trade_id: TradeId,
    pub order_side: OrderSide,
    pub last_qty: Quantity,
    pub last_px: Price,
    pub commission: Money,
    pub liquidity_side: LiquiditySide,
    pub ts_event: i64,
    pub ts_init: i64,
}

/// Snapshot of a position at the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionStatusReport {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub venue_position_id: PositionId,
    pub position_side: PositionSide,
    pub quantity: Decimal,
    pub signed_qty: Decimal,
    pub avg_px_open: Decimal,
    pub realized_pnl: Money,
    pub ts_last: i64,
    pub ts_init: i64,
}

/// Everything the venue knows, bundled for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMassStatus {
    pub account_id: AccountId,
    pub order_reports: Vec<OrderStatusReport>,
    pub trade_reports: Vec<TradeReport>,
    pub position_reports: Vec<PositionStatusReport>,
    pub ts_init: i64,
}
