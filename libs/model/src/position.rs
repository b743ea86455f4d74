//! Positions built deterministically from fills
//!
//! A position is created on the first fill for its id, may flip sides when
//! an opposite fill exceeds the current net quantity, and closes at FLAT.
//! Closed positions stay queryable; nothing is deleted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::Currency;
use crate::events::OrderFilled;
use crate::ids::{InstrumentId, PositionId, StrategyId, TradeId};
use crate::instrument::Instrument;
use crate::money::Money;
use crate::order::OrderSide;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

/// A single position at the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub instrument_id: InstrumentId,
    pub strategy_id: StrategyId,
    pub side: PositionSide,
    /// Net quantity, positive long / negative short.
    pub signed_qty: Decimal,
    /// Volume-weighted open price of the current exposure.
    pub avg_px_open: Decimal,
    /// Volume-weighted price of closing fills in the current cycle.
    pub avg_px_close: Option<Decimal>,
    /// Quantity closed in the current cycle.
    pub closed_qty: Decimal,
    /// Realized PnL including commissions in the settlement currency.
    pub realized_pnl: Money,
    pub multiplier: Decimal,
    pub settlement_currency: Currency,
    pub trade_ids: Vec<TradeId>,
    pub ts_opened: i64,
    pub ts_last: i64,
    pub ts_closed: Option<i64>,
}

impl Position {
    /// Open a position from its first fill.
    pub fn new(id: PositionId, instrument: &Instrument, fill: &OrderFilled) -> Self {
        let mut position = Self {
            id,
            instrument_id: fill.instrument_id.clone(),
            strategy_id: fill.strategy_id.clone(),
            side: PositionSide::Flat,
            signed_qty: Decimal::ZERO,
            avg_px_open: Decimal::ZERO,
            avg_px_close: None,
            closed_qty: Decimal::ZERO,
            realized_pnl: Money::zero(instrument.settlement_currency.clone()),
            multiplier: instrument.multiplier,
            settlement_currency: instrument.settlement_currency.clone(),
            trade_ids: Vec::new(),
            ts_opened: fill.ts_event,
            ts_last: fill.ts_event,
            ts_closed: None,
        };
        position.apply(fill);
        position
    }

    pub fn is_open(&self) -> bool {
        self.side != PositionSide::Flat
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Absolute net quantity.
    pub fn quantity(&self) -> Decimal {
        self.signed_qty.abs()
    }

    /// Apply a fill, updating exposure and realizing PnL on any closing
    /// portion. Flips split the fill into a closing and an opening part.
    pub fn apply(&mut self, fill: &OrderFilled) {
        let fill_qty = fill.last_qty.as_decimal();
        let fill_px = fill.last_px.as_decimal();
        let signed_fill = match fill.order_side {
            OrderSide::Buy => fill_qty,
            OrderSide::Sell => -fill_qty,
        };

        self.trade_ids.push(fill.trade_id.clone());
        self.ts_last = fill.ts_event;

        // Commissions in the settlement currency reduce realized PnL; other
        // currencies only hit the account balances.
        if fill.commission.currency().code == self.settlement_currency.code {
            self.realized_pnl -= fill.commission.clone();
        }

        let same_direction = self.signed_qty.is_zero()
            || (self.signed_qty > Decimal::ZERO) == (signed_fill > Decimal::ZERO);

        if same_direction {
            if self.signed_qty.is_zero() {
                // Fresh cycle, possibly reopening a closed position.
                self.ts_opened = fill.ts_event;
                self.ts_closed = None;
                self.avg_px_close = None;
                self.closed_qty = Decimal::ZERO;
                self.avg_px_open = fill_px;
            } else {
                let old_abs = self.signed_qty.abs();
                self.avg_px_open =
                    (self.avg_px_open * old_abs + fill_px * fill_qty) / (old_abs + fill_qty);
            }
            self.signed_qty += signed_fill;
        } else {
            let open_abs = self.signed_qty.abs();
            let closing = fill_qty.min(open_abs);
            let direction = if self.signed_qty > Decimal::ZERO {
                Decimal::ONE
            } else {
                -Decimal::ONE
            };
            let pnl = (fill_px - self.avg_px_open) * closing * self.multiplier * direction;
            self.realized_pnl += Money::new(pnl, self.settlement_currency.clone());

            let closed_total = self.closed_qty + closing;
            self.avg_px_close = Some(match self.avg_px_close {
                Some(avg) => (avg * self.closed_qty + fill_px * closing) / closed_total,
                None => fill_px,
            });
            self.closed_qty = closed_total;

            let remainder = fill_qty - closing;
            if remainder.is_zero() {
                self.signed_qty += signed_fill;
            } else {
                // Flip: the remainder opens fresh exposure on the other side.
                self.signed_qty = match fill.order_side {
                    OrderSide::Buy => remainder,
                    OrderSide::Sell => -remainder,
                };
                self.avg_px_open = fill_px;
                self.avg_px_close = None;
                self.closed_qty = Decimal::ZERO;
                self.ts_opened = fill.ts_event;
            }
        }

        if self.signed_qty.is_zero() {
            self.side = PositionSide::Flat;
            self.ts_closed = Some(fill.ts_event);
        } else if self.signed_qty > Decimal::ZERO {
            self.side = PositionSide::Long;
        } else {
            self.side = PositionSide::Short;
        }
    }

    /// Unrealized PnL against a mark price.
    pub fn unrealized_pnl(&self, mark_px: Decimal) -> Money {
        let pnl = (mark_px - self.avg_px_open) * self.signed_qty * self.multiplier;
        Money::new(pnl, self.settlement_currency.clone())
    }
}
