//! Market data value records
//!
//! Immutable, timestamped records fed into the simulated exchange. Every
//! record carries `ts_event` (when it happened at the source) and `ts_init`
//! (when it was created locally); `ts_event <= ts_init` is enforced at
//! construction so no record can claim to come from the future.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ValidationError;
use crate::ids::{InstrumentId, TradeId};
use crate::numeric::{Price, Quantity};

/// The side whose order crossed the spread for a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggressorSide {
    NoAggressor,
    Buyer,
    Seller,
}

/// Granularity of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookType {
    /// Top-of-book only: one synthetic order per side.
    L1Tbbo,
    /// Price-aggregated depth.
    L2Mbp,
    /// Every order individually.
    L3Mbo,
}

/// Mutation kind carried by an order book delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookAction {
    Add,
    Update,
    Delete,
    Clear,
}

/// Side of the book an order rests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    pub fn opposite(&self) -> Self {
        match self {
            BookSide::Bid => BookSide::Ask,
            BookSide::Ask => BookSide::Bid,
        }
    }
}

/// A single order as represented inside a book or a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookOrder {
    pub side: BookSide,
    pub price: Price,
    pub size: Quantity,
    /// Venue-local numeric order id; synthetic for L1/L2 books.
    pub order_id: u64,
}

impl BookOrder {
    pub fn new(side: BookSide, price: Price, size: Quantity, order_id: u64) -> Self {
        Self {
            side,
            price,
            size,
            order_id,
        }
    }
}

fn check_timestamps(ts_event: i64, ts_init: i64) -> Result<(), ValidationError> {
    if ts_event > ts_init {
        return Err(ValidationError::EventAfterInit { ts_event, ts_init });
    }
    Ok(())
}

/// Top-of-book quote: best bid/ask with sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub instrument_id: InstrumentId,
    pub bid: Price,
    pub ask: Price,
    pub bid_size: Quantity,
    pub ask_size: Quantity,
    pub ts_event: i64,
    pub ts_init: i64,
}

impl QuoteTick {
    pub fn new(
        instrument_id: InstrumentId,
        bid: Price,
        ask: Price,
        bid_size: Quantity,
        ask_size: Quantity,
        ts_event: i64,
        ts_init: i64,
    ) -> Result<Self, ValidationError> {
        check_timestamps(ts_event, ts_init)?;
        Ok(Self {
            instrument_id,
            bid,
            ask,
            bid_size,
            ask_size,
            ts_event,
            ts_init,
        })
    }

    /// Construct directly from raw mantissas; round-trips bit-exactly.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        instrument_id: InstrumentId,
        bid_raw: i64,
        ask_raw: i64,
        price_precision: u8,
        bid_size_raw: u64,
        ask_size_raw: u64,
        size_precision: u8,
        ts_event: i64,
        ts_init: i64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            instrument_id,
            Price::from_raw(bid_raw, price_precision),
            Price::from_raw(ask_raw, price_precision),
            Quantity::from_raw(bid_size_raw, size_precision),
            Quantity::from_raw(ask_size_raw, size_precision),
            ts_event,
            ts_init,
        )
    }

    /// Midpoint with one extra digit of precision (the only place a
    /// precision increase is allowed).
    pub fn mid_price(&self) -> Price {
        let precision = (self.bid.precision().max(self.ask.precision()) + 1).min(9);
        Price::from_raw((self.bid.raw() + self.ask.raw()) / 2, precision)
    }
}

/// A single executed trade at the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub size: Quantity,
    pub aggressor_side: AggressorSide,
    pub trade_id: TradeId,
    pub ts_event: i64,
    pub ts_init: i64,
}

impl TradeTick {
    pub fn new(
        instrument_id: InstrumentId,
        price: Price,
        size: Quantity,
        aggressor_side: AggressorSide,
        trade_id: TradeId,
        ts_event: i64,
        ts_init: i64,
    ) -> Result<Self, ValidationError> {
        check_timestamps(ts_event, ts_init)?;
        Ok(Self {
            instrument_id,
            price,
            size,
            aggressor_side,
            trade_id,
            ts_event,
            ts_init,
        })
    }

    /// Construct directly from raw mantissas; round-trips bit-exactly.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        instrument_id: InstrumentId,
        price_raw: i64,
        price_precision: u8,
        size_raw: u64,
        size_precision: u8,
        aggressor_side: AggressorSide,
        trade_id: TradeId,
        ts_event: i64,
        ts_init: i64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            instrument_id,
            Price::from_raw(price_raw, price_precision),
            Quantity::from_raw(size_raw, size_precision),
            aggressor_side,
            trade_id,
            ts_event,
            ts_init,
        )
    }
}

/// How bar windows are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarAggregation {
    Second,
    Minute,
    Hour,
    Day,
    Tick,
    Volume,
}

/// Which price series a bar aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
    Bid,
    Ask,
    Mid,
    Last,
}

/// Step + aggregation + price series, e.g. 1-MINUTE-LAST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarSpecification {
    pub step: u64,
    pub aggregation: BarAggregation,
    pub price_type: PriceType,
}

/// Fully-qualified bar type: an instrument plus its specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarType {
    pub instrument_id: InstrumentId,
    pub spec: BarSpecification,
}

impl fmt::Display for BarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:?}-{:?}",
            self.instrument_id, self.spec.step, self.spec.aggregation, self.spec.price_type
        )
    }
}

/// OHLCV aggregation over a bar window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub bar_type: BarType,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    pub ts_event: i64,
    pub ts_init: i64,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bar_type: BarType,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Quantity,
        ts_event: i64,
        ts_init: i64,
    ) -> Result<Self, ValidationError> {
        check_timestamps(ts_event, ts_init)?;
        if high < low {
            return Err(ValidationError::Invalid {
                field: "bar",
                reason: format!("high {high} below low {low}"),
            });
        }
        Ok(Self {
            bar_type,
            open,
            high,
            low,
            close,
            volume,
            ts_event,
            ts_init,
        })
    }

    /// Whether the bar closed at or above its open.
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// A single mutation of an order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookDelta {
    pub instrument_id: InstrumentId,
    pub action: BookAction,
    pub order: BookOrder,
    pub sequence: u64,
    pub ts_event: i64,
    pub ts_init: i64,
}

impl OrderBookDelta {
    pub fn new(
        instrument_id: InstrumentId,
        action: BookAction,
        order: BookOrder,
        sequence: u64,
        ts_event: i64,
        ts_init: i64,
    ) -> Result<Self, ValidationError> {
        check_timestamps(ts_event, ts_init)?;
        Ok(Self {
            instrument_id,
            action,
            order,
            sequence,
            ts_event,
            ts_init,
        })
    }
}

/// A complete book image; applying one clears then loads atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub instrument_id: InstrumentId,
    /// Bid orders, best (highest price) first.
    pub bids: Vec<BookOrder>,
    /// Ask orders, best (lowest price) first.
    pub asks: Vec<BookOrder>,
    pub sequence: u64,
    pub ts_event: i64,
    pub ts_init: i64,
}

impl OrderBookSnapshot {
    pub fn new(
        instrument_id: InstrumentId,
        bids: Vec<BookOrder>,
        asks: Vec<BookOrder>,
        sequence: u64,
        ts_event: i64,
        ts_init: i64,
    ) -> Result<Self, ValidationError> {
        check_timestamps(ts_event, ts_init)?;
        Ok(Self {
            instrument_id,
            bids,
            asks,
            sequence,
            ts_event,
            ts_init,
        })
    }
}
