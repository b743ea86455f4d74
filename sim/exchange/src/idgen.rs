//! Deterministic identifier generation
//!
//! Venue order and position ids come from per-instrument counters, trade ids
//! from one global counter, and event ids are built from (seed, counter) so
//! the whole emitted stream is a pure function of the run's inputs.

use std::collections::BTreeMap;

use uuid::Uuid;

use model::ids::{InstrumentId, PositionId, StrategyId, TradeId, Venue, VenueOrderId};

/// Counter-backed id factory owned by the exchange.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    venue: Venue,
    seed: u64,
    order_counts: BTreeMap<String, u64>,
    position_counts: BTreeMap<String, u64>,
    trade_count: u64,
    event_count: u64,
}

impl IdGenerator {
    pub fn new(venue: Venue, seed: u64) -> Self {
        Self {
            venue,
            seed,
            order_counts: BTreeMap::new(),
            position_counts: BTreeMap::new(),
            trade_count: 0,
            event_count: 0,
        }
    }

    /// Next venue order id for an instrument, with its numeric sequence.
    ///
    /// The sequence doubles as the order's book entry id (offset by the
    /// caller) and as the stable tie-break in price/time priority.
    pub fn venue_order_id(&mut self, instrument_id: &InstrumentId) -> (VenueOrderId, u64) {
        let count = self
            .order_counts
            .entry(instrument_id.symbol.to_string())
            .or_insert(0);
        *count += 1;
        let id = VenueOrderId::new(format!(
            "{}-{}-{:03}",
            self.venue, instrument_id.symbol, count
        ));
        (id, *count)
    }

    /// Fresh per-order position id (HEDGING venues).
    pub fn position_id(&mut self, instrument_id: &InstrumentId) -> PositionId {
        let count = self
            .position_counts
            .entry(instrument_id.symbol.to_string())
            .or_insert(0);
        *count += 1;
        PositionId::new(format!(
            "{}-{}-{:03}",
            self.venue, instrument_id.symbol, count
        ))
    }

    /// Stable per-(instrument, strategy) position id (NETTING venues).
    pub fn netting_position_id(
        &self,
        instrument_id: &InstrumentId,
        strategy_id: &StrategyId,
    ) -> PositionId {
        PositionId::new(format!("{}-{}", instrument_id, strategy_id))
    }

    /// Next global trade id.
    pub fn trade_id(&mut self) -> TradeId {
        self.trade_count += 1;
        TradeId::new(format!("{}-{}", self.venue, self.trade_count))
    }

    /// Next event id, derived from (seed, counter).
    pub fn event_id(&mut self) -> Uuid {
        self.event_count += 1;
        Uuid::from_u64_pair(self.seed, self.event_count)
    }

    /// Reset all counters (exchange reset).
    pub fn reset(&mut self) {
        self.order_counts.clear();
        self.position_counts.clear();
        self.trade_count = 0;
        self.event_count = 0;
    }
}
