//! Simulated exchange and order-matching core.
//!
//! Single-threaded, event-driven, logical-time. One [`exchange::SimulatedExchange`]
//! owns every per-instrument [`book::OrderBook`] and
//! [`matching::OrderMatchingEngine`], the account, the inflight command
//! queue, and the seeded randomness used by the fill model. Identical
//! (initial state, seed, event stream) inputs produce identical event
//! streams, byte for byte.

pub mod accounting;
pub mod book;
pub mod exchange;
pub mod idgen;
pub mod inflight;
pub mod matching;
pub mod models;

pub use crate::exchange::{ExchangeConfig, SimulatedExchange};
pub use crate::models::fill::FillModel;
pub use crate::models::latency::LatencyModel;
