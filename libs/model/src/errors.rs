//! Error taxonomy for the exchange core
//!
//! Validation and configuration errors propagate to the caller as `Result`;
//! runtime refusals (post-only would cross, unknown order on cancel, ...)
//! become events on the order so replays stay deterministic.

use thiserror::Error;

/// Inputs violating construction contracts.
///
/// Raised synchronously at the call site; no state change has occurred.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("precision {precision} exceeds maximum {max}")]
    PrecisionExceeded { precision: u8, max: u8 },

    #[error("quantity must be positive")]
    QuantityNotPositive,

    #[error("display quantity {display} exceeds order quantity {quantity}")]
    DisplayQtyExceedsQuantity { display: String, quantity: String },

    #[error("GTD order requires an expire time")]
    GtdWithoutExpireTime,

    #[error("ts_event {ts_event} is greater than ts_init {ts_init}")]
    EventAfterInit { ts_event: i64, ts_init: i64 },

    #[error("{order_type} order requires a {field}")]
    MissingOrderField {
        order_type: &'static str,
        field: &'static str,
    },

    #[error("price {price} does not conform to precision {precision}")]
    PricePrecision { price: String, precision: u8 },

    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    #[error("probability {value} outside [0, 1]")]
    ProbabilityOutOfRange { value: f64 },

    #[error("order list must share one instrument, found {found}")]
    MixedInstrumentList { found: String },

    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// The order state machine refused a transition.
///
/// The order is left unchanged; the caller decides whether this becomes an
/// `OrderModifyRejected`/`OrderCancelRejected` event or a programmatic error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid state trigger: {current} -> {trigger}")]
pub struct InvalidStateTrigger {
    /// Current order status name.
    pub current: String,
    /// The event kind that was refused.
    pub trigger: String,
}

/// Setup and dispatch errors raised by the simulated exchange.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("instrument not registered: {instrument_id}")]
    InstrumentNotFound { instrument_id: String },

    #[error("order not found: {client_order_id}")]
    OrderNotFound { client_order_id: String },

    #[error("account not initialized")]
    AccountNotInitialized,

    #[error("account is frozen")]
    AccountFrozen,

    #[error("missing configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] InvalidStateTrigger),
}
