//! Instrument definitions
//!
//! Immutable after registration with the exchange. The matching engine only
//! reads the numeric facets (precisions, increments, multiplier, lot size,
//! fee rates); everything else is descriptive.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::Currency;
use crate::errors::ValidationError;
use crate::ids::{InstrumentId, Symbol};
use crate::numeric::{Price, Quantity, MAX_PRECISION};

/// A tradable instrument at a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub raw_symbol: Symbol,
    pub base_currency: Option<Currency>,
    pub quote_currency: Currency,
    /// Currency that commissions and PnL settle in.
    pub settlement_currency: Currency,
    pub price_precision: u8,
    pub size_precision: u8,
    /// Minimum price movement.
    pub price_increment: Price,
    /// Minimum size movement.
    pub size_increment: Quantity,
    /// Contract value multiplier.
    pub multiplier: Decimal,
    pub lot_size: Option<Quantity>,
    pub max_quantity: Option<Quantity>,
    pub min_quantity: Option<Quantity>,
    /// Initial margin rate as a fraction of notional.
    pub margin_init: Decimal,
    /// Maintenance margin rate as a fraction of notional.
    pub margin_maint: Decimal,
    /// Maker commission rate (fraction of notional; negative is a rebate).
    pub maker_fee: Decimal,
    /// Taker commission rate (fraction of notional).
    pub taker_fee: Decimal,
}

impl Instrument {
    /// Validate the numeric facets.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.price_precision > MAX_PRECISION {
            return Err(ValidationError::PrecisionExceeded {
                precision: self.price_precision,
                max: MAX_PRECISION,
            });
        }
        if self.size_precision > MAX_PRECISION {
            return Err(ValidationError::PrecisionExceeded {
                precision: self.size_precision,
                max: MAX_PRECISION,
            });
        }
        if self.price_increment.raw() <= 0 {
            return Err(ValidationError::Invalid {
                field: "price_increment",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Build a price at this instrument's precision.
    pub fn make_price(&self, value: Decimal) -> Price {
        Price::new(value, self.price_precision)
    }

    /// Build a quantity at this instrument's precision.
    pub fn make_qty(&self, value: Decimal) -> Quantity {
        Quantity::new(value, self.size_precision)
    }

    /// Notional value of a quantity at a price, in the quote currency.
    pub fn notional_value(&self, quantity: Quantity, price: Price) -> Decimal {
        quantity.as_decimal() * price.as_decimal() * self.multiplier
    }

    /// One tick as a signed mantissa step.
    pub fn tick_raw(&self) -> i64 {
        self.price_increment.raw()
    }
}

/// A plain spot pair with sane defaults, handy for tests and examples.
pub fn spot_instrument(id: InstrumentId, price_precision: u8, size_precision: u8) -> Instrument {
    let quote = Currency::default_for("USDT");
    Instrument {
        raw_symbol: id.symbol.clone(),
        id,
        base_currency: None,
        quote_currency: quote.clone(),
        settlement_currency: quote,
        price_precision,
        size_precision,
        price_increment: Price::from_raw(
            10i64.pow(9 - price_precision as u32),
            price_precision,
        ),
        size_increment: Quantity::from_raw(10u64.pow(9 - size_precision as u32), size_precision),
        multiplier: Decimal::ONE,
        lot_size: None,
        max_quantity: None,
        min_quantity: None,
        margin_init: Decimal::ZERO,
        margin_maint: Decimal::ZERO,
        maker_fee: Decimal::ZERO,
        taker_fee: Decimal::ZERO,
    }
}
