//! Commission models
//!
//! Injected at exchange construction; the engine calls through the trait per
//! fill. Rates are fractions of notional, negative maker rates are rebates.

use rust_decimal::Decimal;

use model::instrument::Instrument;
use model::money::Money;
use model::numeric::{Price, Quantity};
use model::order::LiquiditySide;

/// Computes the commission for a single fill.
pub trait CommissionModel: Send {
    fn commission(
        &self,
        instrument: &Instrument,
        last_qty: Quantity,
        last_px: Price,
        liquidity_side: LiquiditySide,
    ) -> Money;
}

/// Maker/taker rates read from the instrument definition.
#[derive(Debug, Clone, Default)]
pub struct MakerTakerCommission;

impl CommissionModel for MakerTakerCommission {
    fn commission(
        &self,
        instrument: &Instrument,
        last_qty: Quantity,
        last_px: Price,
        liquidity_side: LiquiditySide,
    ) -> Money {
        let rate = match liquidity_side {
            LiquiditySide::Maker => instrument.maker_fee,
            LiquiditySide::Taker => instrument.taker_fee,
            LiquiditySide::NoLiquiditySide => Decimal::ZERO,
        };
        let notional = instrument.notional_value(last_qty, last_px);
        Money::new(notional * rate, instrument.settlement_currency.clone())
    }
}

/// Flat amount per fill regardless of size.
#[derive(Debug, Clone)]
pub struct FixedCommission {
    pub amount: Decimal,
}

impl CommissionModel for FixedCommission {
    fn commission(
        &self,
        instrument: &Instrument,
        _last_qty: Quantity,
        _last_px: Price,
        _liquidity_side: LiquiditySide,
    ) -> Money {
        Money::new(self.amount, instrument.settlement_currency.clone())
    }
}

/// No commission at all.
#[derive(Debug, Clone, Default)]
pub struct ZeroCommission;

impl CommissionModel for ZeroCommission {
    fn commission(
        &self,
        instrument: &Instrument,
        _last_qty: Quantity,
        _last_px: Price,
        _liquidity_side: LiquiditySide,
    ) -> Money {
        Money::zero(instrument.settlement_currency.clone())
    }
}
