//! Account and position bookkeeping driven by fills
//!
//! Every `OrderFilled` flows through here exactly once: positions open,
//! flip or close, realized PnL and commissions settle onto the account, and
//! margin is re-synced against the new exposure. A frozen account keeps
//! tracking positions but refuses the balance legs.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use model::account::{Account, AccountType, OmsType};
use model::events::OrderFilled;
use model::ids::{InstrumentId, PositionId};
use model::instrument::Instrument;
use model::money::Money;
use model::position::Position;

/// Applies fills to the venue account and its positions.
#[derive(Debug)]
pub struct AccountingEngine {
    pub account: Account,
    oms_type: OmsType,
    positions: BTreeMap<PositionId, Position>,
    /// Margin currently locked per position.
    locked_margin: BTreeMap<PositionId, Decimal>,
}

impl AccountingEngine {
    pub fn new(account: Account, oms_type: OmsType) -> Self {
        Self {
            account,
            oms_type,
            positions: BTreeMap::new(),
            locked_margin: BTreeMap::new(),
        }
    }

    pub fn oms_type(&self) -> OmsType {
        self.oms_type
    }

    pub fn position(&self, id: &PositionId) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.values().filter(|p| p.is_open()).collect()
    }

    /// Net signed quantity across this instrument's positions.
    pub fn net_position(&self, instrument_id: &InstrumentId) -> Decimal {
        self.positions
            .values()
            .filter(|p| &p.instrument_id == instrument_id)
            .map(|p| p.signed_qty)
            .sum()
    }

    /// Apply one fill: position lifecycle, PnL/commission settlement and
    /// margin sync. Returns the position ids that went flat on this fill.
    pub fn apply_fill(&mut self, fill: &OrderFilled, instrument: &Instrument) -> Vec<PositionId> {
        let position_id = fill
            .venue_position_id
            .clone()
            .expect("venue resolves a position id before filling");

        let realized_before = self
            .positions
            .get(&position_id)
            .map(|p| p.realized_pnl.amount())
            .unwrap_or(Decimal::ZERO);

        if let Some(position) = self.positions.get_mut(&position_id) {
            position.apply(fill);
        } else {
            let position = Position::new(position_id.clone(), instrument, fill);
            self.positions.insert(position_id.clone(), position);
        }
        let position = &self.positions[&position_id];
        let realized_after = position.realized_pnl.amount();
        let went_flat = position.is_closed();
        let settlement = position.settlement_currency.clone();
        let exposure_notional =
            position.quantity() * position.avg_px_open * instrument.multiplier;

        // Settlement: realized PnL delta already folds the commission in.
        let delta = realized_after - realized_before;
        if !delta.is_zero() {
            if let Err(error) = self.account.adjust(Money::new(delta, settlement.clone())) {
                warn!(%error, position_id = %position_id, "balance adjustment refused");
            }
        }

        if self.account.account_type == AccountType::Margin {
            self.sync_margin(&position_id, exposure_notional, &fill.instrument_id, settlement);
        }

        if went_flat {
            debug!(position_id = %position_id, "position closed");
            vec![position_id]
        } else {
            Vec::new()
        }
    }

    /// Re-target locked margin to `notional / leverage` for the position.
    fn sync_margin(
        &mut self,
        position_id: &PositionId,
        exposure_notional: Decimal,
        instrument_id: &InstrumentId,
        settlement: model::currency::Currency,
    ) {
        let leverage = self.account.leverage(instrument_id);
        let target = if leverage.is_zero() {
            exposure_notional
        } else {
            exposure_notional / leverage
        };
        let current = self
            .locked_margin
            .get(position_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let result = if target > current {
            self.account
                .lock_margin(Money::new(target - current, settlement))
        } else {
            self.account
                .release_margin(Money::new(current - target, settlement))
        };
        match result {
            Ok(()) => {
                if target.is_zero() {
                    self.locked_margin.remove(position_id);
                } else {
                    self.locked_margin.insert(position_id.clone(), target);
                }
            }
            Err(error) => warn!(%error, position_id = %position_id, "margin sync refused"),
        }
    }

    /// Clear positions and margin locks (exchange reset). The account is
    /// replaced by the caller.
    pub fn reset(&mut self, account: Account) {
        self.account = account;
        self.positions.clear();
        self.locked_margin.clear();
    }
}
