//! Accounts and balances
//!
//! One account per simulated venue, holding per-currency balances and
//! per-instrument leverage. Invariant on every balance: `total = locked +
//! free`. A frozen account still tracks positions but refuses any balance
//! change.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::currency::Currency;
use crate::errors::ExchangeError;
use crate::ids::{AccountId, InstrumentId};
use crate::money::Money;

/// Cash or margin account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Cash,
    Margin,
}

/// How the venue books positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OmsType {
    /// One net position per instrument.
    Netting,
    /// A fresh position per order.
    Hedging,
}

/// Balance of a single currency.
///
/// Invariant: `total = locked + free`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub currency: Currency,
    pub total: Decimal,
    pub locked: Decimal,
    pub free: Decimal,
}

impl AccountBalance {
    pub fn new(currency: Currency, total: Decimal) -> Self {
        Self {
            currency,
            total,
            locked: Decimal::ZERO,
            free: total,
        }
    }

    pub fn check_invariant(&self) -> bool {
        self.total == self.locked + self.free
    }

    /// Move funds from free to locked.
    ///
    /// # Panics
    /// Panics if the amount exceeds the free balance.
    pub fn lock(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "lock amount must be non-negative");
        assert!(amount <= self.free, "insufficient free balance");
        self.free -= amount;
        self.locked += amount;
        debug_assert!(self.check_invariant());
    }

    /// Move funds from locked back to free.
    pub fn unlock(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "unlock amount must be non-negative");
        assert!(amount <= self.locked, "insufficient locked balance");
        self.locked -= amount;
        self.free += amount;
        debug_assert!(self.check_invariant());
    }

    /// Adjust total and free by a signed amount.
    pub fn adjust(&mut self, amount: Decimal) {
        self.total += amount;
        self.free += amount;
        debug_assert!(self.check_invariant());
    }
}

/// A trading account at the simulated venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub account_type: AccountType,
    /// Single-currency accounts report everything in this currency.
    pub base_currency: Option<Currency>,
    pub balances: BTreeMap<String, AccountBalance>,
    /// Per-instrument leverage overrides (canonical instrument id string).
    pub leverages: BTreeMap<String, Decimal>,
    pub default_leverage: Decimal,
    pub is_frozen: bool,
}

impl Account {
    pub fn new(id: AccountId, account_type: AccountType, base_currency: Option<Currency>) -> Self {
        Self {
            id,
            account_type,
            base_currency,
            balances: BTreeMap::new(),
            leverages: BTreeMap::new(),
            default_leverage: Decimal::ONE,
            is_frozen: false,
        }
    }

    pub fn balance(&self, code: &str) -> Option<&AccountBalance> {
        self.balances.get(code)
    }

    /// Leverage applied to an instrument.
    pub fn leverage(&self, instrument_id: &InstrumentId) -> Decimal {
        self.leverages
            .get(&instrument_id.to_string())
            .copied()
            .unwrap_or(self.default_leverage)
    }

    pub fn set_leverage(&mut self, instrument_id: &InstrumentId, leverage: Decimal) {
        assert!(leverage > Decimal::ZERO, "leverage must be positive");
        self.leverages
            .insert(instrument_id.to_string(), leverage);
    }

    /// Seed a starting balance, replacing any existing entry.
    pub fn deposit(&mut self, money: Money) {
        let currency = money.currency().clone();
        self.balances.insert(
            currency.code.clone(),
            AccountBalance::new(currency, money.amount()),
        );
    }

    /// Apply a signed adjustment, creating the balance if absent.
    ///
    /// Frozen accounts refuse all balance changes.
    pub fn adjust(&mut self, money: Money) -> Result<(), ExchangeError> {
        if self.is_frozen {
            return Err(ExchangeError::AccountFrozen);
        }
        let currency = money.currency().clone();
        let balance = self
            .balances
            .entry(currency.code.clone())
            .or_insert_with(|| AccountBalance::new(currency, Decimal::ZERO));
        balance.adjust(money.amount());
        Ok(())
    }

    /// Lock margin for an open position.
    pub fn lock_margin(&mut self, money: Money) -> Result<(), ExchangeError> {
        if self.is_frozen {
            return Err(ExchangeError::AccountFrozen);
        }
        let currency = money.currency().clone();
        let balance = self
            .balances
            .entry(currency.code.clone())
            .or_insert_with(|| AccountBalance::new(currency, Decimal::ZERO));
        // Margin may exceed free balance in a backtest; clamp so the
        // invariant holds instead of failing a fill that already happened.
        let amount = money.amount().min(balance.free);
        balance.lock(amount);
        Ok(())
    }

    /// Release previously locked margin.
    pub fn release_margin(&mut self, money: Money) -> Result<(), ExchangeError> {
        if self.is_frozen {
            return Err(ExchangeError::AccountFrozen);
        }
        if let Some(balance) = self.balances.get_mut(&money.currency().code) {
            let amount = money.amount().min(balance.locked);
            balance.unlock(amount);
        }
        Ok(())
    }
}
