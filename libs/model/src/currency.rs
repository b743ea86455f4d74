//! Currency definitions and the explicit currency registry
//!
//! The registry is a plain value owned by the exchange (or whatever composes
//! it) — never a process-wide global. Unknown codes resolve to a precision-8
//! crypto currency so exotic pairs degrade gracefully instead of failing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::numeric::MAX_PRECISION;

/// Broad classification of a currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurrencyKind {
    Fiat,
    Crypto,
    CommodityBacked,
}

/// A currency with its settlement precision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    /// Ticker code, e.g. "USD" or "BTC".
    pub code: String,
    /// Settlement precision (0..=9).
    pub precision: u8,
    /// ISO 4217 numeric code, 0 for non-ISO currencies.
    pub iso4217: u16,
    /// Human-readable name.
    pub name: String,
    pub kind: CurrencyKind,
}

impl Currency {
    /// Define a new currency.
    ///
    /// # Panics
    /// Panics if `precision` exceeds the fixed-point maximum.
    pub fn new(
        code: impl Into<String>,
        precision: u8,
        iso4217: u16,
        name: impl Into<String>,
        kind: CurrencyKind,
    ) -> Self {
        assert!(precision <= MAX_PRECISION, "precision exceeds maximum");
        Self {
            code: code.into(),
            precision,
            iso4217,
            name: name.into(),
            kind,
        }
    }

    /// Look up a built-in currency by code.
    pub fn from_code(code: &str) -> Option<Self> {
        builtin(code)
    }

    /// The fallback definition for an unknown code: precision 8, crypto.
    pub fn default_for(code: &str) -> Self {
        Self::new(code, 8, 0, code, CurrencyKind::Crypto)
    }
}

fn builtin(code: &str) -> Option<Currency> {
    let c = match code {
        "USD" => Currency::new("USD", 2, 840, "United States dollar", CurrencyKind::Fiat),
        "EUR" => Currency::new("EUR", 2, 978, "Euro", CurrencyKind::Fiat),
        "GBP" => Currency::new("GBP", 2, 826, "British pound", CurrencyKind::Fiat),
        "JPY" => Currency::new("JPY", 0, 392, "Japanese yen", CurrencyKind::Fiat),
        "AUD" => Currency::new("AUD", 2, 36, "Australian dollar", CurrencyKind::Fiat),
        "CHF" => Currency::new("CHF", 2, 756, "Swiss franc", CurrencyKind::Fiat),
        "BTC" => Currency::new("BTC", 8, 0, "Bitcoin", CurrencyKind::Crypto),
        "ETH" => Currency::new("ETH", 8, 0, "Ether", CurrencyKind::Crypto),
        "USDT" => Currency::new("USDT", 8, 0, "Tether", CurrencyKind::Crypto),
        "USDC" => Currency::new("USDC", 8, 0, "USD Coin", CurrencyKind::Crypto),
        "XAU" => Currency::new("XAU", 4, 959, "Gold (troy ounce)", CurrencyKind::CommodityBacked),
        _ => return None,
    };
    Some(c)
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Mutable code → currency map with the built-in table behind it.
#[derive(Debug, Clone, Default)]
pub struct CurrencyRegistry {
    registered: BTreeMap<String, Currency>,
}

impl CurrencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a currency definition.
    pub fn register(&mut self, currency: Currency) {
        self.registered.insert(currency.code.clone(), currency);
    }

    /// Resolve a code: registered entries first, then built-ins.
    pub fn get(&self, code: &str) -> Option<Currency> {
        self.registered
            .get(code)
            .cloned()
            .or_else(|| builtin(code))
    }

    /// Resolve a code, falling back to precision 8 / crypto for unknowns.
    pub fn get_or_default(&self, code: &str) -> Currency {
        self.get(code).unwrap_or_else(|| Currency::default_for(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let usd = Currency::from_code("USD").unwrap();
        assert_eq!(usd.precision, 2);
        assert_eq!(usd.iso4217, 840);
        assert_eq!(usd.kind, CurrencyKind::Fiat);

        assert_eq!(Currency::from_code("JPY").unwrap().precision, 0);
        assert!(Currency::from_code("DOGE").is_none());
    }

    #[test]
    fn test_registry_fallback() {
        let registry = CurrencyRegistry::new();
        let unknown = registry.get_or_default("DOGE");
        assert_eq!(unknown.code, "DOGE");
        assert_eq!(unknown.precision, 8);
        assert_eq!(unknown.kind, CurrencyKind::Crypto);
    }

    #[test]
    fn test_registry_override_wins() {
        let mut registry = CurrencyRegistry::new();
        registry.register(Currency::new("USD", 4, 840, "US dollar (4dp)", CurrencyKind::Fiat));
        assert_eq!(registry.get("USD").unwrap().precision, 4);
    }

    #[test]
    fn test_currency_serde_round_trip() {
        let btc = Currency::from_code("BTC").unwrap();
        let json = serde_json::to_string(&btc).unwrap();
        let back: Currency = serde_json::from_str(&json).unwrap();
        assert_eq!(btc, back);
        assert!(json.contains("\"CRYPTO\""));
    }
}
