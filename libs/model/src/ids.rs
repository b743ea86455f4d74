//! Identifier newtypes for exchange entities
//!
//! All identifiers are cheap string newtypes with transparent serde, so they
//! serialize as plain JSON strings. Venue-assigned identifiers are produced
//! by deterministic counters on the exchange side; nothing here touches a
//! clock or a random source.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            ///
            /// # Panics
            /// Panics if the value is empty.
            pub fn new(value: impl Into<String>) -> Self {
                let value = value.into();
                assert!(!value.is_empty(), concat!(stringify!($name), " must not be empty"));
                Self(value)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id!(
    /// Identifier for a trader (owner of strategies and orders).
    TraderId
);
string_id!(
    /// Identifier for a strategy within a trader.
    StrategyId
);
string_id!(
    /// Identifier for an execution client routing commands to a venue.
    ClientId
);
string_id!(
    /// Identifier for an account at a venue.
    AccountId
);
string_id!(
    /// A ticker symbol at a venue.
    Symbol
);
string_id!(
    /// A trading venue.
    Venue
);
string_id!(
    /// Trader-assigned order identifier, unique per trader.
    ClientOrderId
);
string_id!(
    /// Venue-assigned order identifier, available once accepted.
    VenueOrderId
);
string_id!(
    /// Identifier shared by the orders of an atomically submitted list.
    OrderListId
);
string_id!(
    /// Identifier for a position at a venue.
    PositionId
);
string_id!(
    /// Venue-assigned identifier for a single fill.
    TradeId
);

/// Instrument identifier: a symbol qualified by its venue.
///
/// Canonical string form is `"SYMBOL.VENUE"`, which is also the serde wire
/// form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrumentId {
    pub symbol: Symbol,
    pub venue: Venue,
}

impl InstrumentId {
    pub fn new(symbol: Symbol, venue: Venue) -> Self {
        Self { symbol, venue }
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.symbol, self.venue)
    }
}

impl FromStr for InstrumentId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Venues never contain '.', symbols may (e.g. "BTC.D"), so split on
        // the last dot.
        let (symbol, venue) = s.rsplit_once('.').ok_or(ValidationError::Invalid {
            field: "instrument_id",
            reason: "expected 'SYMBOL.VENUE'".to_string(),
        })?;
        if symbol.is_empty() || venue.is_empty() {
            return Err(ValidationError::Invalid {
                field: "instrument_id",
                reason: "expected 'SYMBOL.VENUE'".to_string(),
            });
        }
        Ok(Self::new(Symbol::new(symbol), Venue::new(venue)))
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        s.parse().expect("invalid instrument id")
    }
}

impl Serialize for InstrumentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for InstrumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
