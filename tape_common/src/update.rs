//! Price update event and JSON encoding helpers.
//!
//! A `PriceUpdate` is what the scheduler publishes after every successful lookup and
//! what remote tapes receive over UDP: the symbol, the validated price and a
//! millisecond UTC timestamp.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::TapeError;
use crate::tickers::Symbol;

/// One observed price for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// Symbol the price belongs to.
    pub symbol: Symbol,
    /// Last observed price, always positive.
    pub price: f64,
    /// UTC timestamp in milliseconds since Unix epoch.
    pub timestamp: u64,
}

impl PriceUpdate {
    /// Stamps a new update with the current time.
    pub fn now(symbol: Symbol, price: f64) -> Self {
        Self {
            symbol,
            price,
            timestamp: Utc::now().timestamp_millis().max(0) as u64,
        }
    }

    /// Encode the update to JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, TapeError> {
        let json = serde_json::to_vec(self)?;
        Ok(json)
    }

    /// Decode an update from JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, TapeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
