//! Price oracle client.
//!
//! The oracle is the external price-lookup capability: given one symbol it eventually
//! answers with free-form text that should contain a price. `PriceClient` wraps an oracle,
//! bounds each lookup with a timeout and turns the text into a validated positive price.
//! Every failure comes back as a `LookupFailure` value; nothing here ends the process.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use tape_common::{Result, Symbol};
use thiserror::Error;

pub mod http;
pub mod simulated;

pub use http::HttpOracle;
pub use simulated::SimulatedOracle;

static CURRENCY_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(-)?\s*[$€£¥]\s*(-)?(\d[\d,]*(?:\.\d+)?|\.\d+)").expect("currency pattern is valid")
});
static PLAIN_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-)?(\d[\d,]*(?:\.\d+)?|\.\d+)").expect("number pattern is valid"));

/// External price-lookup capability.
pub trait PriceOracle: Send + Sync {
    /// Looks up `symbol` and returns the oracle's raw answer.
    fn lookup(&self, symbol: &Symbol) -> Result<String>;
}

/// Why a lookup did not produce a price.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupFailure {
    /// The oracle itself reported an error.
    #[error("oracle error: {0}")]
    Oracle(String),
    /// The answer held no number.
    #[error("no price in oracle answer {0:?}")]
    Unparseable(String),
    /// The answer held a number that is not a usable price.
    #[error("non-positive price {0}")]
    NonPositive(f64),
    /// The oracle did not answer in time.
    #[error("lookup timed out after {0:?}")]
    TimedOut(Duration),
    /// The lookup worker went away without answering.
    #[error("lookup worker disconnected")]
    Disconnected,
    /// A price arrived for a symbol that is no longer tracked.
    #[error("symbol is no longer tracked")]
    Untracked,
}

/// Oracle wrapper that validates answers and enforces a timeout.
#[derive(Clone)]
pub struct PriceClient {
    oracle: Arc<dyn PriceOracle>,
    timeout: Duration,
}

impl PriceClient {
    pub fn new(oracle: Arc<dyn PriceOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Asks the oracle for `symbol` and validates the answer.
    ///
    /// The oracle runs on its own worker thread; if it does not answer within the
    /// timeout the result is abandoned and `LookupFailure::TimedOut` is returned.
    pub fn fetch_price(&self, symbol: &Symbol) -> std::result::Result<f64, LookupFailure> {
        let (tx, rx) = bounded(1);
        let oracle = Arc::clone(&self.oracle);
        let requested = symbol.clone();

        thread::Builder::new()
            .name(format!("lookup-{}", symbol))
            .spawn(move || {
                let _ = tx.send(oracle.lookup(&requested));
            })
            .map_err(|e| LookupFailure::Oracle(format!("failed to start lookup: {}", e)))?;

        let text = match rx.recv_timeout(self.timeout) {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(LookupFailure::Oracle(e.to_string())),
            Err(RecvTimeoutError::Timeout) => return Err(LookupFailure::TimedOut(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => return Err(LookupFailure::Disconnected),
        };

        debug!("Oracle answer for {}: {:?}", symbol, text);
        validate_price(&text)
    }
}

/// Extracts a positive price from free-form oracle text.
///
/// An amount written with a currency sign wins over any other number in the text;
/// otherwise the first number is used. Thousands separators are ignored.
pub fn validate_price(text: &str) -> std::result::Result<f64, LookupFailure> {
    let caps = CURRENCY_AMOUNT
        .captures(text)
        .map(|c| (c.get(1).is_some() || c.get(2).is_some(), c.get(3)))
        .or_else(|| PLAIN_NUMBER.captures(text).map(|c| (c.get(1).is_some(), c.get(2))));

    let (negative, digits) = match caps {
        Some((negative, Some(digits))) => (negative, digits.as_str()),
        _ => return Err(LookupFailure::Unparseable(text.trim().to_string())),
    };

    let value: f64 = digits
        .replace(',', "")
        .parse()
        .map_err(|_| LookupFailure::Unparseable(text.trim().to_string()))?;
    let value = if negative { -value } else { value };

    if !value.is_finite() || value <= 0.0 {
        return Err(LookupFailure::NonPositive(value));
    }
    Ok(value)
}

/// `validate_price` without the failure detail.
pub fn parse_price(text: &str) -> Option<f64> {
    validate_price(text).ok()
}
