//! Simulated price oracle.
//!
//! Answers like a chatty quote service: known tickers get a sentence with a dollar
//! amount that follows a small random walk between lookups, unknown tickers get an
//! apology with no number in it. Optional latency and failure rate make it useful for
//! exercising the scheduler's pacing and failure paths.

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tape_common::{Result, Symbol, TapeError};

use super::PriceOracle;

/// Random-walk oracle for the well-known ticker list.
#[derive(Debug, Default)]
pub struct SimulatedOracle {
    prices: Mutex<HashMap<Symbol, f64>>,
    latency: Duration,
    failure_rate: f64,
}

impl SimulatedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Probability in `[0, 1]` that a lookup errors out.
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    /// Seeds the price a known symbol starts its walk from.
    pub fn with_price(self, symbol: Symbol, price: f64) -> Self {
        self.prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol, price);
        self
    }

    /// Calculate the next price using a small random walk around `current_price`.
    ///
    /// The change is sampled uniformly from `[-1%, +1%]` and the result is clamped to a
    /// minimum positive value.
    pub fn next_price(current_price: f64) -> f64 {
        let mut rng = rand::rng();
        let change: f64 = rng.random_range(-0.01..0.01);
        let new_price = current_price * (1.0 + change);
        new_price.max(0.01)
    }
}

impl PriceOracle for SimulatedOracle {
    fn lookup(&self, symbol: &Symbol) -> Result<String> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let mut rng = rand::rng();
        if self.failure_rate > 0.0 && rng.random_bool(self.failure_rate) {
            return Err(TapeError::oracle(symbol.as_str(), "simulated outage"));
        }

        if !symbol.is_known() {
            return Ok(format!(
                "Sorry, I couldn't find a current price for {}.",
                symbol
            ));
        }

        let mut prices = self.prices.lock()?;
        let price = match prices.get(symbol) {
            Some(current) => Self::next_price(*current),
            None => rng.random_range(20.0..500.0),
        };
        prices.insert(symbol.clone(), price);

        Ok(format!("{} is currently trading at ${:.2} per share.", symbol, price))
    }
}
