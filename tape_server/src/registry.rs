//! Tracked symbol registry.
//!
//! Owns the set of symbols the tape is watching and the last price seen for each.
//! A symbol enters the registry as *pending* (no price) the moment tracking begins and
//! stays until its first lookup fails; once it has a price it is never removed by a
//! failed refresh, the price just goes stale.
//!
//! The registry is not synchronized; the scheduler shares it as `Arc<Mutex<_>>`.

use std::collections::HashMap;

use log::{debug, warn};
use tape_common::Symbol;

/// Bookkeeping for a tracked symbol. `None` marks a first lookup still in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TrackedSymbol {
    last_price: Option<f64>,
}

/// Symbols being watched and their last known price.
#[derive(Debug, Default)]
pub struct TickerRegistry {
    symbols: HashMap<Symbol, TrackedSymbol>,
}

impl TickerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, symbol: &Symbol) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Starts tracking `symbol` as pending.
    ///
    /// Returns `false` when it is already tracked; the caller issues the first lookup
    /// only on `true`.
    pub fn begin_tracking(&mut self, symbol: &Symbol) -> bool {
        if self.has(symbol) {
            return false;
        }
        self.symbols
            .insert(symbol.clone(), TrackedSymbol { last_price: None });
        debug!("Tracking {}", symbol);
        true
    }

    /// Records `price` as the latest value for `symbol`.
    ///
    /// Returns `false` (and logs) when the symbol is no longer tracked.
    pub fn record_price(&mut self, symbol: &Symbol, price: f64) -> bool {
        match self.symbols.get_mut(symbol) {
            Some(entry) => {
                entry.last_price = Some(price);
                true
            }
            None => {
                warn!("Dropping price {:.2} for untracked symbol {}", price, symbol);
                false
            }
        }
    }

    /// Removes `symbol` only if it never received a price. Returns whether it was removed.
    pub fn drop_if_never_resolved(&mut self, symbol: &Symbol) -> bool {
        match self.symbols.get(symbol) {
            Some(TrackedSymbol { last_price: None }) => {
                self.symbols.remove(symbol);
                debug!("Stopped tracking {}: first lookup failed", symbol);
                true
            }
            _ => false,
        }
    }

    /// Current membership, pending symbols included. Order is unspecified.
    pub fn snapshot_keys(&self) -> Vec<Symbol> {
        self.symbols.keys().cloned().collect()
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<f64> {
        self.symbols.get(symbol).and_then(|entry| entry.last_price)
    }

    /// Priced symbols sorted by symbol. Pending entries are left out.
    pub fn prices(&self) -> Vec<(Symbol, f64)> {
        let mut prices: Vec<(Symbol, f64)> = self
            .symbols
            .iter()
            .filter_map(|(symbol, entry)| entry.last_price.map(|p| (symbol.clone(), p)))
            .collect();
        prices.sort_by(|a, b| a.0.cmp(&b.0));
        prices
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
