//! Ticker tape rendering.
//!
//! Keeps the last price shown for each symbol and classifies every incoming update
//! against it. Nothing here feeds back to the server.
use std::collections::HashMap;
use std::fmt;

use chrono::DateTime;
use tape_common::{PriceUpdate, Symbol};

/// Direction of an update relative to the previously shown price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    New,
    Up,
    Down,
    Unchanged,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self {
            Change::New => "*",
            Change::Up => "+",
            Change::Down => "-",
            Change::Unchanged => "=",
        };
        f.write_str(marker)
    }
}

/// Last displayed price per symbol.
#[derive(Debug, Default)]
pub struct TapeDisplay {
    shown: HashMap<Symbol, f64>,
}

impl TapeDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `update` as shown and reports how it moved.
    pub fn apply(&mut self, update: &PriceUpdate) -> Change {
        let previous = self.shown.insert(update.symbol.clone(), update.price);
        match previous {
            None => Change::New,
            Some(p) if update.price > p => Change::Up,
            Some(p) if update.price < p => Change::Down,
            Some(_) => Change::Unchanged,
        }
    }

    /// Classifies `update` and formats it as one tape line.
    pub fn render(&mut self, update: &PriceUpdate) -> String {
        let change = self.apply(update);
        let time = i64::try_from(update.timestamp)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());
        format!(
            "{} {:<5} {:>10.2} {}",
            change,
            update.symbol.as_str(),
            update.price,
            time
        )
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }
}
