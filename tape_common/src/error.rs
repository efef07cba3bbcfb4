//! Error types shared between the tape server and client.
//!
//! The `TapeError` enum unifies common failure cases for I/O, serialization,
//! channel communication, symbol validation and oracle lookups, allowing crates to
//! propagate a single error type.
use std::io;
use std::string::FromUtf8Error;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by server and client.
#[derive(Error, Debug)]
pub enum TapeError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// UTF-8 conversion error when handling text content.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] FromUtf8Error),

    /// A string could not be turned into a ticker `Symbol`.
    #[error("Invalid symbol `{input}`: {reason}")]
    InvalidSymbol {
        /// The rejected input, as received.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Error while parsing a watchlist file into `Symbol` values.
    #[error("Parse watchlist error: {0}")]
    ParseWatchlist(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// The price-lookup capability reported an error for a symbol.
    #[error("Oracle lookup for {symbol} failed: {message}")]
    Oracle {
        /// Symbol the lookup was issued for.
        symbol: String,
        /// Oracle-provided description.
        message: String,
    },

    /// Crossbeam/channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Crossbeam/channel receive failed (e.g., sender closed); contains a short context string.
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),
}

impl TapeError {
    /// Builds an `Oracle` error for `symbol`.
    pub fn oracle(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        TapeError::Oracle {
            symbol: symbol.into(),
            message: message.into(),
        }
    }
}

impl<T> From<PoisonError<T>> for TapeError {
    fn from(err: PoisonError<T>) -> Self {
        TapeError::MutexLock(err.to_string())
    }
}
