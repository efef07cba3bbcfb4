//!
//! Common types and utilities shared by the tape server and client.
//!
//! This crate aggregates:
//! - `error`: unified error type `TapeError` used across the workspace.
//! - `result`: handy `Result<T, TapeError>` alias.
//! - `tickers`: the `Symbol` type, symbol extraction from free text, the known
//!   ticker list and watchlist parsing.
//! - `update`: the `PriceUpdate` event published by the scheduler and streamed to tapes.
//! - `command`: subscription payloads exchanged between client and server.
//! - `net`: networking constants and small helpers.
#![warn(missing_docs)]
pub mod command;
pub mod error;
pub mod net;
pub mod result;
pub mod tickers;
pub mod update;

pub use command::Command;
pub use error::TapeError;
pub use result::Result;
pub use tickers::Symbol;
pub use update::PriceUpdate;
