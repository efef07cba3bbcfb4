//! Result type alias shared across the workspace.
//!
//! This module defines a convenient alias that defaults the error type to the
//! common `TapeError`, so functions can simply return `Result<T>`.
use crate::error::TapeError;

/// Workspace-wide `Result` alias with `TapeError` as the default error.
pub type Result<T, E = TapeError> = std::result::Result<T, E>;
