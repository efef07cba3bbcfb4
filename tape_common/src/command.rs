//! Shared protocol command type used by the tape client and server.
//!
//! A `Command` can either be a subscription request (`J_QUOTE`) with the symbols a
//! tape wants to see, or a keep-alive `PING` message. Commands travel as JSON over
//! the TCP command port.
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::TapeError;
use crate::tickers::Symbol;

/// Header value for subscription commands.
pub const HEADER: &str = "J_QUOTE";
/// Header value for keep-alive pings.
pub const PING: &str = "PING";
/// Transport kind (currently UDP).
pub const CONNECTION: &str = "udp";

/// Command payload sent from a tape to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command kind. Either `J_QUOTE` or `PING`.
    pub header: String,
    /// Transport protocol name (e.g., `udp`).
    pub connection: String,
    /// IP address the tape listens on.
    pub address: String,
    /// UDP port the tape listens on, as a string.
    pub port: String,
    /// Symbols to stream. Empty means every tracked symbol.
    #[serde(default)]
    pub symbols: Vec<Symbol>,
}

impl Command {
    /// Creates a new subscription (`J_QUOTE`) command.
    pub fn new(address: &str, port: &str, symbols: Vec<Symbol>) -> Self {
        Command {
            header: String::from(HEADER),
            connection: String::from(CONNECTION),
            address: String::from(address),
            port: String::from(port),
            symbols,
        }
    }

    /// Creates a new keep-alive `PING` command.
    pub fn new_ping(address: &str, port: &str) -> Self {
        Command {
            header: String::from(PING),
            connection: String::from(CONNECTION),
            address: String::from(address),
            port: String::from(port),
            symbols: Vec::new(),
        }
    }

    /// Whether this is a subscription request.
    pub fn is_subscription(&self) -> bool {
        self.header == HEADER
    }

    /// Parses the UDP port field.
    pub fn udp_port(&self) -> Result<u16, TapeError> {
        self.port
            .trim()
            .parse()
            .map_err(|e| TapeError::Format(format!("Invalid UDP port `{}`: {}", self.port, e)))
    }

    /// Build UDP socket address from the fields.
    pub fn get_udp_addr(&self) -> Result<SocketAddr, TapeError> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| TapeError::Format(format!("Invalid UDP address: {}", e)))
    }

    /// Encode to JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, TapeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, TapeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
