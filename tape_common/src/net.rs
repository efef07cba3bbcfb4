//! Shared networking constants and helpers used by the tape server and client.
use std::time::Duration;

/// TCP port for the subscription channel (client -> server).
pub const COMMAND_PORT: u16 = 8080;
/// UDP port for price streaming and keep-alive pings (server <-> client).
pub const DATA_PORT: u16 = 8081;

/// Datagram a tape sends to keep its subscription alive.
pub const PING_PAYLOAD: &[u8] = b"PING";
/// How often a tape pings the server.
pub const PING_INTERVAL: Duration = Duration::from_secs(2);
/// Silence after which the server drops a tape's stream.
pub const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest JSON datagram either side expects to handle.
pub const MAX_DATAGRAM: usize = 2048;

/// Helper to format an address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}

/// Returns `true` when `datagram` is a keep-alive ping.
pub fn is_ping(datagram: &[u8]) -> bool {
    datagram.starts_with(PING_PAYLOAD)
}
