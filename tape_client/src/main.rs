//! Tape Client: a UDP ticker tape fed by the tape server.
//!
//! Sends one `J_QUOTE` subscription to the server over TCP, keeps it alive with periodic
//! `PING`s and prints every received price with its direction against the last one shown.
//!
//! Usage example (CLI):
//! ```bash
//! tape_client --server-ip 192.168.0.10 --listen-port 55555 --path ./tickers.txt
//! ```
//!
//! The symbol file should contain symbols separated by commas, spaces, or new lines.
//! Without `--path` every tracked symbol is streamed.
#![warn(missing_docs)]
mod args;
mod sender;
mod tape;

use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::net::{TcpStream, UdpSocket};
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn};
use tape_common::net::{COMMAND_PORT, DATA_PORT, MAX_DATAGRAM, addr};
use tape_common::tickers::WatchlistParser;
use tape_common::{Command, PriceUpdate, Result, Symbol, TapeError};

use crate::args::Args;
use crate::sender::CommandSender;
use crate::tape::TapeDisplay;

/// Receives `PriceUpdate`s from `socket` and prints them as tape lines until `shutdown`.
fn start_receiver_loop(socket: Arc<UdpSocket>, shutdown: Arc<AtomicBool>) -> Result<()> {
    info!("Tape receiver running on: {}", socket.local_addr()?);
    let mut buf = [0u8; MAX_DATAGRAM];
    let mut tape = TapeDisplay::new();

    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(size) => match PriceUpdate::from_json_bytes(&buf[..size]) {
                Ok(update) => info!("TAPE: {}", tape.render(&update)),
                Err(_) => debug!(
                    "Received non-JSON message: {}",
                    String::from_utf8_lossy(&buf[..size])
                ),
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                error!("Receive data error: {}", e);
                return Err(e.into());
            }
        }
    }
    info!("Receiver loop stopping after {} symbol(s)...", tape.len());
    Ok(())
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down client...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| TapeError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;
    }

    let server_ip = args.server_ip.trim().replace('"', "");
    let listen_port = args.listen_port.trim().replace('"', "");

    let server_command_address = addr(&server_ip, COMMAND_PORT);
    let server_udp_address = addr(&server_ip, DATA_PORT);
    let mut listen_address = addr("0.0.0.0", 0);
    match listen_port.parse::<u16>() {
        Ok(DATA_PORT) => warn!(
            "--listen-port={} matches the server DATA_PORT. A free local port will be selected.",
            listen_port
        ),
        Ok(port) => listen_address = addr("0.0.0.0", port),
        Err(e) => {
            return Err(TapeError::Format(format!(
                "Invalid --listen-port `{}`: {}",
                listen_port, e
            )));
        }
    }

    let symbols = match &args.path {
        Some(raw) => read_watchlist(&normalize_path(raw))?,
        None => Vec::new(),
    };
    if symbols.is_empty() {
        info!("Symbols: all");
    } else {
        info!("Symbols: {:?}", symbols);
    }

    let client_udp_socket = Arc::new(UdpSocket::bind(&listen_address)?);
    client_udp_socket.set_read_timeout(Some(Duration::from_secs(5)))?;
    let client_local_addr = client_udp_socket.local_addr()?;
    info!("UDP client listening on: {}", client_local_addr);

    info!("Connecting to TCP server at {}", server_command_address);
    let mut tcp_stream = TcpStream::connect(&server_command_address)
        .map_err(|e| TapeError::Format(format!("Failed to connect to server: {}", e)))?;

    let command = Command::new(
        &client_local_addr.ip().to_string(),
        &client_local_addr.port().to_string(),
        symbols,
    );
    CommandSender::send_command(&mut tcp_stream, &command)?;
    info!("Subscription sent to server {}.", server_command_address);

    CommandSender::start_ping_thread(
        Arc::clone(&client_udp_socket),
        server_udp_address,
        Arc::clone(&shutdown),
    )?;

    info!("Client is running. Press Ctrl+C to exit.");
    start_receiver_loop(client_udp_socket, shutdown)
}

fn read_watchlist(path: &PathBuf) -> Result<Vec<Symbol>> {
    if !is_file_exist(path) {
        return Err(TapeError::ParseWatchlist(format!(
            "{} is not a file",
            path.display()
        )));
    }
    let file = File::open(path)?;
    Symbol::parse_from_file(BufReader::new(file))
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
///
/// This allows passing Windows paths in quotes without breaking parsing.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}

/// Returns `true` if the provided path exists and is a regular file.
fn is_file_exist(path: &PathBuf) -> bool {
    path.exists() && path.is_file()
}
