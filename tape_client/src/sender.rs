//! Sending commands to the tape server.
//!
//! The subscription goes over TCP as one JSON `Command`; keep-alive pings go over UDP
//! from the same socket the updates arrive on, so the server can match them to the stream.
use std::io::{ErrorKind, Write};
use std::net::{TcpStream, UdpSocket};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use tape_common::net::{PING_INTERVAL, PING_PAYLOAD};
use tape_common::{Command, Result};

/// Helper type for sending commands to the server.
pub struct CommandSender;

impl CommandSender {
    pub fn send_command(stream: &mut TcpStream, command: &Command) -> Result<()> {
        let symbols: Vec<&str> = command.symbols.iter().map(|s| s.as_str()).collect();
        info!(
            "Sending command: STREAM udp://{}:{} {}",
            command.address,
            command.port,
            if symbols.is_empty() {
                "*".to_string()
            } else {
                symbols.join(",")
            }
        );
        stream.write_all(&command.to_json_bytes()?)?;
        Ok(())
    }

    /// Pings `target_addr` from `socket` every `PING_INTERVAL` until `shutdown` is set.
    pub fn start_ping_thread(
        socket: Arc<UdpSocket>,
        target_addr: String,
        shutdown: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        info!("Ping thread started. Target: {}", target_addr);
        thread::Builder::new()
            .name("ping".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    match socket.send_to(PING_PAYLOAD, &target_addr) {
                        Ok(_) => debug!("PING sent to {}", target_addr),
                        Err(ref e) if e.kind() == ErrorKind::ConnectionReset => {}
                        Err(e) => error!("Failed to send PING: {}", e),
                    }
                    thread::sleep(PING_INTERVAL);
                }
                info!("Ping thread stopping...");
            })
    }
}
