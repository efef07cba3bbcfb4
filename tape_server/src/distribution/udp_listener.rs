use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use tape_common::net::{MAX_DATAGRAM, is_ping};

use super::ping_monitor::PingMonitor;

/// Reads keep-alive datagrams from tapes on the data socket.
pub struct UdpPingListener;

impl UdpPingListener {
    /// Spawns a thread that marks the sender of every `PING` datagram as alive.
    pub fn start(
        socket: Arc<UdpSocket>,
        ping_monitor: Arc<Mutex<PingMonitor>>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("ping-listener".to_string())
            .spawn(move || {
                let mut buf = [0u8; MAX_DATAGRAM];
                loop {
                    match socket.recv_from(&mut buf) {
                        Ok((size, addr)) if is_ping(&buf[..size]) => {
                            debug!("Received ping from {}", addr);
                            ping_monitor
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .update_ping(addr);
                        }
                        Ok((size, addr)) => {
                            debug!("Ignoring {} byte datagram from {}", size, addr)
                        }
                        // Windows reports ICMP port-unreachable for a departed tape here.
                        Err(e) => warn!("Ping socket receive error: {}", e),
                    }
                }
            })
    }
}
