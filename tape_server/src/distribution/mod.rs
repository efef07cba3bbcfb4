//! Remote ticker-tape distribution.
//!
//! Streams published price updates to remote tapes over UDP:
//!
//! - `CommandReceiver` accepts one JSON `Command` per TCP connection on the command port
//!   and forwards subscriptions with the tape's UDP address.
//! - For each subscription a stream thread (`handle_client_stream`) reads its own
//!   `UpdatePublisher` subscription, filters by the requested symbols and sends JSON
//!   datagrams from the data socket.
//! - `UdpPingListener` records `PING` datagrams on the data socket in the `PingMonitor`;
//!   a checker thread stops the stream of any tape silent past the keep-alive timeout.
//!
//! A tape that subscribes again from the same address replaces its previous stream.

use std::collections::{HashMap, HashSet};
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, error, info};
use tape_common::net::{COMMAND_PORT, DATA_PORT, KEEP_ALIVE_TIMEOUT, addr};
use tape_common::{Command, Result, Symbol};

use crate::publisher::UpdatePublisher;

pub mod ping_monitor;
pub mod receiver;
pub mod stream;
pub mod udp_listener;

pub use ping_monitor::PingMonitor;
pub use receiver::CommandReceiver;
pub use stream::handle_client_stream;
pub use udp_listener::UdpPingListener;

const TIMEOUT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Where and how the distribution endpoints listen.
#[derive(Debug, Clone)]
pub struct DistributionConfig {
    pub bind_ip: String,
    pub command_port: u16,
    pub data_port: u16,
    pub keep_alive: Duration,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".to_string(),
            command_port: COMMAND_PORT,
            data_port: DATA_PORT,
            keep_alive: KEEP_ALIVE_TIMEOUT,
        }
    }
}

/// Binds the command and data sockets and starts the distribution threads.
///
/// Returns the dispatcher thread, which runs for the life of the process.
pub fn start(
    publisher: Arc<UpdatePublisher>,
    config: &DistributionConfig,
) -> Result<JoinHandle<()>> {
    let udp_socket = Arc::new(UdpSocket::bind(addr(&config.bind_ip, config.data_port))?);
    info!("UDP socket created on: {}", udp_socket.local_addr()?);

    let ping_monitor = Arc::new(Mutex::new(PingMonitor::new(config.keep_alive)));
    UdpPingListener::start(Arc::clone(&udp_socket), Arc::clone(&ping_monitor))?;

    let (timeout_tx, timeout_rx) = unbounded::<SocketAddr>();
    start_ping_monitor(Arc::clone(&ping_monitor), timeout_tx)?;

    let (cmd_tx, cmd_rx) = unbounded::<(Command, SocketAddr)>();
    let tcp_receiver = CommandReceiver::new(&addr(&config.bind_ip, config.command_port))?;
    thread::Builder::new()
        .name("command-receiver".to_string())
        .spawn(move || {
            if let Err(e) = tcp_receiver.receive_loop_with_channel(cmd_tx) {
                error!("Receiver loop failed: {}", e);
            }
        })?;

    let handle = thread::Builder::new()
        .name("tape-dispatch".to_string())
        .spawn(move || dispatch(publisher, udp_socket, ping_monitor, cmd_rx, timeout_rx))?;
    Ok(handle)
}

fn dispatch(
    publisher: Arc<UpdatePublisher>,
    udp_socket: Arc<UdpSocket>,
    ping_monitor: Arc<Mutex<PingMonitor>>,
    cmd_rx: Receiver<(Command, SocketAddr)>,
    timeout_rx: Receiver<SocketAddr>,
) {
    let mut active_streams: HashMap<SocketAddr, Sender<()>> = HashMap::new();

    loop {
        select! {
            recv(cmd_rx) -> msg => match msg {
                Ok((cmd, target)) => {
                    let (stop_tx, stop_rx) = unbounded::<()>();
                    let symbols: HashSet<Symbol> = cmd.symbols.into_iter().collect();
                    let data_rx = publisher.subscribe();
                    let socket = Arc::clone(&udp_socket);

                    let spawned = thread::Builder::new()
                        .name(format!("stream-{}", target))
                        .spawn(move || {
                            if let Err(e) =
                                handle_client_stream(socket, target, symbols, data_rx, stop_rx)
                            {
                                error!("Client stream error: {}", e);
                            }
                        });
                    if let Err(e) = spawned {
                        error!("Failed to start stream for {}: {}", target, e);
                        continue;
                    }

                    ping_monitor
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .update_ping(target);
                    if let Some(previous) = active_streams.insert(target, stop_tx) {
                        let _ = previous.send(());
                        debug!("Replaced existing stream for {}", target);
                    }
                    info!("Streaming to {} ({} active)", target, active_streams.len());
                }
                Err(_) => break,
            },
            recv(timeout_rx) -> msg => match msg {
                Ok(client_addr) => {
                    if let Some(stop_tx) = active_streams.remove(&client_addr) {
                        let _ = stop_tx.send(());
                        info!("Stream for {} closed: ping timeout", client_addr);
                    } else {
                        debug!("Ping timeout for {} without a stream", client_addr);
                    }
                }
                Err(_) => break,
            },
        }
    }
    info!("Tape dispatcher stopped");
}

fn start_ping_monitor(
    ping_monitor: Arc<Mutex<PingMonitor>>,
    timeout_tx: Sender<SocketAddr>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("ping-monitor".to_string())
        .spawn(move || {
            loop {
                thread::sleep(TIMEOUT_CHECK_INTERVAL);
                let timed_out = ping_monitor
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .check_timeouts();
                for client_addr in timed_out {
                    if timeout_tx.send(client_addr).is_err() {
                        return;
                    }
                }
            }
        })
}
