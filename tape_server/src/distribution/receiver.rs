use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use tape_common::{Command, Result, TapeError};

/// Largest command a tape may send in one connection.
const MAX_COMMAND: usize = 4096;

/// TCP command receiver that accepts tape subscription requests.
///
/// Every accepted connection carries one JSON `Command`. Subscriptions are forwarded
/// together with the UDP address the tape wants its updates on. A connection that sends
/// anything else is logged and dropped; the receiver keeps serving other tapes.
pub struct CommandReceiver {
    socket: TcpListener,
}

impl CommandReceiver {
    /// Binds to `bind_addr` (e.g., `0.0.0.0:8080`).
    pub fn new(bind_addr: &str) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking accept loop. Returns only when the subscriber channel is closed.
    pub fn receive_loop_with_channel(self, tx: Sender<(Command, SocketAddr)>) -> Result<()> {
        info!("Command TCP server is started on {}", self.socket.local_addr()?);

        for stream in self.socket.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!("TCP connection error: {}", e);
                    continue;
                }
            };

            match read_subscription(stream) {
                Ok(Some(subscription)) => {
                    tx.send(subscription)
                        .map_err(|e| TapeError::ChannelSend(e.to_string()))?;
                }
                Ok(None) => {}
                Err(e) => warn!("Rejected command: {}", e),
            }
        }
        Ok(())
    }
}

/// Reads one command from `stream`. Non-subscription commands yield `None`.
fn read_subscription(mut stream: TcpStream) -> Result<Option<(Command, SocketAddr)>> {
    let peer = stream.peer_addr()?;
    debug!("Command connection from {}", peer);

    let mut buf = [0u8; MAX_COMMAND];
    let size = stream.read(&mut buf)?;
    let cmd = Command::from_json_bytes(&buf[..size])?;
    info!("Received command {:?}", cmd);

    if !cmd.is_subscription() {
        debug!("Ignoring {} command from {}", cmd.header, peer);
        return Ok(None);
    }

    let target = SocketAddr::new(peer.ip(), cmd.udp_port()?);
    Ok(Some((cmd, target)))
}
