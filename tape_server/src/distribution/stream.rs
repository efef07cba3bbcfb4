use std::collections::HashSet;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crossbeam_channel::{Receiver, select};
use log::{debug, error};
use tape_common::{Result, Symbol, TapeError};

use crate::publisher::UpdateEvent;

/// Stream task for a single tape.
///
/// Forwards every published update whose symbol is in `symbols` (or every update when
/// `symbols` is empty) to `target_addr` as a JSON datagram. Ends on a `stop_rx` signal,
/// on `UpdateEvent::Shutdown`, or when the publisher goes away.
pub fn handle_client_stream(
    socket: Arc<UdpSocket>,
    target_addr: SocketAddr,
    symbols: HashSet<Symbol>,
    data_rx: Receiver<UpdateEvent>,
    stop_rx: Receiver<()>,
) -> Result<()> {
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(data_rx) -> msg => match msg {
                Ok(UpdateEvent::Price(update)) => {
                    if !symbols.is_empty() && !symbols.contains(&update.symbol) {
                        continue;
                    }
                    let data = update.to_json_bytes()?;
                    if let Err(e) = socket.send_to(&data, target_addr) {
                        error!("Failed to send UDP packet to {}: {}", target_addr, e);
                        return Err(e.into());
                    }
                }
                Ok(UpdateEvent::Shutdown) => break,
                Err(e) => return Err(TapeError::ChannelRecv(e.to_string())),
            }
        }
    }
    debug!("Stream to {} finished", target_addr);
    Ok(())
}
