//! Per-connection state: handshake progress, identity and session membership.

use log::error;
use tokio::sync::mpsc;

use shared::codes::DisconnectCode;
use shared::protocol::{Packet, UserAccount};
use shared::registry::ConnectionId;

use crate::game::GameId;

/// Commands the event loop issues to a connection's transport writer task.
#[derive(Debug, PartialEq, Eq)]
pub enum TransportCmd {
    Frame(Vec<u8>),
    Close(u16),
}

/// Which session, if any, currently owns this connection. Exactly one owner
/// at a time; the queue-to-game transfer is a single reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    None,
    Queued,
    InGame { game: GameId, client_index: u32 },
}

pub struct Connection {
    pub id: ConnectionId,
    sender: mpsc::UnboundedSender<TransportCmd>,
    pub handshake: bool,
    pub name: String,
    pub auth: Option<UserAccount>,
    pub session: Session,
}

impl Connection {
    pub fn new(id: ConnectionId, sender: mpsc::UnboundedSender<TransportCmd>) -> Self {
        Self {
            id,
            sender,
            handshake: false,
            name: String::new(),
            auth: None,
            session: Session::None,
        }
    }

    /// Sends a packet. Dropped silently until the handshake completes, so a
    /// half-open connection never observes gameplay traffic.
    pub fn send(&self, packet: &Packet) {
        if !self.handshake {
            return;
        }
        match packet.encode() {
            Ok(raw) => self.send_raw(raw),
            Err(e) => error!("failed to encode {:?} packet: {}", packet.id(), e),
        }
    }

    /// Sends pre-encoded frame bytes, subject to the same handshake gate.
    pub fn send_raw(&self, raw: Vec<u8>) {
        if !self.handshake {
            return;
        }
        // A closed writer task just means the transport is already gone.
        let _ = self.sender.send(TransportCmd::Frame(raw));
    }

    pub fn close(&self, code: DisconnectCode) {
        let _ = self.sender.send(TransportCmd::Close(code.code()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::HandshakeResponse;

    #[test]
    fn packets_are_dropped_before_the_handshake() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut conn = Connection::new(1, tx);

        conn.send(&Packet::HandshakeResponse(HandshakeResponse));
        assert!(rx.try_recv().is_err());

        conn.handshake = true;
        conn.send(&Packet::HandshakeResponse(HandshakeResponse));
        assert!(matches!(rx.try_recv().unwrap(), TransportCmd::Frame(_)));
    }

    #[test]
    fn close_reaches_the_writer_regardless_of_handshake() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Connection::new(1, tx);
        conn.close(DisconnectCode::BadMessage);
        assert_eq!(rx.try_recv().unwrap(), TransportCmd::Close(4001));
    }
}
