//! Packet registry mapping type ids to codecs and per-type handlers.
//!
//! The server and the runner process each build their own instance over the
//! same codecs (`protocol::register_packets`) but with different handler sets
//! and context types. Handlers receive the originating connection id, or
//! `None` when dispatching inside the runner, and must tolerate its absence.

use std::collections::HashMap;

use thiserror::Error;

use crate::protocol::{Packet, PacketId};

/// Identifier of a live transport connection on the server side.
pub type ConnectionId = u32;

/// Errors while turning raw bytes into a typed packet.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("empty frame")]
    Empty,
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("malformed payload: {0}")]
    Malformed(#[from] bincode::Error),
}

/// A well-formed frame that is invalid for the session's current state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("game has not started yet")]
    NotStarted,
    #[error("client is not in a running game")]
    NoGame,
    #[error("packet assertion failed")]
    Assertion,
}

/// Outcome of a full decode-and-dispatch pass.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Undecodable bytes; the sender should be dropped with a bad-message code.
    #[error(transparent)]
    Frame(WireError),
    /// Semantically invalid packet; bad-packet code.
    #[error(transparent)]
    Violation(ProtocolViolation),
}

type Codec = fn(&[u8]) -> Result<Packet, WireError>;
type Handler<C> =
    Box<dyn Fn(Packet, Option<ConnectionId>, &mut C) -> Result<(), ProtocolViolation> + Send + Sync>;
type Fallback<C> =
    Box<dyn Fn(u8, Option<ConnectionId>, &mut C) -> Result<(), ProtocolViolation> + Send + Sync>;

pub struct PacketRegistry<C> {
    codecs: HashMap<u8, Codec>,
    handlers: HashMap<u8, Handler<C>>,
    fallback: Fallback<C>,
}

impl<C> PacketRegistry<C> {
    /// Creates a registry with the handler invoked for packet types that are
    /// unregistered or have no handler installed.
    pub fn new<F>(fallback: F) -> Self
    where
        F: Fn(u8, Option<ConnectionId>, &mut C) -> Result<(), ProtocolViolation>
            + Send
            + Sync
            + 'static,
    {
        Self {
            codecs: HashMap::new(),
            handlers: HashMap::new(),
            fallback: Box::new(fallback),
        }
    }

    /// Binds the symmetric codec for one packet type.
    pub fn register(&mut self, id: PacketId, codec: Codec) {
        self.codecs.insert(id as u8, codec);
    }

    /// Installs the handler invoked with decoded packets of one type.
    pub fn handle<F>(&mut self, id: PacketId, handler: F)
    where
        F: Fn(Packet, Option<ConnectionId>, &mut C) -> Result<(), ProtocolViolation>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(id as u8, Box::new(handler));
    }

    /// Decodes a frame into a typed packet.
    pub fn decode(&self, bytes: &[u8]) -> Result<Packet, WireError> {
        let (&id, payload) = bytes.split_first().ok_or(WireError::Empty)?;
        let codec = self.codecs.get(&id).ok_or(WireError::UnknownType(id))?;
        codec(payload)
    }

    /// Decodes a frame and routes it to the matching handler, or to the
    /// fallback when the type id is unknown or unhandled.
    pub fn dispatch(
        &self,
        bytes: &[u8],
        sender: Option<ConnectionId>,
        ctx: &mut C,
    ) -> Result<(), DispatchError> {
        match self.decode(bytes) {
            Ok(packet) => {
                let id = packet.id() as u8;
                match self.handlers.get(&id) {
                    Some(handler) => handler(packet, sender, ctx).map_err(DispatchError::Violation),
                    None => (self.fallback)(id, sender, ctx).map_err(DispatchError::Violation),
                }
            }
            Err(WireError::UnknownType(id)) => {
                (self.fallback)(id, sender, ctx).map_err(DispatchError::Violation)
            }
            Err(e) => Err(DispatchError::Frame(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{register_packets, SpawnRequest};

    #[derive(Default)]
    struct Recorder {
        positions: Vec<u32>,
        fallback_ids: Vec<u8>,
    }

    fn recorder_registry() -> PacketRegistry<Recorder> {
        let mut registry = PacketRegistry::new(|id, _, ctx: &mut Recorder| {
            ctx.fallback_ids.push(id);
            Ok(())
        });
        register_packets(&mut registry);
        registry.handle(PacketId::SpawnRequest, |packet, sender, ctx| {
            assert_eq!(sender, Some(9));
            match packet {
                Packet::SpawnRequest(req) => {
                    ctx.positions.push(req.position);
                    Ok(())
                }
                _ => Err(ProtocolViolation::Assertion),
            }
        });
        registry
    }

    #[test]
    fn dispatch_routes_to_the_typed_handler() {
        let registry = recorder_registry();
        let mut ctx = Recorder::default();
        let raw = Packet::SpawnRequest(SpawnRequest { position: 42 }).encode().unwrap();
        registry.dispatch(&raw, Some(9), &mut ctx).unwrap();
        assert_eq!(ctx.positions, vec![42]);
        assert!(ctx.fallback_ids.is_empty());
    }

    #[test]
    fn unknown_type_id_goes_to_the_fallback() {
        let registry = recorder_registry();
        let mut ctx = Recorder::default();
        registry.dispatch(&[0xEE, 1, 2, 3], Some(9), &mut ctx).unwrap();
        assert_eq!(ctx.fallback_ids, vec![0xEE]);
    }

    #[test]
    fn registered_type_without_handler_goes_to_the_fallback() {
        let registry = recorder_registry();
        let mut ctx = Recorder::default();
        let raw = Packet::HandshakeResponse(crate::protocol::HandshakeResponse).encode().unwrap();
        registry.dispatch(&raw, None, &mut ctx).unwrap();
        assert_eq!(ctx.fallback_ids, vec![PacketId::HandshakeResponse as u8]);
    }

    #[test]
    fn empty_frame_is_a_framing_error() {
        let registry = recorder_registry();
        let mut ctx = Recorder::default();
        let err = registry.dispatch(&[], Some(9), &mut ctx).unwrap_err();
        assert!(matches!(err, DispatchError::Frame(WireError::Empty)));
    }
}
