//! Explicit packet-handler registration for the server-side registry.
//!
//! Called once during startup so every handled packet type is listed in one
//! place. Gameplay handlers defensively verify that the sender belongs to a
//! running game and that its stable client index matches the actor embedded
//! in the packet; any mismatch is a protocol violation that the dispatch
//! boundary converts into a bad-packet disconnect.

use std::time::Instant;

use log::debug;

use shared::codes::DisconnectCode;
use shared::protocol::{GameAction, HandshakeResponse, Packet, PacketId};
use shared::registry::{ConnectionId, PacketRegistry, ProtocolViolation};
use shared::PROTOCOL_VERSION;

use crate::connection::Session;
use crate::game::GameId;
use crate::network::ServerState;

/// Resolves the sender into its running game and stable client index.
fn game_session(
    state: &ServerState,
    sender: Option<ConnectionId>,
) -> Result<(GameId, u32), ProtocolViolation> {
    let conn = sender.ok_or(ProtocolViolation::Assertion)?;
    let connection = state.connection(conn).ok_or(ProtocolViolation::NoGame)?;
    match connection.session {
        Session::InGame { game, client_index } => Ok((game, client_index)),
        _ => Err(ProtocolViolation::NoGame),
    }
}

pub fn register_handlers(registry: &mut PacketRegistry<ServerState>) {
    registry.handle(PacketId::HandshakeRequest, |packet, sender, state| {
        let Packet::HandshakeRequest(req) = packet else {
            return Err(ProtocolViolation::Assertion);
        };
        let conn = sender.ok_or(ProtocolViolation::Assertion)?;

        if req.version != PROTOCOL_VERSION {
            let code = if req.version < PROTOCOL_VERSION {
                DisconnectCode::ClientOutOfDate
            } else {
                DisconnectCode::ServerOutOfDate
            };
            state.disconnect(conn, code);
            return Ok(());
        }

        // Verification only runs when both a token and key material exist;
        // otherwise the handshake proceeds unauthenticated.
        let verified = match (&req.token, state.verifier()) {
            (Some(token), Some(verifier)) => Some(verifier.verify(token)),
            _ => None,
        };
        let account = match verified {
            Some(Ok(account)) => Some(account),
            Some(Err(e)) => {
                debug!("Token rejected for connection {}: {}", conn, e);
                state.disconnect(conn, DisconnectCode::BadAuth);
                return Ok(());
            }
            None => None,
        };

        let Some(connection) = state.connection_mut(conn) else {
            return Ok(());
        };
        connection.auth = account;
        connection.name = req.name;
        connection.handshake = true;
        state.send(conn, &Packet::HandshakeResponse(HandshakeResponse));

        state.join_queue(conn, Instant::now());
        Ok(())
    });

    registry.handle(PacketId::SpawnRequest, |packet, sender, state| {
        let Packet::SpawnRequest(req) = packet else {
            return Err(ProtocolViolation::Assertion);
        };
        let (game, index) = game_session(state, sender)?;
        // Drops silently once the game has started.
        state.game_mut(game).ok_or(ProtocolViolation::NoGame)?.set_spawn(index, req.position);
        Ok(())
    });

    // TODO: rate limit gameplay actions per connection.

    registry.handle(PacketId::AttackAction, |packet, sender, state| {
        let Packet::AttackAction(action) = packet else {
            return Err(ProtocolViolation::Assertion);
        };
        let (game, index) = game_session(state, sender)?;
        if action.attacker != index {
            return Err(ProtocolViolation::Assertion);
        }
        state
            .game_mut(game)
            .ok_or(ProtocolViolation::NoGame)?
            .add_action(GameAction::Attack(action))
    });

    registry.handle(PacketId::BoatAction, |packet, sender, state| {
        let Packet::BoatAction(action) = packet else {
            return Err(ProtocolViolation::Assertion);
        };
        let (game, index) = game_session(state, sender)?;
        if action.player != index {
            return Err(ProtocolViolation::Assertion);
        }
        state
            .game_mut(game)
            .ok_or(ProtocolViolation::NoGame)?
            .add_action(GameAction::Boat(action))
    });
}
