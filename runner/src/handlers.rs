//! Packet-handler registration for the runner-side registry.
//!
//! Same codecs as the server, different handler set: these run with no
//! connection context and mutate the simulation instead of session state.

use log::warn;

use shared::protocol::{Packet, PacketId};
use shared::registry::{PacketRegistry, ProtocolViolation};

use crate::sim::SimState;

pub fn register_handlers(registry: &mut PacketRegistry<SimState>) {
    registry.handle(PacketId::GameStart, |packet, _sender, state| {
        let Packet::GameStart(start) = packet else {
            return Err(ProtocolViolation::Assertion);
        };
        state.begin(&start);
        Ok(())
    });

    registry.handle(PacketId::SpawnBundle, |packet, _sender, state| {
        let Packet::SpawnBundle(bundle) = packet else {
            return Err(ProtocolViolation::Assertion);
        };
        match state.game_mut() {
            Some(game) => {
                game.apply_spawns(&bundle);
                Ok(())
            }
            None => Err(ProtocolViolation::NotStarted),
        }
    });

    registry.handle(PacketId::GameTick, |packet, _sender, state| {
        let Packet::GameTick(tick) = packet else {
            return Err(ProtocolViolation::Assertion);
        };
        let report = match state.game_mut() {
            Some(game) => game.apply_tick(tick.tick, &tick.actions),
            None => return Err(ProtocolViolation::NotStarted),
        };
        if let Some(report) = report {
            state.record_report(report);
        }
        Ok(())
    });
}

/// Fallback for packet types the runner has no business receiving.
pub fn unhandled(id: u8, _sender: Option<u32>, _state: &mut SimState) -> Result<(), ProtocolViolation> {
    warn!("No runner handler for packet type {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{register_packets, GameStart, GameTick, PlayerProfile};

    fn runner_registry() -> PacketRegistry<SimState> {
        let mut registry = PacketRegistry::new(unhandled);
        register_packets(&mut registry);
        register_handlers(&mut registry);
        registry
    }

    #[test]
    fn tick_before_game_start_is_a_violation() {
        let registry = runner_registry();
        let mut state = SimState::new();
        let raw = Packet::GameTick(GameTick { tick: 0, actions: vec![] }).encode().unwrap();
        assert!(registry.dispatch(&raw, None, &mut state).is_err());
    }

    #[test]
    fn start_then_tick_drives_the_simulation_to_a_report() {
        let registry = runner_registry();
        let mut state = SimState::new();

        let start = Packet::GameStart(GameStart {
            map: shared::DEFAULT_MAP.into(),
            epoch: 0,
            seed: 99,
            client_index: 0,
            roster: vec![PlayerProfile { name: "ada".into(), account: None }],
        })
        .encode()
        .unwrap();
        registry.dispatch(&start, None, &mut state).unwrap();
        assert_eq!(state.game().unwrap().seed(), 99);

        let tick = Packet::GameTick(GameTick { tick: 0, actions: vec![] }).encode().unwrap();
        registry.dispatch(&tick, None, &mut state).unwrap();
        let report = state.take_report().expect("solo game should settle");
        assert_eq!(report.winner, Some(0));
    }

    #[test]
    fn packets_meant_for_clients_are_ignored() {
        let registry = runner_registry();
        let mut state = SimState::new();
        let raw = Packet::HandshakeResponse(shared::protocol::HandshakeResponse).encode().unwrap();
        assert!(registry.dispatch(&raw, None, &mut state).is_ok());
    }
}
