//! Packet types and their payload codecs.
//!
//! Every message on the wire is a self-describing frame: a leading type id
//! byte followed by the bincode-encoded payload for that type. The same
//! frames flow client-to-server and server-to-runner.

use serde::{Deserialize, Serialize};

use crate::registry::{PacketRegistry, WireError};

/// Numeric packet-type identifier carried as the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketId {
    HandshakeRequest = 1,
    HandshakeResponse = 2,
    QueueUpdate = 3,
    GameStart = 4,
    SpawnBundle = 5,
    GameTick = 6,
    SpawnRequest = 7,
    AttackAction = 8,
    BoatAction = 9,
}

/// Verified identity attached to a connection after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub avatar_url: String,
}

/// One roster slot in a game-start announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub account: Option<UserAccount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub version: u32,
    pub token: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse;

/// Countdown broadcast sent to queued players once per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueUpdate {
    pub position: u32,
    pub total: u32,
    pub seconds_remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStart {
    pub map: String,
    pub epoch: u32,
    pub seed: u32,
    /// The receiver's own stable index; fixed at 0 in the copy mirrored to
    /// the runner process.
    pub client_index: u32,
    pub roster: Vec<PlayerProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnAssignment {
    pub player: u32,
    pub position: u32,
}

/// Spawn assignments gathered during one pre-start tick, tagged with the
/// positive magnitude of the (negative) tick counter they were bundled at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnBundle {
    pub tick: u32,
    pub spawns: Vec<SpawnAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameTick {
    pub tick: u32,
    pub actions: Vec<GameAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackAction {
    pub attacker: u32,
    pub target: u32,
    pub troops: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoatAction {
    pub player: u32,
    pub from: u32,
    pub to: u32,
}

/// Gameplay action accumulated between ticks. The enum discriminant is the
/// canonical type-tag an action carries inside a tick broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameAction {
    Attack(AttackAction),
    Boat(BoatAction),
}

/// Terminal result a runner process reports over its stdout pipe. This is
/// an inter-process message, not a registry packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerReport {
    pub winner: Option<u32>,
    pub ticks: u32,
}

/// A decoded wire packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    HandshakeRequest(HandshakeRequest),
    HandshakeResponse(HandshakeResponse),
    QueueUpdate(QueueUpdate),
    GameStart(GameStart),
    SpawnBundle(SpawnBundle),
    GameTick(GameTick),
    SpawnRequest(SpawnRequest),
    AttackAction(AttackAction),
    BoatAction(BoatAction),
}

impl Packet {
    pub fn id(&self) -> PacketId {
        match self {
            Packet::HandshakeRequest(_) => PacketId::HandshakeRequest,
            Packet::HandshakeResponse(_) => PacketId::HandshakeResponse,
            Packet::QueueUpdate(_) => PacketId::QueueUpdate,
            Packet::GameStart(_) => PacketId::GameStart,
            Packet::SpawnBundle(_) => PacketId::SpawnBundle,
            Packet::GameTick(_) => PacketId::GameTick,
            Packet::SpawnRequest(_) => PacketId::SpawnRequest,
            Packet::AttackAction(_) => PacketId::AttackAction,
            Packet::BoatAction(_) => PacketId::BoatAction,
        }
    }

    /// Serializes the packet into a self-describing frame.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = vec![self.id() as u8];
        match self {
            Packet::HandshakeRequest(p) => bincode::serialize_into(&mut buf, p)?,
            Packet::HandshakeResponse(p) => bincode::serialize_into(&mut buf, p)?,
            Packet::QueueUpdate(p) => bincode::serialize_into(&mut buf, p)?,
            Packet::GameStart(p) => bincode::serialize_into(&mut buf, p)?,
            Packet::SpawnBundle(p) => bincode::serialize_into(&mut buf, p)?,
            Packet::GameTick(p) => bincode::serialize_into(&mut buf, p)?,
            Packet::SpawnRequest(p) => bincode::serialize_into(&mut buf, p)?,
            Packet::AttackAction(p) => bincode::serialize_into(&mut buf, p)?,
            Packet::BoatAction(p) => bincode::serialize_into(&mut buf, p)?,
        }
        Ok(buf)
    }
}

/// Installs the codec for every packet type.
///
/// Called explicitly during startup by both the server and the runner, so the
/// full protocol surface is listed in one place instead of being assembled by
/// import side effects.
pub fn register_packets<C>(registry: &mut PacketRegistry<C>) {
    registry.register(PacketId::HandshakeRequest, |b| {
        Ok(Packet::HandshakeRequest(bincode::deserialize(b)?))
    });
    registry.register(PacketId::HandshakeResponse, |b| {
        Ok(Packet::HandshakeResponse(bincode::deserialize(b)?))
    });
    registry.register(PacketId::QueueUpdate, |b| {
        Ok(Packet::QueueUpdate(bincode::deserialize(b)?))
    });
    registry.register(PacketId::GameStart, |b| {
        Ok(Packet::GameStart(bincode::deserialize(b)?))
    });
    registry.register(PacketId::SpawnBundle, |b| {
        Ok(Packet::SpawnBundle(bincode::deserialize(b)?))
    });
    registry.register(PacketId::GameTick, |b| {
        Ok(Packet::GameTick(bincode::deserialize(b)?))
    });
    registry.register(PacketId::SpawnRequest, |b| {
        Ok(Packet::SpawnRequest(bincode::deserialize(b)?))
    });
    registry.register(PacketId::AttackAction, |b| {
        Ok(Packet::AttackAction(bincode::deserialize(b)?))
    });
    registry.register(PacketId::BoatAction, |b| {
        Ok(Packet::BoatAction(bincode::deserialize(b)?))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> PacketRegistry<()> {
        let mut registry = PacketRegistry::new(|_, _, _| Ok(()));
        register_packets(&mut registry);
        registry
    }

    #[test]
    fn frames_carry_their_type_id() {
        let packet = Packet::SpawnRequest(SpawnRequest { position: 7 });
        let raw = packet.encode().unwrap();
        assert_eq!(raw[0], PacketId::SpawnRequest as u8);
    }

    #[test]
    fn representative_packets_roundtrip() {
        let registry = test_registry();
        let packets = vec![
            Packet::HandshakeRequest(HandshakeRequest {
                version: 1,
                token: Some("jwt".into()),
                name: "ada".into(),
            }),
            Packet::GameStart(GameStart {
                map: crate::DEFAULT_MAP.into(),
                epoch: 0,
                seed: 0xDEAD_BEEF,
                client_index: 2,
                roster: vec![
                    PlayerProfile { name: "ada".into(), account: None },
                    PlayerProfile {
                        name: "lin".into(),
                        account: Some(UserAccount {
                            id: "u1".into(),
                            username: "lin".into(),
                            avatar_url: "https://example/a.png".into(),
                        }),
                    },
                ],
            }),
            Packet::GameTick(GameTick {
                tick: 12,
                actions: vec![
                    GameAction::Attack(AttackAction { attacker: 0, target: 91, troops: 40 }),
                    GameAction::Boat(BoatAction { player: 1, from: 3, to: 18 }),
                ],
            }),
            Packet::SpawnBundle(SpawnBundle {
                tick: 5,
                spawns: vec![SpawnAssignment { player: 1, position: 42 }],
            }),
        ];

        for packet in packets {
            let raw = packet.encode().unwrap();
            let decoded = registry.decode(&raw).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let registry = test_registry();
        let mut raw = Packet::GameStart(GameStart {
            map: "m".into(),
            epoch: 0,
            seed: 1,
            client_index: 0,
            roster: vec![],
        })
        .encode()
        .unwrap();
        raw.truncate(3);
        assert!(matches!(registry.decode(&raw), Err(WireError::Malformed(_))));
    }

    #[test]
    fn runner_report_roundtrips_over_the_pipe_encoding() {
        let report = RunnerReport { winner: Some(2), ticks: 310 };
        let raw = bincode::serialize(&report).unwrap();
        assert_eq!(bincode::deserialize::<RunnerReport>(&raw).unwrap(), report);
    }
}
