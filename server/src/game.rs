//! A running match: membership, tick counter, action batching, spawn records.

use std::collections::HashMap;

use tokio::sync::oneshot;

use shared::protocol::{GameAction, GameTick, Packet, SpawnAssignment, SpawnBundle};
use shared::registry::{ConnectionId, ProtocolViolation};
use shared::PRESTART_TICKS;

use crate::runner::RunnerHandle;

pub type GameId = u32;

/// One member of a match. The client index is assigned at construction and
/// stays stable even as other members leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameMember {
    pub conn: ConnectionId,
    pub client_index: u32,
}

#[derive(Debug, Clone, Copy)]
struct SpawnRecord {
    position: u32,
    /// Tick counter value at the time the spawn was recorded.
    updated: i32,
}

pub struct Game {
    id: GameId,
    members: Vec<GameMember>,
    pending_actions: Vec<GameAction>,
    spawns: HashMap<u32, SpawnRecord>,
    /// Starts in the negative pre-start range and counts up; once it reaches
    /// zero the match has begun and the counter never goes negative again.
    tick: i32,
    runner: RunnerHandle,
    tick_guard: Option<oneshot::Sender<()>>,
}

impl Game {
    /// Builds a match over the given membership, assigning each connection a
    /// stable 0-based client index equal to its position in the list.
    pub fn new(id: GameId, players: Vec<ConnectionId>, runner: RunnerHandle) -> Self {
        let members = players
            .into_iter()
            .enumerate()
            .map(|(index, conn)| GameMember { conn, client_index: index as u32 })
            .collect();
        Self {
            id,
            members,
            pending_actions: Vec::new(),
            spawns: HashMap::new(),
            tick: PRESTART_TICKS,
            runner,
            tick_guard: None,
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn has_started(&self) -> bool {
        self.tick >= 0
    }

    pub fn current_tick(&self) -> i32 {
        self.tick
    }

    /// Produces the broadcast for one tick and advances the counter.
    ///
    /// Pre-start ticks bundle the spawn records set at the current counter
    /// value, tagged with the counter's positive magnitude. Started ticks
    /// drain the accumulated action queue.
    pub fn advance_tick(&mut self) -> Packet {
        let packet = if self.tick < 0 {
            let current = self.tick;
            let mut spawns: Vec<SpawnAssignment> = self
                .spawns
                .iter()
                .filter(|(_, record)| record.updated == current)
                .map(|(&player, record)| SpawnAssignment { player, position: record.position })
                .collect();
            spawns.sort_by_key(|s| s.player);
            Packet::SpawnBundle(SpawnBundle { tick: (-current) as u32, spawns })
        } else {
            Packet::GameTick(GameTick {
                tick: self.tick as u32,
                actions: std::mem::take(&mut self.pending_actions),
            })
        };
        self.tick += 1;
        packet
    }

    /// Records a spawn position for a player. A request that was sent before
    /// the match started but arrived after is silently dropped so it cannot
    /// corrupt already-ticked state.
    pub fn set_spawn(&mut self, player: u32, position: u32) {
        if self.has_started() {
            return;
        }
        self.spawns.insert(player, SpawnRecord { position, updated: self.tick });
    }

    /// Appends an action for the next tick's broadcast.
    pub fn add_action(&mut self, action: GameAction) -> Result<(), ProtocolViolation> {
        if !self.has_started() {
            return Err(ProtocolViolation::NotStarted);
        }
        self.pending_actions.push(action);
        Ok(())
    }

    /// Removes a member; membership only ever shrinks. Returns true when the
    /// match is now empty and should be torn down.
    pub fn remove_member(&mut self, conn: ConnectionId) -> bool {
        self.members.retain(|m| m.conn != conn);
        self.members.is_empty()
    }

    pub fn members(&self) -> &[GameMember] {
        &self.members
    }

    pub fn member_conns(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.conn).collect()
    }

    pub fn runner(&self) -> &RunnerHandle {
        &self.runner
    }

    /// Arms the guard whose drop cancels the match's tick timer task.
    pub fn set_tick_guard(&mut self, guard: oneshot::Sender<()>) {
        self.tick_guard = Some(guard);
    }
}
