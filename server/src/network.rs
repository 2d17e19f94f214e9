//! Server event loop and the decode/dispatch boundary.
//!
//! All mutable server state lives in [`ServerState`] and is only touched by
//! the loop in [`Server::run`]. Transport tasks, per-game tick timers and
//! runner supervisors communicate with the loop exclusively through
//! [`ServerEvent`]s, which keeps every per-connection and per-match mutation
//! free of locks.

use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

use shared::codes::DisconnectCode;
use shared::protocol::{GameStart, Packet, PacketId, PlayerProfile, RunnerReport};
use shared::registry::{ConnectionId, DispatchError, PacketRegistry};
use shared::{DEFAULT_MAP, TICK_INTERVAL};

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::connection::{Connection, Session, TransportCmd};
use crate::game::{Game, GameId};
use crate::queue::{GameQueue, QueueEvent};
use crate::runner::{RunnerError, RunnerHandle};

/// Events fed into the main loop by transport and supervision tasks.
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn: ConnectionId,
        sender: mpsc::UnboundedSender<TransportCmd>,
    },
    Message {
        conn: ConnectionId,
        bytes: Vec<u8>,
    },
    Closed {
        conn: ConnectionId,
    },
    GameTick {
        game: GameId,
    },
    RunnerSettled {
        game: GameId,
        outcome: Result<RunnerReport, RunnerError>,
    },
}

/// Factory for runner handles, injected so tests can substitute a loopback.
pub type RunnerSpawner = Box<dyn Fn(GameId) -> io::Result<RunnerHandle> + Send + Sync>;

pub struct ServerState {
    config: Config,
    connections: HashMap<ConnectionId, Connection>,
    queue: GameQueue,
    games: HashMap<GameId, Game>,
    next_game_id: GameId,
    verifier: Option<Box<dyn TokenVerifier>>,
    spawn_runner: RunnerSpawner,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl ServerState {
    pub fn new(
        config: Config,
        verifier: Option<Box<dyn TokenVerifier>>,
        spawn_runner: RunnerSpawner,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            config,
            connections: HashMap::new(),
            queue: GameQueue::new(),
            games: HashMap::new(),
            next_game_id: 1,
            verifier,
            spawn_runner,
            events,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn add_connection(&mut self, conn: ConnectionId, sender: mpsc::UnboundedSender<TransportCmd>) {
        info!("Connection {} opened", conn);
        self.connections.insert(conn, Connection::new(conn, sender));
    }

    pub fn connection(&self, conn: ConnectionId) -> Option<&Connection> {
        self.connections.get(&conn)
    }

    pub fn connection_mut(&mut self, conn: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&conn)
    }

    pub fn verifier(&self) -> Option<&dyn TokenVerifier> {
        self.verifier.as_deref()
    }

    pub fn queue(&self) -> &GameQueue {
        &self.queue
    }

    pub fn game(&self, game: GameId) -> Option<&Game> {
        self.games.get(&game)
    }

    pub fn game_mut(&mut self, game: GameId) -> Option<&mut Game> {
        self.games.get_mut(&game)
    }

    pub fn game_ids(&self) -> Vec<GameId> {
        self.games.keys().copied().collect()
    }

    pub fn send(&self, conn: ConnectionId, packet: &Packet) {
        if let Some(connection) = self.connections.get(&conn) {
            connection.send(packet);
        }
    }

    /// Closes a connection and removes it from whichever session owns it.
    /// Safe to call from racing teardown paths; the second call is a no-op.
    pub fn disconnect(&mut self, conn: ConnectionId, code: DisconnectCode) {
        let Some(connection) = self.connections.remove(&conn) else {
            return;
        };
        connection.close(code);
        info!("Connection {} closed ({:?})", conn, code);
        match connection.session {
            // Queued players are pruned immediately rather than at promotion.
            Session::Queued => self.queue.remove_player(conn),
            Session::InGame { game, .. } => self.remove_from_game(game, conn),
            Session::None => {}
        }
    }

    /// Puts a freshly handshaken connection into the matchmaking queue.
    pub fn join_queue(&mut self, conn: ConnectionId, now: Instant) {
        self.queue.join(conn, now);
        if let Some(connection) = self.connections.get_mut(&conn) {
            connection.session = Session::Queued;
        }
    }

    /// Drives queue countdowns and promotions; called once per second.
    pub fn queue_tick(&mut self, now: Instant) {
        for event in self.queue.tick(now) {
            match event {
                QueueEvent::Promote(players) => self.start_game(players),
                QueueEvent::Update { members, packet } => match packet.encode() {
                    Ok(raw) => {
                        for conn in members {
                            if let Some(connection) = self.connections.get(&conn) {
                                connection.send_raw(raw.clone());
                            }
                        }
                    }
                    Err(e) => error!("failed to encode queue update: {}", e),
                },
            }
        }
    }

    /// Promotes a queue membership into a running game: stable client
    /// indices, shared seed, paired runner process, armed tick timer.
    pub fn start_game(&mut self, players: Vec<ConnectionId>) {
        if players.is_empty() {
            return;
        }
        let game_id = self.next_game_id;
        self.next_game_id += 1;

        let runner = match (self.spawn_runner)(game_id) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn runner for game {}: {}", game_id, e);
                for &conn in &players {
                    self.disconnect(conn, DisconnectCode::Normal);
                }
                return;
            }
        };

        let seed: u32 = rand::random();
        let roster: Vec<PlayerProfile> = players
            .iter()
            .map(|id| {
                let connection = self.connections.get(id);
                PlayerProfile {
                    name: connection.map(|c| c.name.clone()).unwrap_or_default(),
                    account: connection.and_then(|c| c.auth.clone()),
                }
            })
            .collect();

        info!("Starting game {} on {} with {} players", game_id, DEFAULT_MAP, players.len());

        let mut game = Game::new(game_id, players.clone(), runner);

        for (index, conn_id) in players.iter().enumerate() {
            if let Some(connection) = self.connections.get_mut(conn_id) {
                connection.session = Session::InGame { game: game_id, client_index: index as u32 };
                connection.send(&Packet::GameStart(GameStart {
                    map: DEFAULT_MAP.to_string(),
                    epoch: 0,
                    seed,
                    client_index: index as u32,
                    roster: roster.clone(),
                }));
            }
        }

        // The runner observes the match from the authoritative index 0.
        let mirror = Packet::GameStart(GameStart {
            map: DEFAULT_MAP.to_string(),
            epoch: 0,
            seed,
            client_index: 0,
            roster,
        });
        match mirror.encode() {
            Ok(raw) => game.runner().send(raw),
            Err(e) => error!("failed to encode game start for runner: {}", e),
        }

        // Tick timer task; cancelled when the game drops its guard.
        let (guard, mut stopped) = oneshot::channel::<()>();
        game.set_tick_guard(guard);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut ticker = interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick fires immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if events.send(ServerEvent::GameTick { game: game_id }).is_err() {
                            break;
                        }
                    }
                    _ = &mut stopped => break,
                }
            }
        });

        self.games.insert(game_id, game);
    }

    /// Runs one broadcast tick: every member and the runner process receive
    /// byte-identical frames.
    pub fn tick_game(&mut self, game_id: GameId) {
        let (raw, members) = {
            let Some(game) = self.games.get_mut(&game_id) else {
                return;
            };
            let packet = game.advance_tick();
            let raw = match packet.encode() {
                Ok(raw) => raw,
                Err(e) => {
                    error!("failed to encode tick for game {}: {}", game_id, e);
                    return;
                }
            };
            game.runner().send(raw.clone());
            (raw, game.member_conns())
        };
        for conn in members {
            if let Some(connection) = self.connections.get(&conn) {
                connection.send_raw(raw.clone());
            }
        }
    }

    fn remove_from_game(&mut self, game_id: GameId, conn: ConnectionId) {
        let Some(game) = self.games.get_mut(&game_id) else {
            return;
        };
        if game.remove_member(conn) {
            game.runner().stop();
            self.end_game(game_id);
        }
    }

    /// Tears a game down: removing it drops the tick guard (cancelling the
    /// timer task), then every remaining member is disconnected.
    pub fn end_game(&mut self, game_id: GameId) {
        let Some(game) = self.games.remove(&game_id) else {
            return;
        };
        info!("Game {} ended", game_id);
        for conn in game.member_conns() {
            // TODO: pick a dedicated disconnect code for match completion.
            self.disconnect(conn, DisconnectCode::Normal);
        }
    }

    /// Handles the one-shot settlement of a game's runner process.
    pub fn runner_settled(&mut self, game_id: GameId, outcome: Result<RunnerReport, RunnerError>) {
        if !self.games.contains_key(&game_id) {
            // The game already tore down; the settlement lost the race.
            return;
        }
        match &outcome {
            Ok(report) => info!(
                "Runner for game {} finished after {} ticks, winner {:?}",
                game_id, report.ticks, report.winner
            ),
            // TODO: notify players of the failure instead of a silent teardown.
            Err(e) => error!("Runner for game {} failed: {}", game_id, e),
        }
        self.end_game(game_id);
    }
}

/// Decodes and dispatches one inbound frame, enforcing handshake-before-
/// gameplay and mapping each failure class to its disconnect code.
pub fn handle_message(
    registry: &PacketRegistry<ServerState>,
    state: &mut ServerState,
    conn: ConnectionId,
    bytes: &[u8],
) {
    let Some(connection) = state.connection(conn) else {
        return;
    };
    if !connection.handshake && bytes.first() != Some(&(PacketId::HandshakeRequest as u8)) {
        debug!("Connection {} sent gameplay traffic before the handshake", conn);
        state.disconnect(conn, DisconnectCode::BadPacket);
        return;
    }

    match registry.dispatch(bytes, Some(conn), state) {
        Ok(()) => {}
        Err(DispatchError::Frame(e)) => {
            warn!("Undecodable frame from connection {}: {}", conn, e);
            state.disconnect(conn, DisconnectCode::BadMessage);
        }
        Err(DispatchError::Violation(e)) => {
            debug!("Protocol violation from connection {}: {}", conn, e);
            state.disconnect(conn, DisconnectCode::BadPacket);
        }
    }
}

/// Main server coordinating the event loop.
pub struct Server {
    registry: PacketRegistry<ServerState>,
    state: ServerState,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub fn new(
        registry: PacketRegistry<ServerState>,
        state: ServerState,
        events: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Self {
        Self { registry, state, events }
    }

    /// Runs the loop that owns all server state. Queue countdowns are driven
    /// by a one-second interval; everything else arrives as an event.
    pub async fn run(&mut self) {
        let mut queue_timer = interval(Duration::from_secs(1));
        queue_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("Event channel closed, shutting down");
                        break;
                    }
                },
                _ = queue_timer.tick() => self.state.queue_tick(Instant::now()),
            }
        }
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected { conn, sender } => self.state.add_connection(conn, sender),
            ServerEvent::Message { conn, bytes } => {
                handle_message(&self.registry, &mut self.state, conn, &bytes)
            }
            ServerEvent::Closed { conn } => self.state.disconnect(conn, DisconnectCode::Normal),
            ServerEvent::GameTick { game } => self.state.tick_game(game),
            ServerEvent::RunnerSettled { game, outcome } => {
                self.state.runner_settled(game, outcome)
            }
        }
    }
}
