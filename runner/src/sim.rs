//! Runner-side simulation state.
//!
//! Mode-specific strategy (bot behavior, attack resolution, physics) lives
//! behind the [`GameMode`] trait; this module only tracks the protocol-level
//! state every mode needs: the roster, spawn assignments, and the tick
//! stream. The free-for-all mode here is the minimal default.

use std::collections::HashMap;

use log::{info, warn};

use shared::protocol::{GameAction, GameStart, RunnerReport, SpawnBundle};

/// Mode-specific rules evaluated as the tick stream arrives.
pub trait GameMode: Send {
    fn on_action(&mut self, action: &GameAction);
    /// A result ends the simulation; `None` keeps it running.
    fn completed(&self, ticks: u32) -> Option<RunnerReport>;
}

/// Free-for-all: the last remaining player wins. Elimination tracking is
/// driven by mode strategy and stays minimal here; a solo match completes
/// on its first tick.
pub struct FfaMode {
    alive: Vec<u32>,
}

impl FfaMode {
    pub fn new(player_count: usize) -> Self {
        Self { alive: (0..player_count as u32).collect() }
    }
}

impl GameMode for FfaMode {
    fn on_action(&mut self, _action: &GameAction) {}

    fn completed(&self, ticks: u32) -> Option<RunnerReport> {
        if self.alive.len() <= 1 {
            Some(RunnerReport { winner: self.alive.first().copied(), ticks })
        } else {
            None
        }
    }
}

/// One match as the runner sees it.
pub struct GameSim {
    map: String,
    seed: u32,
    spawns: HashMap<u32, u32>,
    ticks_seen: u32,
    mode: Box<dyn GameMode>,
}

impl GameSim {
    pub fn new(start: &GameStart) -> Self {
        info!(
            "Simulating map {} with seed {} and {} players",
            start.map,
            start.seed,
            start.roster.len()
        );
        Self {
            map: start.map.clone(),
            seed: start.seed,
            spawns: HashMap::new(),
            ticks_seen: 0,
            mode: Box::new(FfaMode::new(start.roster.len())),
        }
    }

    pub fn map(&self) -> &str {
        &self.map
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn spawn_of(&self, player: u32) -> Option<u32> {
        self.spawns.get(&player).copied()
    }

    pub fn apply_spawns(&mut self, bundle: &SpawnBundle) {
        for assignment in &bundle.spawns {
            self.spawns.insert(assignment.player, assignment.position);
        }
    }

    /// Applies one tick's action batch and asks the mode for a result.
    pub fn apply_tick(&mut self, tick: u32, actions: &[GameAction]) -> Option<RunnerReport> {
        if tick != self.ticks_seen {
            warn!("Tick {} arrived while expecting {}", tick, self.ticks_seen);
        }
        for action in actions {
            self.mode.on_action(action);
        }
        self.ticks_seen = tick + 1;
        self.mode.completed(self.ticks_seen)
    }
}

/// Context the runner's packet handlers mutate. There is no connection here;
/// handlers run with no sender.
#[derive(Default)]
pub struct SimState {
    game: Option<GameSim>,
    report: Option<RunnerReport>,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn game(&self) -> Option<&GameSim> {
        self.game.as_ref()
    }

    pub fn game_mut(&mut self) -> Option<&mut GameSim> {
        self.game.as_mut()
    }

    pub fn begin(&mut self, start: &GameStart) {
        self.game = Some(GameSim::new(start));
    }

    pub fn record_report(&mut self, report: RunnerReport) {
        self.report = Some(report);
    }

    /// The terminal result, once the mode has produced one.
    pub fn take_report(&mut self) -> Option<RunnerReport> {
        self.report.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{PlayerProfile, SpawnAssignment};

    fn start(players: usize) -> GameStart {
        GameStart {
            map: shared::DEFAULT_MAP.into(),
            epoch: 0,
            seed: 7,
            client_index: 0,
            roster: (0..players)
                .map(|i| PlayerProfile { name: format!("p{}", i), account: None })
                .collect(),
        }
    }

    #[test]
    fn spawn_bundles_accumulate_latest_positions() {
        let mut sim = GameSim::new(&start(2));
        sim.apply_spawns(&SpawnBundle {
            tick: 20,
            spawns: vec![SpawnAssignment { player: 0, position: 5 }],
        });
        sim.apply_spawns(&SpawnBundle {
            tick: 19,
            spawns: vec![
                SpawnAssignment { player: 0, position: 8 },
                SpawnAssignment { player: 1, position: 3 },
            ],
        });
        assert_eq!(sim.spawn_of(0), Some(8));
        assert_eq!(sim.spawn_of(1), Some(3));
    }

    #[test]
    fn multiplayer_match_keeps_running() {
        let mut sim = GameSim::new(&start(3));
        assert!(sim.apply_tick(0, &[]).is_none());
        assert!(sim.apply_tick(1, &[]).is_none());
    }

    #[test]
    fn solo_match_completes_on_the_first_tick() {
        let mut sim = GameSim::new(&start(1));
        let report = sim.apply_tick(0, &[]).expect("solo match should complete");
        assert_eq!(report.winner, Some(0));
        assert_eq!(report.ticks, 1);
    }
}
