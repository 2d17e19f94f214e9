//! Matchmaking queue: scheduled-but-not-started matches.
//!
//! A single service instance owned by the server state, ticked once per
//! second by the event loop. Only the head entry accepts joiners; entries
//! behind it pipeline automatically once the head promotes.

use std::collections::VecDeque;
use std::time::Instant;

use log::info;

use shared::protocol::{Packet, QueueUpdate};
use shared::registry::ConnectionId;
use shared::QUEUE_DELAY;

/// A pending match with a fixed future start time.
pub struct ScheduledGame {
    start_at: Instant,
    players: Vec<ConnectionId>,
}

impl ScheduledGame {
    fn new(start_at: Instant) -> Self {
        Self { start_at, players: Vec::new() }
    }

    pub fn start_at(&self) -> Instant {
        self.start_at
    }

    pub fn players(&self) -> &[ConnectionId] {
        &self.players
    }

    fn seconds_remaining(&self, now: Instant) -> u32 {
        let remaining = self.start_at.saturating_duration_since(now).as_millis();
        ((remaining + 999) / 1000) as u32
    }
}

/// What the owner must do after one queue tick.
pub enum QueueEvent {
    /// The head entry reached its start time with a non-empty membership.
    Promote(Vec<ConnectionId>),
    /// Countdown broadcast for one still-pending entry.
    Update { members: Vec<ConnectionId>, packet: Packet },
}

#[derive(Default)]
pub struct GameQueue {
    entries: VecDeque<ScheduledGame>,
}

impl GameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fresh entry scheduled one offset after the previous entry's
    /// start, or after `now` for the first.
    pub fn schedule(&mut self, now: Instant) -> &mut ScheduledGame {
        let base = self.entries.back().map(|e| e.start_at).unwrap_or(now);
        self.entries.push_back(ScheduledGame::new(base + QUEUE_DELAY));
        self.entries.back_mut().unwrap()
    }

    /// Adds a player to the head entry, creating it when the queue is empty.
    /// Joining twice is a no-op.
    pub fn join(&mut self, player: ConnectionId, now: Instant) {
        if self.contains(player) {
            return;
        }
        if self.entries.is_empty() {
            self.schedule(now);
        }
        let head = self.entries.front_mut().unwrap();
        head.players.push(player);
        info!("Player {} queued, match starts in {}s", player, head.seconds_remaining(now));
    }

    pub fn contains(&self, player: ConnectionId) -> bool {
        self.entries.iter().any(|e| e.players.contains(&player))
    }

    /// Removes a player from whichever entry holds it; an emptied entry is
    /// dropped from the queue.
    pub fn remove_player(&mut self, player: ConnectionId) {
        for entry in &mut self.entries {
            entry.players.retain(|&p| p != player);
        }
        self.entries.retain(|e| !e.players.is_empty());
    }

    /// Advances the queue by one second of wall time.
    ///
    /// Promotes the head entry once its start time has passed (an empty head
    /// drains silently, producing no event) and emits a countdown update for
    /// every entry still pending.
    pub fn tick(&mut self, now: Instant) -> Vec<QueueEvent> {
        let mut events = Vec::new();

        if self.entries.front().is_some_and(|head| now > head.start_at) {
            let head = self.entries.pop_front().unwrap();
            if !head.players.is_empty() {
                events.push(QueueEvent::Promote(head.players));
            }
        }

        for (position, entry) in self.entries.iter().enumerate() {
            events.push(QueueEvent::Update {
                members: entry.players.clone(),
                packet: Packet::QueueUpdate(QueueUpdate {
                    position: position as u32,
                    total: entry.players.len() as u32,
                    seconds_remaining: entry.seconds_remaining(now),
                }),
            });
        }

        events
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn head(&self) -> Option<&ScheduledGame> {
        self.entries.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_entry_starts_one_offset_after_creation() {
        let mut queue = GameQueue::new();
        let now = Instant::now();
        queue.join(1, now);
        assert_eq!(queue.head().unwrap().start_at(), now + QUEUE_DELAY);
    }

    #[test]
    fn scheduled_starts_chain_by_exactly_one_offset() {
        let mut queue = GameQueue::new();
        let now = Instant::now();
        let first = queue.schedule(now).start_at();
        let second = queue.schedule(now + Duration::from_secs(7)).start_at();
        assert_eq!(first, now + QUEUE_DELAY);
        assert_eq!(second, first + QUEUE_DELAY);
    }

    #[test]
    fn joining_twice_does_not_duplicate_membership() {
        let mut queue = GameQueue::new();
        let now = Instant::now();
        queue.join(1, now);
        queue.join(1, now);
        assert_eq!(queue.head().unwrap().players(), &[1]);
    }

    #[test]
    fn countdown_is_a_clamped_ceiling() {
        let mut queue = GameQueue::new();
        let now = Instant::now();
        queue.join(1, now);

        let events = queue.tick(now + QUEUE_DELAY - Duration::from_millis(1500));
        let Some(QueueEvent::Update { packet: Packet::QueueUpdate(update), .. }) = events.first()
        else {
            panic!("expected a countdown update");
        };
        assert_eq!(update.seconds_remaining, 2);
        assert_eq!(update.position, 0);
        assert_eq!(update.total, 1);
    }

    #[test]
    fn head_promotes_with_join_order_preserved() {
        let mut queue = GameQueue::new();
        let now = Instant::now();
        queue.join(10, now);
        queue.join(11, now);
        queue.join(12, now);

        let events = queue.tick(now + QUEUE_DELAY + Duration::from_millis(1));
        match events.as_slice() {
            [QueueEvent::Promote(players)] => assert_eq!(players, &[10, 11, 12]),
            _ => panic!("expected exactly one promotion"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_head_drains_silently() {
        let mut queue = GameQueue::new();
        let now = Instant::now();
        queue.join(1, now);
        queue.remove_player(1);
        // Entry was dropped on the spot, nothing left to promote.
        assert!(queue.is_empty());
        assert!(queue.tick(now + QUEUE_DELAY + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn removal_before_start_prunes_the_player() {
        let mut queue = GameQueue::new();
        let now = Instant::now();
        queue.join(1, now);
        queue.join(2, now);
        queue.remove_player(1);
        assert_eq!(queue.head().unwrap().players(), &[2]);

        let events = queue.tick(now + QUEUE_DELAY + Duration::from_secs(1));
        match events.as_slice() {
            [QueueEvent::Promote(players)] => assert_eq!(players, &[2]),
            _ => panic!("expected a promotion"),
        }
    }
}
