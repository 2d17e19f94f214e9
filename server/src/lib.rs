//! # Match Server Library
//!
//! Authoritative server for real-time multiplayer sessions. It accepts client
//! connections, queues players into scheduled matches, spawns one isolated
//! runner process per match, relays binary game actions between clients and
//! that process, and broadcasts accumulated state on a fixed 500 ms cadence.
//!
//! ## Architecture
//!
//! All mutable state lives in [`network::ServerState`] and is only touched
//! from the single event loop in [`network::Server::run`]. Auxiliary tasks
//! (transport readers and writers, per-game tick timers, runner supervisors)
//! never share state; they feed [`network::ServerEvent`]s into the loop over
//! a channel. The only true concurrency boundary is the runner process
//! itself, reached through a byte pipe.
//!
//! ## Module organization
//!
//! - [`connection`]: per-connection handshake, identity and session state
//! - [`queue`]: scheduled matches with deferred start times
//! - [`game`]: a running match with its tick counter, action batch and spawns
//! - [`runner`]: runner-process spawning and one-shot result supervision
//! - [`handlers`]: explicit packet-handler registration
//! - [`network`]: the event loop and decode/dispatch boundary
//! - [`transport`]: thin TCP framing glue feeding the loop
//! - [`auth`]: JWT verification seam with a degraded mode without key material
//! - [`config`]: environment-driven configuration

pub mod auth;
pub mod config;
pub mod connection;
pub mod game;
pub mod handlers;
pub mod network;
pub mod queue;
pub mod runner;
pub mod transport;
