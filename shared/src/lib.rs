//! Shared wire protocol for the match server and its runner processes.
//!
//! Both peers of a session speak the exact same binary protocol: the server
//! decodes client frames through a [`registry::PacketRegistry`] instance with
//! connection context, and the runner process decodes the mirrored frames
//! through its own instance with no connection context. Keeping the codecs in
//! one crate is what prevents the two registries from drifting apart.

pub mod codes;
pub mod frame;
pub mod protocol;
pub mod registry;

use std::time::Duration;

/// Protocol version negotiated during the handshake. Bumped on every
/// incompatible wire change.
pub const PROTOCOL_VERSION: u32 = 1;

/// Map identifier every promoted match currently starts with.
pub const DEFAULT_MAP: &str = "N858Os";

/// Offset between queue-entry creation (or the previous entry's start) and
/// the scheduled match start.
pub const QUEUE_DELAY: Duration = Duration::from_millis(60_000);

/// Fixed broadcast cadence of a running match.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Initial value of a match's tick counter. Negative ticks bundle
/// late-arriving spawn assignments before gameplay begins.
pub const PRESTART_TICKS: i32 = -20;

/// Hard ceiling on how long a runner process waits for input before giving
/// up, as a safety net against orphaned processes.
pub const RUNNER_IDLE_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);
