//! # Runner Process Library
//!
//! The isolated simulation peer for exactly one match. The server mirrors
//! every broadcast frame into this process over stdin; the runner decodes it
//! through its own registry instance (same codecs as the server, no
//! connection context) and advances its internal simulation. When the game
//! mode reports a terminal result the runner writes one report frame to
//! stdout and exits; an explicit exit sentinel, end-of-stream, or the 8-hour
//! idle ceiling also end the process.

pub mod handlers;
pub mod sim;
