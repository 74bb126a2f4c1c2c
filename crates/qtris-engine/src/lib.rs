//! Falling-block puzzle simulator used by the learning agent.
//!
//! The crate is split in two layers:
//!
//! - [`core`]: board geometry, piece shapes and the pure board queries the
//!   agent relies on (collision tests, drop simulation, line clears and the
//!   height/hole/bumpiness metrics).
//! - [`engine`]: a running game: the falling piece and its successor, score
//!   bookkeeping and execution of `(rotation, column)` actions.

pub use self::{core::*, engine::*};

pub mod core;
pub mod engine;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("piece colliding when locking at the requested placement")]
pub struct PieceCollisionError;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("game is over; reset the session before issuing actions")]
pub struct GameOverError;
