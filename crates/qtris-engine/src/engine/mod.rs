//! A running game built on top of the [`core`](crate::core) board.
//!
//! - [`GameField`]: board, falling piece and the next piece, plus the pure
//!   "what if" simulations the agent uses to look ahead
//! - [`GameSession`]: a field with score bookkeeping that executes
//!   `(rotation, column)` actions and detects top-out
//! - [`GameStats`]: score, level and line counters
//! - [`PieceGenerator`]: seedable uniform piece supply
//!
//! # Example
//!
//! ```
//! use qtris_engine::{GameSession, PieceRotation};
//!
//! let mut session = GameSession::with_seed(7);
//! let outcome = session.execute_action(PieceRotation::new(0), 3).unwrap();
//! assert_eq!(outcome.cleared_lines, 0);
//! assert_eq!(session.stats().completed_pieces(), 1);
//! ```

pub use self::{game_field::*, game_session::*, game_stats::*, piece_generator::*};

mod game_field;
mod game_session;
mod game_stats;
mod piece_generator;
