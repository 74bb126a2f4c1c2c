//! Move evaluation for the self-play agent.
//!
//! Three layers, leaves first:
//!
//! 1. **State encoding** ([`state_vector`]): turns a board and piece situation
//!    into a fixed-length vector of normalized features.
//! 2. **Value estimation** ([`value_network`]): a small two-layer perceptron
//!    mapping a state vector to a scalar quality estimate, trained online with
//!    hand-written backpropagation and persisted as plain text.
//! 3. **Move selection** ([`move_search`]): enumerates `(rotation, column)`
//!    placements, scores the resulting states and picks the best one, or a
//!    random one when exploring.
//!
//! ```text
//! MoveSearch (choose an action)
//!     ↓ scores candidates with
//! StateEvaluator / ValueNetwork (estimate quality)
//!     ↓ reads
//! StateVector (encode the resulting board)
//! ```
//!
//! # Example
//!
//! ```
//! use qtris_engine::GameSession;
//! use qtris_evaluator::{move_search::MoveSearch, value_network::ValueNetwork};
//! use rand::SeedableRng as _;
//!
//! let mut rng = rand_pcg::Pcg32::seed_from_u64(1);
//! let network = ValueNetwork::new(&mut rng);
//! let session = GameSession::with_seed(1);
//!
//! let result = MoveSearch::new(&network).select_move(&session, false, &mut rng);
//! let best = result.best.unwrap();
//! assert!(best.value.is_finite());
//! ```

pub mod move_search;
pub mod state_vector;
pub mod value_network;
