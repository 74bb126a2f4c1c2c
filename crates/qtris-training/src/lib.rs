//! Self-play training of the value network.
//!
//! # Components
//!
//! - [`replay_buffer`]: bounded store of transitions with composition control
//! - [`trainer`]: batched Q-learning updates, score tracking and resume state
//! - [`exploration`]: adaptive exploration rate driven by score trends
//! - [`convergence`]: heuristic "training has settled" test
//! - [`tuner`]: rotation through the [`parameter_set`] presets when
//!   performance looks poor
//! - [`checkpoint`]: text checkpoints with metadata and the best-checkpoint
//!   index
//! - [`self_play`]: the tick-driven loop tying everything together
//!
//! # Data flow
//!
//! ```text
//! SelfPlayDriver::tick
//!   -> MoveSearch::select_move            (qtris-evaluator)
//!   -> GameSession::execute_action        (qtris-engine)
//!   -> ReplayTrainer::add_experience / train
//!   -> ParameterTuner::record_* / should_switch
//!   -> on game over: record_game, checkpoints, convergence test
//! ```

pub mod checkpoint;
pub mod config;
pub mod convergence;
pub mod exploration;
pub mod parameter_set;
pub mod replay_buffer;
pub mod reward;
pub mod self_play;
pub mod trainer;
pub mod tuner;
