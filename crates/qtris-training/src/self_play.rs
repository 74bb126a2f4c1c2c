//! Tick-driven self-play loop.
//!
//! Each [`tick`](SelfPlayDriver::tick) that passes the rate gate performs, in
//! order: perception, action selection, action execution, experience storage,
//! one training batch, the exploration update when the game ended, tuner
//! bookkeeping and finally checkpoints and the convergence test. Nothing blocks;
//! over-budget search or training is dropped and retried on a later tick.

use std::time::Instant;

use qtris_engine::{GameSession, PieceRotation};
use qtris_evaluator::{
    move_search::{Move, MoveSearch, SearchResult},
    state_vector::StateVector,
    value_network::ValueNetwork,
};
use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{
    checkpoint::{BestCheckpointIndex, CheckpointError},
    config::TrainingConfig,
    exploration::{EpsilonChange, MILESTONE_SCORES},
    parameter_set::ParameterSet,
    replay_buffer::Experience,
    reward::action_reward,
    trainer::{BatchErrorStats, ReplayTrainer},
    tuner::ParameterTuner,
};

/// Column tried when no placement is admissible; the session then falls back
/// to the spawn placement and ends the game.
const FALLBACK_COLUMN: i8 = 4;

/// What one call of [`SelfPlayDriver::tick`] did.
#[derive(Debug, Clone, PartialEq, derive_more::IsVariant)]
pub enum TickOutcome {
    /// The driver is switched off.
    Disabled,
    /// Too early since the previous action.
    Waiting,
    /// The move search ran out of time; no action was taken.
    SearchTimedOut,
    Moved {
        chosen: Move,
        reward: f32,
        /// Batch statistics when training ran this tick.
        trained: Option<BatchErrorStats>,
    },
    GameOver {
        score: usize,
        lines: usize,
        epsilon_change: Option<EpsilonChange>,
        converged: bool,
    },
}

/// Read-only view of the agent for presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSnapshot {
    pub enabled: bool,
    pub training: bool,
    pub epsilon: f32,
    /// Exploration rate when the average first reached each of
    /// [`MILESTONE_SCORES`].
    pub epsilon_milestones: [Option<f32>; MILESTONE_SCORES.len()],
    pub epsilon_increases: u64,
    pub epsilon_decreases: u64,
    pub parameter_set: &'static str,
    pub learning_rate: f32,
    pub total_games: u64,
    pub training_steps: u64,
    pub average_score: f32,
    pub best_score: f32,
    pub last_batch: Option<BatchErrorStats>,
    pub is_learning: bool,
    pub converged: bool,
    pub replay_len: usize,
    pub terminal_fraction: f32,
    pub current_score: usize,
    pub current_lines: usize,
}

#[derive(Debug)]
pub struct SelfPlayDriver {
    config: TrainingConfig,
    session: GameSession,
    trainer: ReplayTrainer,
    tuner: ParameterTuner,
    best_index: Option<BestCheckpointIndex>,
    rng: Pcg32,
    last_action: Option<Instant>,
    enabled: bool,
    training: bool,
    games_since_checkpoint: u64,
    converged: bool,
}

impl SelfPlayDriver {
    #[must_use]
    pub fn new(config: TrainingConfig) -> Self {
        let mut rng = config.seed.map_or_else(Pcg32::from_os_rng, Pcg32::seed_from_u64);
        let network = ValueNetwork::new(&mut rng);
        let trainer = ReplayTrainer::new(network, ParameterSet::MODERATE, config.replay_capacity, rng.random());
        let session = GameSession::with_seed(rng.random());

        let mut tuner = ParameterTuner::default();
        tuner.set_enabled(config.auto_tune);

        let best_index = config.best_index_path.as_ref().and_then(|path| {
            BestCheckpointIndex::open(path)
                .inspect_err(|error| tracing::warn!(%error, "best checkpoints disabled"))
                .ok()
        });

        Self {
            config,
            session,
            trainer,
            tuner,
            best_index,
            rng,
            last_action: None,
            enabled: true,
            training: true,
            games_since_checkpoint: 0,
            converged: false,
        }
    }

    /// Resumes from the configured checkpoint, returning whether it loaded.
    pub fn load_checkpoint(&mut self) -> bool {
        self.trainer.load(&self.config.checkpoint_path)
    }

    pub fn save(&self) -> Result<(), CheckpointError> {
        self.trainer.save(&self.config.checkpoint_path)
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    #[must_use]
    pub fn trainer(&self) -> &ReplayTrainer {
        &self.trainer
    }

    #[must_use]
    pub fn tuner(&self) -> &ParameterTuner {
        &self.tuner
    }

    #[must_use]
    pub fn best_index(&self) -> Option<&BestCheckpointIndex> {
        self.best_index.as_ref()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// With training off the agent plays greedily and learns nothing.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    #[must_use]
    pub fn snapshot(&self) -> AgentSnapshot {
        let params = self.trainer.parameters();
        let exploration = self.trainer.exploration();
        let stats = self.session.stats();
        AgentSnapshot {
            enabled: self.enabled,
            training: self.training,
            epsilon: self.trainer.epsilon(),
            epsilon_milestones: *exploration.milestones(),
            epsilon_increases: exploration.increases(),
            epsilon_decreases: exploration.decreases(),
            parameter_set: params.name,
            learning_rate: self.trainer.effective_learning_rate(),
            total_games: self.trainer.total_games(),
            training_steps: self.trainer.training_steps(),
            average_score: self.trainer.average_score(),
            best_score: self.trainer.best_score(),
            last_batch: self.trainer.last_batch().copied(),
            is_learning: self.trainer.is_learning(),
            converged: self.converged,
            replay_len: self.trainer.buffer().len(),
            terminal_fraction: self.trainer.buffer().terminal_fraction(),
            current_score: stats.score(),
            current_lines: stats.total_cleared_lines(),
        }
    }

    /// Advances the agent by at most one action.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if !self.enabled {
            return TickOutcome::Disabled;
        }
        if self
            .last_action
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.tick_interval())
        {
            return TickOutcome::Waiting;
        }
        self.last_action = Some(now);

        let state = StateVector::from_session(&self.session);

        let Some(search) = self.search() else {
            return TickOutcome::SearchTimedOut;
        };
        let chosen = search.best.unwrap_or(Move {
            rotation: PieceRotation::new(0),
            column: FALLBACK_COLUMN,
            value: 0.0,
            explored: false,
        });
        self.act(state, chosen)
    }

    /// Executes `chosen` from the perceived `state` and learns from it.
    fn act(&mut self, state: StateVector, chosen: Move) -> TickOutcome {
        let holes_before = self.session.field().board().num_holes();
        let outcome = match self.session.execute_action(chosen.rotation, chosen.column) {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(%error, "action on a finished game; starting a new one");
                self.session.reset();
                return TickOutcome::Waiting;
            }
        };
        let holes_after = self.session.field().board().num_holes();
        let reward = action_reward(&outcome, holes_before, holes_after);

        let mut trained = None;
        if self.training {
            self.trainer.add_experience(Experience {
                state,
                rotation: outcome.placed.rotation(),
                column: outcome.placed.column(),
                reward,
                next_state: StateVector::from_session(&self.session),
                terminal: outcome.game_over,
            });
            trained = self.train_step();
        }

        if outcome.game_over {
            return self.finish_game(trained.as_ref());
        }
        self.tune(trained.as_ref());
        TickOutcome::Moved {
            chosen,
            reward,
            trained,
        }
    }

    fn search(&mut self) -> Option<SearchResult> {
        let exploring = self.training && self.rng.random::<f32>() < self.trainer.epsilon();
        let search = MoveSearch::new(self.trainer.network());
        match self.config.search_budget() {
            None => Some(search.select_move(&self.session, exploring, &mut self.rng)),
            Some(budget) => search
                .select_move_within(&self.session, exploring, &mut self.rng, budget)
                .inspect_err(|error| tracing::warn!(%error, "skipping move"))
                .ok(),
        }
    }

    fn train_step(&mut self) -> Option<BatchErrorStats> {
        match self.config.train_budget() {
            None => self.trainer.train(),
            Some(budget) => self
                .trainer
                .train_within(budget)
                .inspect_err(|error| tracing::warn!(%error, "abandoned training batch"))
                .ok()
                .flatten(),
        }
    }

    /// Feeds a completed batch to the tuner and applies a parameter switch.
    fn tune(&mut self, trained: Option<&BatchErrorStats>) {
        let Some(stats) = trained else {
            return;
        };
        self.tuner.record_error(stats.mean);
        self.tuner.record_epsilon(self.trainer.epsilon());
        if self.tuner.should_switch() {
            self.trainer.apply_parameters(self.tuner.current());
            self.trainer.reset_histories();
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn finish_game(&mut self, trained: Option<&BatchErrorStats>) -> TickOutcome {
        let stats = self.session.stats();
        let (score, lines) = (stats.score(), stats.total_cleared_lines());
        self.session.reset();

        if !self.training {
            return TickOutcome::GameOver {
                score,
                lines,
                epsilon_change: None,
                converged: self.converged,
            };
        }

        let score_value = score as f32;
        let epsilon_change = self.trainer.record_game(score_value);
        self.tuner.record_score(score_value);
        self.tune(trained);
        tracing::debug!(
            score,
            lines,
            total_games = self.trainer.total_games(),
            epsilon = self.trainer.epsilon(),
            "game over"
        );

        if let Some(index) = &mut self.best_index
            && score_value >= self.trainer.best_score()
            && let Err(error) = index.record_if_better(&self.trainer, score_value)
        {
            tracing::warn!(%error, "could not record best checkpoint");
        }

        self.games_since_checkpoint += 1;
        if self.config.checkpoint_interval > 0 && self.games_since_checkpoint >= self.config.checkpoint_interval {
            self.games_since_checkpoint = 0;
            if let Err(error) = self.save() {
                tracing::warn!(%error, "periodic checkpoint failed");
            }
        }

        self.converged = self.trainer.check_convergence();
        TickOutcome::GameOver {
            score,
            lines,
            epsilon_change,
            converged: self.converged,
        }
    }

    /// Whether a training run should end: the game limit was reached, or
    /// training converged and the configuration asks to stop then.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.config
            .max_games
            .is_some_and(|max| self.trainer.total_games() >= max)
            || (self.config.stop_on_convergence && self.converged)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use qtris_engine::{BitBoard, GameField, PieceKind};

    use super::*;

    fn config(dir: &tempfile::TempDir) -> TrainingConfig {
        TrainingConfig {
            tick_interval_ms: 0,
            search_budget_ms: 0,
            train_budget_ms: 0,
            checkpoint_path: dir.path().join("model.txt"),
            best_index_path: Some(dir.path().join("best.json")),
            checkpoint_interval: 2,
            replay_capacity: 500,
            seed: Some(42),
            max_games: Some(3),
            ..TrainingConfig::default()
        }
    }

    fn play_until_stop(driver: &mut SelfPlayDriver) -> Vec<TickOutcome> {
        let start = Instant::now();
        let mut outcomes = vec![];
        for _ in 0..20_000 {
            if driver.should_stop() {
                break;
            }
            outcomes.push(driver.tick(start));
        }
        outcomes
    }

    #[test]
    fn disabled_driver_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SelfPlayDriver::new(config(&dir));
        driver.set_enabled(false);
        assert_eq!(driver.tick(Instant::now()), TickOutcome::Disabled);
        assert_eq!(driver.session().stats().completed_pieces(), 0);
    }

    #[test]
    fn ticks_are_rate_limited() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SelfPlayDriver::new(TrainingConfig {
            tick_interval_ms: 50,
            ..config(&dir)
        });
        let start = Instant::now();
        assert!(!driver.tick(start).is_waiting());
        assert!(driver.tick(start + Duration::from_millis(10)).is_waiting());
        assert!(!driver.tick(start + Duration::from_millis(60)).is_waiting());
    }

    #[test]
    fn training_run_plays_learns_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SelfPlayDriver::new(config(&dir));
        let outcomes = play_until_stop(&mut driver);

        let games = outcomes.iter().filter(|o| o.is_game_over()).count();
        assert_eq!(games, 3);
        let snapshot = driver.snapshot();
        assert_eq!(snapshot.total_games, 3);
        assert!(snapshot.replay_len > 0);
        assert!(snapshot.training_steps > 0);
        assert!(snapshot.terminal_fraction > 0.0);
        assert!(dir.path().join("model.txt").exists());
        assert!(driver.best_index().and_then(BestCheckpointIndex::best).is_some());

        driver.save().unwrap();
        let mut resumed = SelfPlayDriver::new(config(&dir));
        assert!(resumed.load_checkpoint());
        assert_eq!(resumed.trainer().total_games(), 3);
    }

    #[test]
    fn stored_experience_uses_the_placed_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SelfPlayDriver::new(config(&dir));
        driver.session = GameSession::from_field(GameField::from_parts(
            BitBoard::from_ascii(".........."),
            PieceKind::T,
            PieceKind::O,
        ));
        let state = StateVector::from_session(&driver.session);
        let chosen = Move {
            rotation: PieceRotation::new(0),
            column: 11,
            value: 0.0,
            explored: false,
        };
        assert!(driver.act(state, chosen).is_moved());

        let stored = driver.trainer().buffer().get(0).unwrap();
        assert_eq!(stored.column, 7);
        assert_eq!(stored.rotation, PieceRotation::new(0));
    }

    #[test]
    fn tuner_sees_rate_after_exploration_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SelfPlayDriver::new(TrainingConfig {
            max_games: Some(8),
            auto_tune: false,
            ..config(&dir)
        });
        let start = Instant::now();
        let mut checked = 0;
        for _ in 0..50_000 {
            if driver.should_stop() {
                break;
            }
            let steps = driver.trainer().training_steps();
            let outcome = driver.tick(start);
            if outcome.is_game_over() && driver.trainer().training_steps() > steps {
                assert_eq!(driver.tuner().last_epsilon(), Some(driver.trainer().epsilon()));
                checked += 1;
            }
        }
        assert!(checked > 0);

        let snapshot = driver.snapshot();
        assert_eq!(&snapshot.epsilon_milestones, driver.trainer().exploration().milestones());
        assert_eq!(
            snapshot.epsilon_increases + snapshot.epsilon_decreases,
            driver.trainer().exploration().increases() + driver.trainer().exploration().decreases()
        );
    }

    #[test]
    fn greedy_play_does_not_learn() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = SelfPlayDriver::new(config(&dir));
        driver.set_training(false);
        for _ in 0..50 {
            match driver.tick(Instant::now()) {
                TickOutcome::Moved { chosen, trained, .. } => {
                    assert!(!chosen.explored);
                    assert_eq!(trained, None);
                }
                TickOutcome::GameOver { epsilon_change, .. } => assert_eq!(epsilon_change, None),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(driver.trainer().buffer().len(), 0);
        assert_eq!(driver.trainer().total_games(), 0);
    }
}
