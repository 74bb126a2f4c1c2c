//! Online Q-learning over a replay buffer.
//!
//! The trainer owns the [`ValueNetwork`] being learned together with every
//! piece of state that evolves with it: the replay buffer, the active
//! hyperparameters, the exploration schedule, rolling error and score
//! histories and the convergence detector.

use std::time::{Duration, Instant};

use qtris_evaluator::value_network::{OUTPUT_LIMIT, ValueNetwork};
use qtris_stats::{descriptive::DescriptiveStats, rolling::RollingWindow};
use rand::SeedableRng as _;
use rand_pcg::Pcg32;

use crate::{
    checkpoint::TrainingMetadata,
    convergence::{ConvergenceDetector, ConvergenceSignals},
    exploration::{EpsilonChange, ExplorationSchedule},
    parameter_set::ParameterSet,
    replay_buffer::{Experience, ReplayBuffer},
};

/// Length of the recent error and score windows.
pub const HISTORY_SIZE: usize = 100;
/// Errors needed before [`ReplayTrainer::is_learning`] can report a plateau.
pub const MIN_ERRORS_FOR_TREND: usize = 20;
/// Relative decrease between the oldest and newest quarter that still
/// counts as learning.
pub const LEARNING_MARGIN: f32 = 0.05;
const LEARNING_VARIANCE: f32 = 0.01;
const LEARNING_MEAN_ERROR: f32 = 0.1;

/// Learning-rate reductions for an agent that already plays well:
/// `(max last error, min average score, factor)`, strongest first.
const RATE_REDUCTIONS: [(f32, f32, f32); 2] = [(0.5, 500.0, 0.25), (1.0, 300.0, 0.5)];

/// Error statistics of one training batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchErrorStats {
    /// Mean absolute error; zero when any update in the batch was refused.
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    pub std_dev: f32,
    pub samples: usize,
    /// Samples whose update the network refused as non-finite.
    pub refused: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("training step exceeded its {budget:?} budget after {completed} samples")]
pub struct TrainingTimedOut {
    pub budget: Duration,
    pub completed: usize,
}

#[derive(Debug, Clone)]
pub struct ReplayTrainer {
    network: ValueNetwork,
    buffer: ReplayBuffer,
    params: ParameterSet,
    exploration: ExplorationSchedule,
    recent_errors: RollingWindow<f32>,
    last_batch: Option<BatchErrorStats>,
    recent_scores: RollingWindow<f32>,
    /// Average carried over from a checkpoint until new games are recorded.
    resumed_average: f32,
    best_score: f32,
    games_since_best: u64,
    total_games: u64,
    training_steps: u64,
    convergence: ConvergenceDetector,
    converged: bool,
    rng: Pcg32,
}

impl ReplayTrainer {
    #[must_use]
    pub fn new(network: ValueNetwork, params: ParameterSet, replay_capacity: usize, seed: u64) -> Self {
        Self {
            network,
            buffer: ReplayBuffer::new(replay_capacity),
            exploration: ExplorationSchedule::new(&params),
            params,
            recent_errors: RollingWindow::new(HISTORY_SIZE),
            last_batch: None,
            recent_scores: RollingWindow::new(HISTORY_SIZE),
            resumed_average: 0.0,
            best_score: 0.0,
            games_since_best: 0,
            total_games: 0,
            training_steps: 0,
            convergence: ConvergenceDetector::new(),
            converged: false,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn network(&self) -> &ValueNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut ValueNetwork {
        &mut self.network
    }

    #[must_use]
    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    #[must_use]
    pub fn exploration(&self) -> &ExplorationSchedule {
        &self.exploration
    }

    #[must_use]
    pub fn epsilon(&self) -> f32 {
        self.exploration.epsilon()
    }

    #[must_use]
    pub fn last_batch(&self) -> Option<&BatchErrorStats> {
        self.last_batch.as_ref()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<f32> {
        self.recent_errors.last().copied()
    }

    #[must_use]
    pub fn recent_errors(&self) -> &RollingWindow<f32> {
        &self.recent_errors
    }

    #[must_use]
    pub fn recent_scores(&self) -> &RollingWindow<f32> {
        &self.recent_scores
    }

    /// Mean of the recent scores, or the average restored from a checkpoint
    /// when no game has been recorded since.
    #[must_use]
    pub fn average_score(&self) -> f32 {
        self.recent_scores.mean().unwrap_or(self.resumed_average)
    }

    #[must_use]
    pub fn best_score(&self) -> f32 {
        self.best_score
    }

    #[must_use]
    pub fn games_since_best(&self) -> u64 {
        self.games_since_best
    }

    #[must_use]
    pub fn total_games(&self) -> u64 {
        self.total_games
    }

    #[must_use]
    pub fn training_steps(&self) -> u64 {
        self.training_steps
    }

    pub fn add_experience(&mut self, experience: Experience) {
        self.buffer.push(experience);
    }

    /// Learning rate after reductions for an agent that already plays well.
    #[must_use]
    pub fn effective_learning_rate(&self) -> f32 {
        let base = self.params.learning_rate;
        let Some(last_error) = self.last_error() else {
            return base;
        };
        let average = self.average_score();
        RATE_REDUCTIONS
            .iter()
            .find(|(max_error, min_score, _)| last_error < *max_error && average > *min_score)
            .map_or(base, |(_, _, factor)| base * factor)
    }

    /// Runs one batch of updates.
    ///
    /// Does nothing and returns `None` while the buffer holds fewer entries
    /// than the batch size.
    pub fn train(&mut self) -> Option<BatchErrorStats> {
        let indices = self.batch_indices()?;
        let rate = self.effective_learning_rate();
        let errors = train_batch(&mut self.network, &self.buffer, &indices, rate, self.params.gamma, None)
            .unwrap_or_else(|errors| errors);
        Some(self.commit_batch(&errors))
    }

    /// Like [`train`](Self::train), but abandons the batch once `budget` has
    /// elapsed. The batch runs on a copy of the network that replaces the
    /// live one only when every sample was processed in time.
    pub fn train_within(&mut self, budget: Duration) -> Result<Option<BatchErrorStats>, TrainingTimedOut> {
        let Some(indices) = self.batch_indices() else {
            return Ok(None);
        };
        let deadline = Instant::now() + budget;
        let rate = self.effective_learning_rate();
        let mut network = self.network.clone();
        let errors = train_batch(&mut network, &self.buffer, &indices, rate, self.params.gamma, Some(deadline))
            .map_err(|errors| TrainingTimedOut {
                budget,
                completed: errors.len(),
            })?;
        self.network = network;
        Ok(Some(self.commit_batch(&errors)))
    }

    fn batch_indices(&mut self) -> Option<Vec<usize>> {
        let batch_size = self.params.batch_size;
        if batch_size == 0 || self.buffer.len() < batch_size {
            return None;
        }
        Some(self.buffer.sample_indices(batch_size, &mut self.rng))
    }

    fn commit_batch(&mut self, errors: &[Option<f32>]) -> BatchErrorStats {
        let samples = errors.len();
        let refused = errors.iter().filter(|e| e.is_none()).count();
        let mut stats = DescriptiveStats::new(errors.iter().flatten().copied()).map_or(
            BatchErrorStats {
                mean: 0.0,
                min: 0.0,
                max: 0.0,
                std_dev: 0.0,
                samples,
                refused,
            },
            |s| BatchErrorStats {
                mean: s.mean,
                min: s.min,
                max: s.max,
                std_dev: s.std_dev,
                samples,
                refused,
            },
        );
        if refused > 0 || !stats.mean.is_finite() {
            tracing::warn!(samples, refused, "non-finite batch error; recording zero");
            stats.mean = 0.0;
        }
        tracing::debug!(
            mean = stats.mean,
            min = stats.min,
            max = stats.max,
            std_dev = stats.std_dev,
            "trained batch"
        );
        self.recent_errors.push(stats.mean);
        self.last_batch = Some(stats);
        self.training_steps += 1;
        stats
    }

    /// Whether the recent errors still show learning progress.
    ///
    /// Purely informational; nothing in training depends on it.
    #[must_use]
    pub fn is_learning(&self) -> bool {
        if self.recent_errors.len() < MIN_ERRORS_FOR_TREND {
            return true;
        }
        let errors = self.recent_errors.to_vec();
        let quarter = errors.len() / 4;
        let older = mean(&errors[..quarter]);
        let newer = mean(&errors[errors.len() - quarter..]);
        if newer < older * (1.0 - LEARNING_MARGIN) {
            return true;
        }
        DescriptiveStats::new(errors)
            .is_some_and(|s| s.variance > LEARNING_VARIANCE && s.mean > LEARNING_MEAN_ERROR)
    }

    /// Records a finished game and revises the exploration rate.
    pub fn record_game(&mut self, score: f32) -> Option<EpsilonChange> {
        self.total_games += 1;
        self.recent_scores.push(score);
        self.convergence.record_score(score);
        if score > self.best_score {
            self.best_score = score;
            self.games_since_best = 0;
        } else {
            self.games_since_best += 1;
        }
        self.exploration
            .update(self.total_games, &self.recent_scores.to_vec())
    }

    #[must_use]
    pub fn convergence_signals(&self) -> ConvergenceSignals {
        ConvergenceSignals {
            total_games: self.total_games,
            epsilon_at_floor: self.exploration.is_at_floor(),
            last_batch_error: self.last_batch.map(|b| b.mean),
            games_since_best: self.games_since_best,
        }
    }

    /// Runs the convergence test, logging the first time it passes.
    pub fn check_convergence(&mut self) -> bool {
        let converged = self.convergence.is_converged(&self.convergence_signals());
        if converged && !self.converged {
            tracing::info!(
                total_games = self.total_games,
                average_score = self.average_score(),
                best_score = self.best_score,
                epsilon = self.epsilon(),
                "training converged"
            );
        }
        self.converged = converged;
        converged
    }

    /// Switches to a new hyperparameter set.
    pub fn apply_parameters(&mut self, params: &ParameterSet) {
        self.params = *params;
        self.exploration.set_parameters(params);
    }

    /// Starts a clean evaluation window: forgets recent errors and scores and
    /// the exploration trend. Totals and the best score are kept.
    pub fn reset_histories(&mut self) {
        self.recent_errors.clear();
        self.recent_scores.clear();
        self.last_batch = None;
        self.convergence.clear();
        self.exploration.reset_history();
        self.resumed_average = 0.0;
    }

    #[must_use]
    pub fn metadata(&self) -> TrainingMetadata {
        TrainingMetadata {
            epsilon: self.exploration.epsilon(),
            epsilon_min: self.exploration.epsilon_min(),
            epsilon_decay: self.exploration.epsilon_decay(),
            learning_rate: self.params.learning_rate,
            gamma: self.params.gamma,
            batch_size: self.params.batch_size,
            training_steps: self.training_steps,
            total_games: self.total_games,
            best_score: self.best_score,
            average_score: self.average_score(),
            previous_average_score: self.exploration.previous_average(),
        }
    }

    /// Resumes from checkpoint metadata.
    pub fn restore(&mut self, metadata: &TrainingMetadata) {
        self.exploration.restore(
            metadata.epsilon,
            metadata.epsilon_min,
            metadata.epsilon_decay,
            metadata.previous_average_score,
        );
        if metadata.learning_rate.is_finite() && metadata.learning_rate > 0.0 {
            self.params.learning_rate = metadata.learning_rate;
        }
        if (0.0..=1.0).contains(&metadata.gamma) {
            self.params.gamma = metadata.gamma;
        }
        if metadata.batch_size > 0 {
            self.params.batch_size = metadata.batch_size;
        }
        self.training_steps = metadata.training_steps;
        self.total_games = metadata.total_games;
        if metadata.best_score.is_finite() {
            self.best_score = metadata.best_score;
        }
        if metadata.average_score.is_finite() {
            self.resumed_average = metadata.average_score;
        }
    }
}

/// Updates `network` on the sampled experiences, returning the absolute
/// error of each sample, or `None` where the update was refused. On a missed
/// deadline the errors gathered so far are returned as `Err`.
fn train_batch(
    network: &mut ValueNetwork,
    buffer: &ReplayBuffer,
    indices: &[usize],
    rate: f32,
    gamma: f32,
    deadline: Option<Instant>,
) -> Result<Vec<Option<f32>>, Vec<Option<f32>>> {
    let mut errors = Vec::with_capacity(indices.len());
    for experience in indices.iter().filter_map(|&i| buffer.get(i)) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(errors);
        }
        let target = q_target(network, experience, gamma);
        errors.push(network.update(&experience.state, target, rate).map(f32::abs));
    }
    Ok(errors)
}

fn q_target(network: &ValueNetwork, experience: &Experience, gamma: f32) -> f32 {
    let mut target = experience.reward;
    if !experience.terminal {
        let next_value = network
            .forward(&experience.next_state)
            .clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT);
        target += gamma * next_value;
    }
    target.clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT)
}

#[expect(clippy::cast_precision_loss)]
fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use qtris_engine::{BitBoard, PieceKind, PieceRotation};
    use qtris_evaluator::state_vector::StateVector;

    use super::*;

    fn state() -> StateVector {
        StateVector::from_board(&BitBoard::INITIAL, Some(PieceKind::T), Some(PieceKind::I), 0, 1)
    }

    fn experience(reward: f32, terminal: bool) -> Experience {
        Experience {
            state: state(),
            rotation: PieceRotation::new(0),
            column: 4,
            reward,
            next_state: state(),
            terminal,
        }
    }

    fn trainer(params: ParameterSet) -> ReplayTrainer {
        let network = ValueNetwork::new(&mut Pcg32::seed_from_u64(11));
        ReplayTrainer::new(network, params, 1000, 5)
    }

    #[test]
    fn empty_buffer_is_a_no_op() {
        let mut t = trainer(ParameterSet::MODERATE);
        let before: Vec<f32> = t.network().parameters().collect();
        assert_eq!(t.train(), None);
        assert_eq!(t.network().parameters().collect::<Vec<_>>(), before);
        assert!(t.recent_errors().is_empty());
        assert_eq!(t.training_steps(), 0);
    }

    #[test]
    fn partial_buffer_is_a_no_op() {
        let mut t = trainer(ParameterSet::MODERATE);
        for _ in 0..31 {
            t.add_experience(experience(1.0, false));
        }
        assert_eq!(t.train(), None);
        t.add_experience(experience(1.0, false));
        assert_eq!(t.train().map(|s| s.samples), Some(32));
    }

    #[test]
    fn error_decreases_on_a_fixed_batch() {
        let params = ParameterSet {
            learning_rate: 0.001,
            batch_size: 4,
            ..ParameterSet::MODERATE
        };
        let mut t = trainer(params);
        for _ in 0..4 {
            t.add_experience(experience(5.0, true));
        }
        let mut previous = t.train().unwrap().mean;
        for _ in 0..20 {
            let current = t.train().unwrap().mean;
            assert!(current < previous, "{current} >= {previous}");
            previous = current;
        }
        assert_eq!(t.training_steps(), 21);
    }

    #[test]
    fn targets_are_clipped() {
        let network = ValueNetwork::new(&mut Pcg32::seed_from_u64(1));
        let huge = experience(1e6, true);
        assert_eq!(q_target(&network, &huge, 0.99), OUTPUT_LIMIT);
        let bootstrapped = experience(0.0, false);
        let expected = 0.99 * network.forward(&bootstrapped.next_state);
        assert!((q_target(&network, &bootstrapped, 0.99) - expected).abs() < 1e-6);
    }

    #[test]
    fn zero_budget_leaves_network_untouched() {
        let mut t = trainer(ParameterSet { batch_size: 4, ..ParameterSet::MODERATE });
        for _ in 0..4 {
            t.add_experience(experience(5.0, true));
        }
        let before: Vec<f32> = t.network().parameters().collect();
        let err = t.train_within(Duration::ZERO).unwrap_err();
        assert_eq!(err.completed, 0);
        assert_eq!(t.network().parameters().collect::<Vec<_>>(), before);
        assert_eq!(t.training_steps(), 0);

        let stats = t.train_within(Duration::from_secs(60)).unwrap().unwrap();
        assert_eq!(stats.samples, 4);
        assert_ne!(t.network().parameters().collect::<Vec<_>>(), before);
    }

    #[test]
    fn refused_updates_record_zero_error() {
        let mut t = trainer(ParameterSet { batch_size: 4, ..ParameterSet::MODERATE });
        for _ in 0..4 {
            t.add_experience(experience(5.0, true));
        }
        t.params.learning_rate = f32::INFINITY;
        let before: Vec<f32> = t.network().parameters().collect();

        let stats = t.train().unwrap();
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.refused, 4);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(t.last_error(), Some(0.0));
        assert_eq!(t.training_steps(), 1);
        assert_eq!(t.network().parameters().collect::<Vec<_>>(), before);
    }

    #[test]
    fn learning_rate_drops_for_strong_agents() {
        let mut t = trainer(ParameterSet { batch_size: 1, ..ParameterSet::MODERATE });
        assert_eq!(t.effective_learning_rate(), 0.002);

        t.recent_errors.push(0.8);
        t.record_game(400.0);
        assert!((t.effective_learning_rate() - 0.001).abs() < 1e-9);

        t.recent_errors.push(0.3);
        t.record_game(1000.0);
        assert!((t.effective_learning_rate() - 0.0005).abs() < 1e-9);
    }

    #[test]
    fn learning_classification() {
        let mut t = trainer(ParameterSet::MODERATE);
        for _ in 0..19 {
            t.recent_errors.push(0.0);
        }
        assert!(t.is_learning());

        t.recent_errors.push(0.0);
        assert!(!t.is_learning());

        t.recent_errors.clear();
        for i in (1..=40_u8).rev() {
            t.recent_errors.push(f32::from(i) / 10.0);
        }
        assert!(t.is_learning());

        t.recent_errors.clear();
        for i in 0..40 {
            t.recent_errors.push(if i % 2 == 0 { 0.5 } else { 1.0 });
        }
        // Flat but noisy and large.
        assert!(t.is_learning());
    }

    #[test]
    fn games_track_best_score() {
        let mut t = trainer(ParameterSet::MODERATE);
        t.record_game(100.0);
        t.record_game(50.0);
        t.record_game(70.0);
        assert_eq!(t.total_games(), 3);
        assert_eq!(t.best_score(), 100.0);
        assert_eq!(t.games_since_best(), 2);
        assert!((t.average_score() - 220.0 / 3.0).abs() < 1e-4);
        assert!(!t.check_convergence());
    }

    #[test]
    fn metadata_round_trips_through_restore() {
        let mut t = trainer(ParameterSet::MODERATE);
        for score in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0] {
            t.record_game(score);
        }
        let metadata = t.metadata();

        let mut resumed = trainer(ParameterSet::PRESETS[2]);
        resumed.restore(&metadata);
        assert_eq!(resumed.metadata(), metadata);
    }

    #[test]
    fn switching_parameters_resets_histories() {
        let mut t = trainer(ParameterSet::MODERATE);
        t.recent_errors.push(1.0);
        t.record_game(10.0);
        t.apply_parameters(&ParameterSet::PRESETS[5]);
        t.reset_histories();
        assert_eq!(t.parameters().batch_size, 64);
        assert!(t.recent_errors().is_empty());
        assert!(t.recent_scores().is_empty());
        assert_eq!(t.total_games(), 1);
        assert_eq!(t.best_score(), 10.0);
    }
}
