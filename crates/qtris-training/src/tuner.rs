//! Rotation of hyperparameter sets driven by recent performance.
//!
//! The tuner only looks at what the trainer reports through
//! [`record_error`](ParameterTuner::record_error),
//! [`record_score`](ParameterTuner::record_score) and
//! [`record_epsilon`](ParameterTuner::record_epsilon). Every
//! [`EVALUATION_INTERVAL`] calls of
//! [`should_switch`](ParameterTuner::should_switch) it judges the active set.
//! The first judgement only records a baseline; later ones advance to the
//! next set (wrapping around) when performance looks poor, and clear the
//! histories so that the new set is judged on its own games.

use std::fmt;

use qtris_stats::{rolling::RollingWindow, trend::WindowComparison};

use crate::parameter_set::ParameterSet;

/// Calls to `should_switch` between two evaluations.
pub const EVALUATION_INTERVAL: u64 = 500;
/// Scores required before an evaluation counts.
pub const MIN_GAMES_FOR_EVAL: usize = 50;
pub const HISTORY_SIZE: usize = 100;
/// Samples per window of the trend comparisons.
pub const TREND_WINDOW: usize = 10;

const POOR_AVERAGE_SCORE: f32 = 100.0;
const LOW_AVERAGE_SCORE: f32 = 300.0;
const MIN_SCORE_IMPROVEMENT: f32 = 1.0;
const HIGH_AVERAGE_ERROR: f32 = 10.0;
const MIN_ERROR_REDUCTION: f32 = 5.0;

/// Performance summary derived from the rolling histories.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceMetrics {
    pub average_error: f32,
    pub average_score: f32,
    /// Mean of the last 10 scores against the 10 before, in percent.
    pub score_improvement_percent: f32,
    /// Decrease of the last 10 errors against the 10 before, in percent.
    pub error_reduction_percent: f32,
    pub games: usize,
}

impl PerformanceMetrics {
    fn from_histories(errors: &RollingWindow<f32>, scores: &RollingWindow<f32>) -> Self {
        let errors = errors.to_vec();
        let scores = scores.to_vec();
        Self {
            average_error: mean(&errors),
            average_score: mean(&scores),
            score_improvement_percent: WindowComparison::of_last(&scores, TREND_WINDOW)
                .map_or(0.0, |cmp| cmp.percent_change()),
            error_reduction_percent: WindowComparison::of_last(&errors, TREND_WINDOW)
                .map_or(0.0, |cmp| cmp.percent_reduction()),
            games: scores.len(),
        }
    }

    /// Whether the active parameter set should be replaced.
    #[must_use]
    pub fn is_poor(&self) -> bool {
        self.average_score < POOR_AVERAGE_SCORE
            || (self.score_improvement_percent < MIN_SCORE_IMPROVEMENT
                && self.average_score < LOW_AVERAGE_SCORE)
            || (self.error_reduction_percent < 0.0 && self.average_error > 1.0)
            || (self.average_error > HIGH_AVERAGE_ERROR
                && self.error_reduction_percent < MIN_ERROR_REDUCTION)
    }
}

#[derive(Debug, Clone)]
pub struct ParameterTuner {
    sets: Vec<ParameterSet>,
    current: usize,
    enabled: bool,
    iteration: u64,
    last_evaluation: Option<u64>,
    baseline: Option<PerformanceMetrics>,
    switches: u64,
    errors: RollingWindow<f32>,
    epsilons: RollingWindow<f32>,
    scores: RollingWindow<f32>,
}

impl Default for ParameterTuner {
    fn default() -> Self {
        Self::new(ParameterSet::PRESETS.to_vec())
    }
}

impl ParameterTuner {
    /// # Panics
    ///
    /// Panics if `sets` is empty.
    #[must_use]
    pub fn new(sets: Vec<ParameterSet>) -> Self {
        assert!(!sets.is_empty(), "the tuner needs at least one parameter set");
        Self {
            sets,
            current: 0,
            enabled: true,
            iteration: 0,
            last_evaluation: None,
            baseline: None,
            switches: 0,
            errors: RollingWindow::new(HISTORY_SIZE),
            epsilons: RollingWindow::new(HISTORY_SIZE),
            scores: RollingWindow::new(HISTORY_SIZE),
        }
    }

    #[must_use]
    pub fn current(&self) -> &ParameterSet {
        &self.sets[self.current]
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn sets(&self) -> &[ParameterSet] {
        &self.sets
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn switches(&self) -> u64 {
        self.switches
    }

    #[must_use]
    pub fn baseline(&self) -> Option<&PerformanceMetrics> {
        self.baseline.as_ref()
    }

    pub fn record_error(&mut self, error: f32) {
        self.errors.push(error);
    }

    pub fn record_epsilon(&mut self, epsilon: f32) {
        self.epsilons.push(epsilon);
    }

    pub fn record_score(&mut self, score: f32) {
        self.scores.push(score);
    }

    #[must_use]
    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::from_histories(&self.errors, &self.scores)
    }

    /// Counts one iteration and, when an evaluation is due, decides whether
    /// to move on to the next parameter set.
    ///
    /// Returns `true` after switching; the caller should then apply
    /// [`current`](Self::current) and reset its own rolling histories.
    pub fn should_switch(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.iteration += 1;

        let since = self.iteration - self.last_evaluation.unwrap_or(0);
        if since < EVALUATION_INTERVAL || self.scores.len() < MIN_GAMES_FOR_EVAL {
            return false;
        }

        let metrics = self.metrics();
        if self.last_evaluation.is_none() {
            tracing::info!(
                average_score = metrics.average_score,
                average_error = metrics.average_error,
                "parameter tuner baseline recorded"
            );
            self.baseline = Some(metrics);
            self.last_evaluation = Some(self.iteration);
            return false;
        }
        if !metrics.is_poor() {
            return false;
        }

        self.last_evaluation = Some(self.iteration);
        let previous = self.current().name;
        self.current = (self.current + 1) % self.sets.len();
        self.switches += 1;
        self.reset_histories();
        tracing::info!(
            from = previous,
            to = self.current().name,
            average_score = metrics.average_score,
            average_error = metrics.average_error,
            score_improvement_percent = metrics.score_improvement_percent,
            error_reduction_percent = metrics.error_reduction_percent,
            "switched parameter set"
        );
        true
    }

    fn reset_histories(&mut self) {
        self.errors.clear();
        self.epsilons.clear();
        self.scores.clear();
    }

    /// Human-readable summary of the tuner state.
    #[must_use]
    pub fn report(&self) -> TuningReport<'_> {
        TuningReport { tuner: self }
    }

    /// The exploration rate recorded last.
    #[must_use]
    pub fn last_epsilon(&self) -> Option<f32> {
        self.epsilons.last().copied()
    }
}

/// Display adapter returned by [`ParameterTuner::report`].
#[derive(Debug, Clone, Copy)]
pub struct TuningReport<'a> {
    tuner: &'a ParameterTuner,
}

impl fmt::Display for TuningReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tuner = self.tuner;
        let current = tuner.current();
        let metrics = tuner.metrics();
        writeln!(f, "=== Parameter Tuning Report ===")?;
        writeln!(f, "Iteration: {}", tuner.iteration)?;
        writeln!(f, "Auto-tuning: {}", if tuner.enabled { "on" } else { "off" })?;
        writeln!(
            f,
            "Parameter set: {} ({}/{}), {} switches",
            current.name,
            tuner.current + 1,
            tuner.sets.len(),
            tuner.switches
        )?;
        writeln!(
            f,
            "  learning rate {:.4}, gamma {:.3}, epsilon decay {:.3}, epsilon min {:.3}, batch {}",
            current.learning_rate, current.gamma, current.epsilon_decay, current.epsilon_min, current.batch_size
        )?;
        writeln!(f, "Games in window: {}", metrics.games)?;
        writeln!(f, "  avg error {:.3}, avg score {:.1}", metrics.average_error, metrics.average_score)?;
        writeln!(
            f,
            "  score improvement {:.2}%, error reduction {:.2}%",
            metrics.score_improvement_percent, metrics.error_reduction_percent
        )?;
        let epsilons = tuner.epsilons.to_vec();
        if let [first, .., last] = epsilons.as_slice() {
            let trend = if first > last { "decreasing" } else { "not decreasing" };
            writeln!(f, "Epsilon trend: {first:.3} -> {last:.3} ({trend})")?;
        }
        Ok(())
    }
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
    use super::*;

    fn tuner_with_scores(score: f32, games: usize) -> ParameterTuner {
        let mut tuner = ParameterTuner::default();
        for _ in 0..games {
            tuner.record_score(score);
            tuner.record_error(2.0);
        }
        tuner
    }

    /// Calls `should_switch` until an evaluation has happened `n` times or the
    /// tuner switched, returning whether it switched.
    fn run_intervals(tuner: &mut ParameterTuner, n: u64) -> bool {
        (0..EVALUATION_INTERVAL * n).any(|_| tuner.should_switch())
    }

    #[test]
    fn presets_start_with_moderate() {
        let tuner = ParameterTuner::default();
        assert_eq!(tuner.sets().len(), 7);
        assert_eq!(tuner.current(), &ParameterSet::MODERATE);
    }

    #[test]
    fn never_switches_without_enough_games() {
        let mut tuner = tuner_with_scores(0.0, MIN_GAMES_FOR_EVAL - 1);
        assert!(!run_intervals(&mut tuner, 5));
        assert!(tuner.baseline().is_none());
        assert_eq!(tuner.current_index(), 0);
    }

    #[test]
    fn first_evaluation_only_records_baseline() {
        let mut tuner = tuner_with_scores(10.0, MIN_GAMES_FOR_EVAL);
        assert!(!run_intervals(&mut tuner, 1));
        assert!(tuner.baseline().is_some());
        assert_eq!(tuner.current_index(), 0);
    }

    #[test]
    fn poor_performance_advances_and_clears() {
        let mut tuner = tuner_with_scores(10.0, MIN_GAMES_FOR_EVAL);
        run_intervals(&mut tuner, 1);
        assert!(run_intervals(&mut tuner, 1));
        assert_eq!(tuner.current_index(), 1);
        assert_eq!(tuner.current().name, "conservative");
        assert_eq!(tuner.metrics().games, 0);
        assert_eq!(tuner.switches(), 1);
    }

    #[test]
    fn good_performance_keeps_the_set() {
        let mut tuner = ParameterTuner::default();
        for i in 0..60_u16 {
            tuner.record_score(1000.0 + f32::from(i) * 10.0);
            tuner.record_error(0.5);
        }
        assert!(!run_intervals(&mut tuner, 3));
        assert_eq!(tuner.current_index(), 0);
    }

    #[test]
    fn rotation_wraps_around() {
        let mut tuner = tuner_with_scores(10.0, MIN_GAMES_FOR_EVAL);
        run_intervals(&mut tuner, 1);
        for expected in (1..7).chain([0]) {
            for _ in 0..MIN_GAMES_FOR_EVAL {
                tuner.record_score(10.0);
            }
            assert!(run_intervals(&mut tuner, 1));
            assert_eq!(tuner.current_index(), expected);
        }
    }

    #[test]
    fn disabled_tuner_is_inert() {
        let mut tuner = tuner_with_scores(0.0, MIN_GAMES_FOR_EVAL);
        tuner.set_enabled(false);
        assert!(!run_intervals(&mut tuner, 3));
        assert!(tuner.report().to_string().contains("Auto-tuning: off"));
    }

    #[test]
    fn poor_rules() {
        let base = PerformanceMetrics {
            average_error: 0.5,
            average_score: 1000.0,
            score_improvement_percent: 5.0,
            error_reduction_percent: 5.0,
            games: 100,
        };
        assert!(!base.is_poor());
        assert!(PerformanceMetrics { average_score: 50.0, ..base }.is_poor());
        assert!(PerformanceMetrics { average_score: 250.0, score_improvement_percent: 0.0, ..base }.is_poor());
        assert!(PerformanceMetrics { average_error: 2.0, error_reduction_percent: -1.0, ..base }.is_poor());
        assert!(PerformanceMetrics { average_error: 20.0, error_reduction_percent: 2.0, ..base }.is_poor());
    }

    #[test]
    fn report_mentions_current_set() {
        let mut tuner = tuner_with_scores(200.0, 20);
        tuner.record_epsilon(1.0);
        tuner.record_epsilon(0.5);
        let report = tuner.report().to_string();
        assert!(report.contains("Parameter set: moderate (1/7)"));
        assert!(report.contains("Epsilon trend: 1.000 -> 0.500 (decreasing)"));
        assert_eq!(tuner.last_epsilon(), Some(0.5));
    }
}
