//! Heuristic test for "training has settled".
//!
//! All of the following must hold at once:
//!
//! - at least [`MIN_GAMES`] games have been completed
//! - at least [`MIN_STABLE_SCORES`] recent scores are available
//! - their coefficient of variation is at most [`MAX_SCORE_CV`]
//! - the exploration rate sits at its floor
//! - the last batch error is below [`MAX_BATCH_ERROR`]
//! - the best score has not improved for [`PLATEAU_GAMES`] games, or the
//!   least-squares slope of recent scores relative to their mean is at most
//!   [`MAX_RELATIVE_SLOPE`] per game

use qtris_stats::{descriptive::DescriptiveStats, rolling::RollingWindow, trend};

pub const MIN_GAMES: u64 = 1000;
/// Number of recent scores kept for the test.
pub const SCORE_WINDOW: usize = 500;
pub const MIN_STABLE_SCORES: usize = 200;
pub const MAX_SCORE_CV: f32 = 0.05;
pub const MAX_BATCH_ERROR: f32 = 1.0;
pub const PLATEAU_GAMES: u64 = 500;
pub const MAX_RELATIVE_SLOPE: f32 = 0.0005;

/// Trainer state the detector looks at besides its own score window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceSignals {
    pub total_games: u64,
    pub epsilon_at_floor: bool,
    pub last_batch_error: Option<f32>,
    pub games_since_best: u64,
}

#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    scores: RollingWindow<f32>,
}

impl Default for ConvergenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvergenceDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scores: RollingWindow::new(SCORE_WINDOW),
        }
    }

    pub fn record_score(&mut self, score: f32) {
        self.scores.push(score);
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }

    #[must_use]
    pub fn is_converged(&self, signals: &ConvergenceSignals) -> bool {
        if signals.total_games < MIN_GAMES || self.scores.len() < MIN_STABLE_SCORES {
            return false;
        }
        let Some(stats) = DescriptiveStats::new(self.scores.iter().copied()) else {
            return false;
        };
        let stable = stats
            .coefficient_of_variation()
            .is_some_and(|cv| cv <= MAX_SCORE_CV);
        let error_low = signals
            .last_batch_error
            .is_some_and(|error| error < MAX_BATCH_ERROR);
        let plateau = signals.games_since_best >= PLATEAU_GAMES
            || trend::linear_slope(self.scores.iter().copied())
                .is_some_and(|slope| (slope / stats.mean).abs() <= MAX_RELATIVE_SLOPE);

        stable && signals.epsilon_at_floor && error_low && plateau
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn settled() -> ConvergenceSignals {
        ConvergenceSignals {
            total_games: 2000,
            epsilon_at_floor: true,
            last_batch_error: Some(0.2),
            games_since_best: 0,
        }
    }

    fn detector_with(scores: impl IntoIterator<Item = f32>) -> ConvergenceDetector {
        let mut detector = ConvergenceDetector::new();
        for score in scores {
            detector.record_score(score);
        }
        detector
    }

    fn steady_scores() -> impl Iterator<Item = f32> {
        (0..SCORE_WINDOW).map(|i| if i % 2 == 0 { 1010.0 } else { 990.0 })
    }

    #[test]
    fn steady_scores_converge() {
        assert!(detector_with(steady_scores()).is_converged(&settled()));
    }

    #[test]
    fn too_few_games_never_converge() {
        let detector = detector_with(steady_scores());
        let signals = ConvergenceSignals {
            total_games: MIN_GAMES - 1,
            ..settled()
        };
        assert!(!detector.is_converged(&signals));
    }

    #[test]
    fn each_signal_is_required() {
        let detector = detector_with(steady_scores());
        assert!(!detector.is_converged(&ConvergenceSignals {
            epsilon_at_floor: false,
            ..settled()
        }));
        assert!(!detector.is_converged(&ConvergenceSignals {
            last_batch_error: Some(1.5),
            ..settled()
        }));
        assert!(!detector.is_converged(&ConvergenceSignals {
            last_batch_error: None,
            ..settled()
        }));
        assert!(!detector_with(steady_scores().take(MIN_STABLE_SCORES - 1)).is_converged(&settled()));
    }

    #[test]
    fn noisy_scores_do_not_converge() {
        let detector = detector_with((0..SCORE_WINDOW).map(|i| if i % 2 == 0 { 1500.0 } else { 500.0 }));
        assert!(!detector.is_converged(&settled()));
    }

    proptest! {
        #[test]
        fn never_converged_below_min_games(
            total_games in 0..MIN_GAMES,
            score in 0.0f32..5000.0,
            count in 0..SCORE_WINDOW,
            at_floor in any::<bool>(),
            error in prop::option::of(0.0f32..2.0),
            games_since_best in 0..5000_u64,
        ) {
            let detector = detector_with(std::iter::repeat_n(score, count));
            let signals = ConvergenceSignals {
                total_games,
                epsilon_at_floor: at_floor,
                last_batch_error: error,
                games_since_best,
            };
            prop_assert!(!detector.is_converged(&signals));
        }
    }
}
