//! Adaptive exploration rate.
//!
//! The rate is revised once per completed game by a prioritized rule table.
//! Only the first matching rule applies:
//!
//! | priority | rule                       | condition                                                        | effect                  |
//! |----------|----------------------------|------------------------------------------------------------------|-------------------------|
//! | 1        | [`StuckEscape`]            | average < 200 with no positive trend for 50 consecutive games    | ×1.05, floor escape ×3  |
//! | 2        | [`Degradation`]            | improvement < −1% and (average < 300 or average < 90% of before) | ×1.10, floor escape ×2.5|
//! | 3        | [`Improvement`]            | improvement > 1%                                                 | ×(decay × 0.99)         |
//! | 4        | [`BaselineDecay`]          | at least 5 games                                                 | ×decay                  |
//!
//! Rules 1 to 3 need at least 10 games. The result is clamped into
//! `[epsilon_min, 1.0]`. An average above 500 never triggers rule 2 unless it
//! fell by more than 10%, so a strong agent is not pushed back into
//! exploration by minor dips.
//!
//! A *floor escape* replaces a rate sitting at (or just above) the floor by a
//! small multiple of the floor, since a percentage increase of a near-zero
//! rate would take hundreds of games to matter.
//!
//! [`StuckEscape`]: ExplorationRule::StuckEscape
//! [`Degradation`]: ExplorationRule::Degradation
//! [`Improvement`]: ExplorationRule::Improvement
//! [`BaselineDecay`]: ExplorationRule::BaselineDecay

use qtris_stats::trend::{self, WindowComparison};

use crate::parameter_set::ParameterSet;

pub const INITIAL_EPSILON: f32 = 1.0;
pub const MAX_EPSILON: f32 = 1.0;

const MIN_GAMES_FOR_DECAY: u64 = 5;
const MIN_GAMES_FOR_ADJUSTMENT: u64 = 10;
/// Games per window when comparing recent scores with the ones before.
pub const TREND_WINDOW: usize = 10;

const STUCK_AVERAGE: f32 = 200.0;
const STUCK_STREAK: u32 = 50;
const STUCK_FACTOR: f32 = 1.05;
const STUCK_FLOOR_MARGIN: f32 = 1.1;
const STUCK_FLOOR_JUMP: f32 = 3.0;

const DEGRADATION_PERCENT: f32 = -1.0;
const LOW_AVERAGE: f32 = 300.0;
const RELATIVE_DROP: f32 = 0.9;
const DEGRADATION_FACTOR: f32 = 1.10;
const DEGRADATION_FLOOR_MARGIN: f32 = 1.2;
const DEGRADATION_FLOOR_JUMP: f32 = 2.5;

const IMPROVEMENT_PERCENT: f32 = 1.0;
const IMPROVEMENT_BOOST: f32 = 0.99;

/// Games between refreshes of the reference average.
const REFRESH_INTERVAL: u32 = 5;
/// Smallest change worth logging.
const LOG_THRESHOLD: f32 = 0.001;

/// Average scores at which the exploration rate is recorded once.
pub const MILESTONE_SCORES: [f32; 3] = [100.0, 500.0, 1000.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ExplorationRule {
    #[display("low score, not improving")]
    StuckEscape,
    #[display("score degrading")]
    Degradation,
    #[display("score improving")]
    Improvement,
    #[display("baseline decay")]
    BaselineDecay,
}

/// Outcome of one revision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpsilonChange {
    pub rule: ExplorationRule,
    pub from: f32,
    pub to: f32,
    pub average_score: f32,
    pub improvement_percent: f32,
}

#[derive(Debug, Clone)]
pub struct ExplorationSchedule {
    epsilon: f32,
    epsilon_min: f32,
    epsilon_decay: f32,
    /// Reference average that improvements are measured against; zero until
    /// enough games have been played.
    previous_average: f32,
    games_since_refresh: u32,
    stuck_streak: u32,
    increases: u64,
    decreases: u64,
    milestones: [Option<f32>; MILESTONE_SCORES.len()],
}

impl ExplorationSchedule {
    #[must_use]
    pub fn new(params: &ParameterSet) -> Self {
        Self {
            epsilon: INITIAL_EPSILON,
            epsilon_min: params.epsilon_min,
            epsilon_decay: params.epsilon_decay,
            previous_average: 0.0,
            games_since_refresh: 0,
            stuck_streak: 0,
            increases: 0,
            decreases: 0,
            milestones: [None; MILESTONE_SCORES.len()],
        }
    }

    #[must_use]
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    #[must_use]
    pub fn epsilon_min(&self) -> f32 {
        self.epsilon_min
    }

    #[must_use]
    pub fn epsilon_decay(&self) -> f32 {
        self.epsilon_decay
    }

    #[must_use]
    pub fn previous_average(&self) -> f32 {
        self.previous_average
    }

    #[must_use]
    pub fn increases(&self) -> u64 {
        self.increases
    }

    #[must_use]
    pub fn decreases(&self) -> u64 {
        self.decreases
    }

    /// Exploration rate recorded when the average first reached each of
    /// [`MILESTONE_SCORES`].
    #[must_use]
    pub fn milestones(&self) -> &[Option<f32>; MILESTONE_SCORES.len()] {
        &self.milestones
    }

    /// Whether the rate sits at its floor.
    #[must_use]
    pub fn is_at_floor(&self) -> bool {
        self.epsilon - self.epsilon_min <= 1e-6
    }

    /// Switches decay and floor, keeping the current rate inside the new range.
    pub fn set_parameters(&mut self, params: &ParameterSet) {
        self.epsilon_min = params.epsilon_min;
        self.epsilon_decay = params.epsilon_decay;
        self.epsilon = self.epsilon.clamp(self.epsilon_min, MAX_EPSILON);
    }

    /// Restores state saved in a checkpoint. Out-of-range values are clamped
    /// and non-finite ones keep the current state.
    pub fn restore(&mut self, epsilon: f32, epsilon_min: f32, epsilon_decay: f32, previous_average: f32) {
        if epsilon_min.is_finite() {
            self.epsilon_min = epsilon_min.clamp(0.0, MAX_EPSILON);
        }
        if epsilon_decay.is_finite() && epsilon_decay > 0.0 {
            self.epsilon_decay = epsilon_decay.min(1.0);
        }
        if epsilon.is_finite() {
            self.epsilon = epsilon;
        }
        self.epsilon = self.epsilon.clamp(self.epsilon_min, MAX_EPSILON);
        if previous_average.is_finite() {
            self.previous_average = previous_average.max(0.0);
        }
    }

    /// Forgets the trend state so that a new evaluation window starts clean.
    pub fn reset_history(&mut self) {
        self.previous_average = 0.0;
        self.games_since_refresh = 0;
        self.stuck_streak = 0;
    }

    /// Revises the rate after a completed game.
    ///
    /// `recent_scores` holds the latest game scores, oldest first.
    pub fn update(&mut self, total_games: u64, recent_scores: &[f32]) -> Option<EpsilonChange> {
        let average = mean(recent_scores);
        self.record_milestones(average);

        let adjusting = total_games >= MIN_GAMES_FOR_ADJUSTMENT;
        if adjusting && self.previous_average <= 0.0 && average > 0.0 {
            self.previous_average = average;
        }
        let improvement_percent = if self.previous_average > 1.0 {
            trend::percent_change(self.previous_average, average).unwrap_or(0.0)
        } else {
            0.0
        };
        let score_trend = WindowComparison::of_last(recent_scores, TREND_WINDOW)
            .map_or(0.0, |cmp| cmp.recent_mean - cmp.previous_mean);

        let from = self.epsilon;
        let rule = self.select_rule(total_games, average, score_trend, improvement_percent);
        if let Some(rule) = rule {
            self.apply(rule);
        }
        self.epsilon = self.epsilon.clamp(self.epsilon_min, MAX_EPSILON);

        if adjusting && self.previous_average > 0.0 {
            self.games_since_refresh += 1;
            if improvement_percent.abs() > IMPROVEMENT_PERCENT || self.games_since_refresh >= REFRESH_INTERVAL {
                self.previous_average = average;
                self.games_since_refresh = 0;
            }
        }

        let to = self.epsilon;
        if to > from {
            self.increases += 1;
        } else if to < from {
            self.decreases += 1;
        }
        let rule = rule?;
        if (to - from).abs() > LOG_THRESHOLD {
            tracing::info!(
                from,
                to,
                average_score = average,
                improvement_percent,
                reason = %rule,
                "exploration rate changed"
            );
        }
        Some(EpsilonChange {
            rule,
            from,
            to,
            average_score: average,
            improvement_percent,
        })
    }

    fn select_rule(
        &mut self,
        total_games: u64,
        average: f32,
        score_trend: f32,
        improvement_percent: f32,
    ) -> Option<ExplorationRule> {
        let adjusting = total_games >= MIN_GAMES_FOR_ADJUSTMENT;

        if adjusting && average < STUCK_AVERAGE && score_trend <= 0.0 {
            self.stuck_streak += 1;
        } else {
            self.stuck_streak = 0;
        }
        if self.stuck_streak >= STUCK_STREAK {
            self.stuck_streak = 0;
            return Some(ExplorationRule::StuckEscape);
        }

        if adjusting
            && improvement_percent < DEGRADATION_PERCENT
            && (average < LOW_AVERAGE || average < RELATIVE_DROP * self.previous_average)
        {
            return Some(ExplorationRule::Degradation);
        }
        if adjusting && improvement_percent > IMPROVEMENT_PERCENT {
            return Some(ExplorationRule::Improvement);
        }
        (total_games >= MIN_GAMES_FOR_DECAY).then_some(ExplorationRule::BaselineDecay)
    }

    fn apply(&mut self, rule: ExplorationRule) {
        let floor = self.epsilon_min;
        match rule {
            ExplorationRule::StuckEscape => {
                self.epsilon = (self.epsilon * STUCK_FACTOR).min(MAX_EPSILON);
                if self.epsilon <= floor * STUCK_FLOOR_MARGIN {
                    self.epsilon = (floor * STUCK_FLOOR_JUMP).min(MAX_EPSILON);
                }
            }
            ExplorationRule::Degradation => {
                self.epsilon = (self.epsilon * DEGRADATION_FACTOR).min(MAX_EPSILON);
                if self.epsilon <= floor * DEGRADATION_FLOOR_MARGIN {
                    self.epsilon = (floor * DEGRADATION_FLOOR_JUMP).min(MAX_EPSILON);
                }
            }
            ExplorationRule::Improvement => {
                self.epsilon *= self.epsilon_decay * IMPROVEMENT_BOOST;
            }
            ExplorationRule::BaselineDecay => {
                self.epsilon *= self.epsilon_decay;
            }
        }
    }

    fn record_milestones(&mut self, average: f32) {
        for (slot, threshold) in self.milestones.iter_mut().zip(MILESTONE_SCORES) {
            if slot.is_none() && average >= threshold {
                *slot = Some(self.epsilon);
                tracing::info!(threshold, epsilon = self.epsilon, "average score milestone reached");
            }
        }
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
