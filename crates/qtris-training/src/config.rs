use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::replay_buffer::BUFFER_CAPACITY;

/// Settings of a self-play training run.
///
/// Every field has a default, so `{}` is a valid configuration file.
///
/// ```
/// # use qtris_training::config::TrainingConfig;
/// let config: TrainingConfig = serde_json::from_str(r#"{ "max_games": 10 }"#).unwrap();
/// assert_eq!(config.max_games, Some(10));
/// assert_eq!(config.tick_interval_ms, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Minimum time between two actions; `0` acts on every tick.
    pub tick_interval_ms: u64,
    /// Wall-clock budget of one move search; `0` disables the budget.
    pub search_budget_ms: u64,
    /// Wall-clock budget of one training batch; `0` disables the budget.
    pub train_budget_ms: u64,
    pub checkpoint_path: PathBuf,
    /// JSON index of best-score checkpoints; `None` disables them.
    pub best_index_path: Option<PathBuf>,
    /// Completed games between periodic checkpoints; `0` disables them.
    pub checkpoint_interval: u64,
    pub replay_capacity: usize,
    /// Seed of every random choice; drawn from the OS when absent.
    pub seed: Option<u64>,
    pub max_games: Option<u64>,
    pub stop_on_convergence: bool,
    pub auto_tune: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            search_budget_ms: 100,
            train_budget_ms: 200,
            checkpoint_path: PathBuf::from("qtris_model.txt"),
            best_index_path: Some(PathBuf::from("best_models.json")),
            checkpoint_interval: 100,
            replay_capacity: BUFFER_CAPACITY,
            seed: None,
            max_games: None,
            stop_on_convergence: true,
            auto_tune: true,
        }
    }
}

fn budget(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl TrainingConfig {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub fn search_budget(&self) -> Option<Duration> {
        budget(self.search_budget_ms)
    }

    #[must_use]
    pub fn train_budget(&self) -> Option<Duration> {
        budget(self.train_budget_ms)
    }
}
