use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use qtris_training::{
    config::TrainingConfig,
    exploration::MILESTONE_SCORES,
    self_play::{SelfPlayDriver, TickOutcome},
};

use crate::util;

/// Sleep between ticks that were rate limited.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// JSON training configuration; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Checkpoint to resume from and save to
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    /// Stop after this many games in total
    #[arg(long)]
    max_games: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Minimum milliseconds between moves [default: 0 without --config]
    #[arg(long)]
    tick_interval_ms: Option<u64>,
    /// Ignore an existing checkpoint and start from a fresh network
    #[arg(long)]
    fresh: bool,
    /// Keep the initial parameter set
    #[arg(long)]
    no_auto_tune: bool,
    /// Keep training after convergence is detected
    #[arg(long)]
    ignore_convergence: bool,
    /// Print a progress line every N games
    #[arg(long, default_value_t = 10)]
    report_interval: u64,
}

fn build_config(arg: &TrainArg) -> anyhow::Result<TrainingConfig> {
    let mut config: TrainingConfig = match &arg.config {
        Some(path) => util::read_json_file("training config", path)?,
        None => TrainingConfig {
            tick_interval_ms: 0,
            ..TrainingConfig::default()
        },
    };
    if let Some(path) = &arg.checkpoint {
        config.checkpoint_path.clone_from(path);
    }
    if arg.max_games.is_some() {
        config.max_games = arg.max_games;
    }
    if arg.seed.is_some() {
        config.seed = arg.seed;
    }
    if let Some(tick_interval_ms) = arg.tick_interval_ms {
        config.tick_interval_ms = tick_interval_ms;
    }
    if arg.no_auto_tune {
        config.auto_tune = false;
    }
    if arg.ignore_convergence {
        config.stop_on_convergence = false;
    }
    Ok(config)
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let config = build_config(arg)?;
    let checkpoint_path = config.checkpoint_path.clone();
    let mut driver = SelfPlayDriver::new(config);

    if !arg.fresh && checkpoint_path.exists() {
        if driver.load_checkpoint() {
            eprintln!("Resumed from {}", checkpoint_path.display());
        } else {
            eprintln!("Could not load {}, starting fresh", checkpoint_path.display());
        }
    }

    let started = Instant::now();
    while !driver.should_stop() {
        match driver.tick(Instant::now()) {
            TickOutcome::Waiting => thread::sleep(IDLE_SLEEP),
            TickOutcome::GameOver { score, lines, .. } => {
                let snapshot = driver.snapshot();
                if arg.report_interval > 0 && snapshot.total_games % arg.report_interval == 0 {
                    eprintln!(
                        "Game #{}: score {score}, lines {lines}, avg {:.1}, best {:.0}, epsilon {:.3}, set {}, learning: {}",
                        snapshot.total_games,
                        snapshot.average_score,
                        snapshot.best_score,
                        snapshot.epsilon,
                        snapshot.parameter_set,
                        if snapshot.is_learning { "yes" } else { "plateau" },
                    );
                }
            }
            TickOutcome::Disabled
            | TickOutcome::SearchTimedOut
            | TickOutcome::Moved { .. } => {}
        }
    }

    driver
        .save()
        .with_context(|| format!("Failed to save checkpoint: {}", checkpoint_path.display()))?;

    let snapshot = driver.snapshot();
    eprintln!();
    eprintln!(
        "Finished {} games ({} training steps) in {:.1?}",
        snapshot.total_games,
        snapshot.training_steps,
        started.elapsed()
    );
    eprintln!(
        "Average score {:.1}, best {:.0}, epsilon {:.3}, converged: {}",
        snapshot.average_score, snapshot.best_score, snapshot.epsilon, snapshot.converged
    );
    eprintln!(
        "Exploration changes: {} increases, {} decreases",
        snapshot.epsilon_increases, snapshot.epsilon_decreases
    );
    for (threshold, epsilon) in MILESTONE_SCORES.iter().zip(snapshot.epsilon_milestones) {
        if let Some(epsilon) = epsilon {
            eprintln!("Average score {threshold:.0} reached at epsilon {epsilon:.3}");
        }
    }
    if let Some(best) = driver.best_index().and_then(|index| index.best()) {
        eprintln!("Best checkpoint: {} (score {:.0})", best.path.display(), best.score);
    }
    eprint!("{}", driver.tuner().report());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_games": 5, "seed": 1, "tick_interval_ms": 30 }"#).unwrap();

        let arg = TrainArg {
            config: Some(path),
            seed: Some(2),
            no_auto_tune: true,
            ..TrainArg::default()
        };
        let config = build_config(&arg).unwrap();
        assert_eq!(config.max_games, Some(5));
        assert_eq!(config.seed, Some(2));
        assert_eq!(config.tick_interval_ms, 30);
        assert!(!config.auto_tune);
        assert!(config.stop_on_convergence);

        let arg = TrainArg {
            tick_interval_ms: Some(5),
            ..arg
        };
        assert_eq!(build_config(&arg).unwrap().tick_interval_ms, 5);
    }

    #[test]
    fn headless_runs_without_config_do_not_wait() {
        let config = build_config(&TrainArg::default()).unwrap();
        assert_eq!(config.tick_interval_ms, 0);
        assert_eq!(config.max_games, None);
        assert!(config.auto_tune);
    }
}
