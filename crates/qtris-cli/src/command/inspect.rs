use std::{fmt, path::PathBuf};

use anyhow::Context as _;
use qtris_evaluator::{
    state_vector::{self, INPUT_SIZE},
    value_network::ValueNetwork,
};
use qtris_training::checkpoint::{self, TrainingMetadata};
use rand::SeedableRng as _;
use rand_pcg::Pcg32;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct InspectArg {
    /// Checkpoint to inspect
    #[arg(default_value = "qtris_model.txt")]
    checkpoint: PathBuf,
    /// Number of input features to list by weight magnitude
    #[arg(long, default_value_t = 10)]
    top_features: usize,
}

/// Input features ordered by the mean absolute weight of their connections.
#[expect(clippy::cast_precision_loss)]
fn feature_importance(network: &ValueNetwork) -> Vec<(usize, f32)> {
    let mut importance: Vec<(usize, f32)> = network
        .input_weights()
        .iter()
        .enumerate()
        .map(|(i, row)| (i, row.iter().map(|w| w.abs()).sum::<f32>() / row.len() as f32))
        .collect();
    importance.sort_by(|a, b| b.1.total_cmp(&a.1));
    importance
}

/// Text report of a checkpoint.
struct CheckpointReport<'a> {
    network: &'a ValueNetwork,
    metadata: Option<&'a TrainingMetadata>,
    top_features: usize,
}

impl fmt::Display for CheckpointReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Training State ===")?;
        match self.metadata {
            Some(m) => {
                writeln!(f, "Epsilon: {:.4} (min {:.4}, decay {:.4})", m.epsilon, m.epsilon_min, m.epsilon_decay)?;
                writeln!(
                    f,
                    "Learning rate: {}, gamma: {}, batch size: {}",
                    m.learning_rate, m.gamma, m.batch_size
                )?;
                writeln!(f, "Training steps: {}, games: {}", m.training_steps, m.total_games)?;
                writeln!(
                    f,
                    "Best score: {:.0}, average: {:.1}, previous average: {:.1}",
                    m.best_score, m.average_score, m.previous_average_score
                )?;
            }
            None => writeln!(f, "(no metadata block)")?,
        }

        writeln!(f)?;
        writeln!(f, "=== Weights ===")?;
        writeln!(f, "{}", self.network.weight_stats())?;
        let saturation = self.network.saturation_report();
        writeln!(f, "{saturation}")?;
        if saturation.has_warnings() {
            writeln!(f, "Warning: some parameter groups look saturated or degenerate")?;
        }

        writeln!(f)?;
        writeln!(f, "=== Strongest Inputs ===")?;
        let top = self.top_features.min(INPUT_SIZE);
        for (index, weight) in feature_importance(self.network).into_iter().take(top) {
            writeln!(f, "{:>20}: {weight:.4}", state_vector::feature_name(index))?;
        }
        Ok(())
    }
}

pub(crate) fn run(arg: &InspectArg) -> anyhow::Result<()> {
    let mut network = ValueNetwork::new(&mut Pcg32::seed_from_u64(0));
    let mut metadata = TrainingMetadata::default();
    let has_metadata = checkpoint::load_checkpoint(&arg.checkpoint, &mut network, &mut metadata)
        .with_context(|| format!("Failed to inspect checkpoint: {}", arg.checkpoint.display()))?;

    println!("Checkpoint: {}", arg.checkpoint.display());
    let report = CheckpointReport {
        network: &network,
        metadata: has_metadata.then_some(&metadata),
        top_features: arg.top_features,
    };
    print!("{report}");
    Ok(())
}
