//! Checkpoint files and the best-checkpoint index.
//!
//! A checkpoint is the text weight format of [`ValueNetwork`] followed by a
//! metadata block:
//!
//! ```text
//! # saved at 2026-01-01T00:00:00+00:00
//! # qtris value network
//! # layout: ...
//! <weight rows>
//!
//! # Training State Metadata
//! EPSILON 0.05
//! TOTAL_GAMES 1234
//! ...
//! ```
//!
//! Files without the metadata block are accepted; training then resumes with
//! an exploration rate of [`RESUME_EPSILON`].

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use qtris_evaluator::value_network::{ParseWeightsError, ValueNetwork};
use serde::{Deserialize, Serialize};

use crate::{exploration::INITIAL_EPSILON, parameter_set::ParameterSet, trainer::ReplayTrainer};

pub const METADATA_MARKER: &str = "# Training State Metadata";
/// Exploration rate used when a checkpoint carries no training history.
pub const RESUME_EPSILON: f32 = 0.3;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum CheckpointError {
    #[display("checkpoint I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[display("malformed weights in {}: {source}", path.display())]
    Weights {
        path: PathBuf,
        source: ParseWeightsError,
    },
    #[display("malformed checkpoint index {}: {source}", path.display())]
    Index {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl CheckpointError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_owned(),
            source,
        }
    }
}

/// Training state stored next to the weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingMetadata {
    pub epsilon: f32,
    pub epsilon_min: f32,
    pub epsilon_decay: f32,
    pub learning_rate: f32,
    pub gamma: f32,
    pub batch_size: usize,
    pub training_steps: u64,
    pub total_games: u64,
    pub best_score: f32,
    pub average_score: f32,
    pub previous_average_score: f32,
}

impl Default for TrainingMetadata {
    /// State of a fresh run with the default parameter set.
    fn default() -> Self {
        let params = ParameterSet::default();
        Self {
            epsilon: INITIAL_EPSILON,
            epsilon_min: params.epsilon_min,
            epsilon_decay: params.epsilon_decay,
            learning_rate: params.learning_rate,
            gamma: params.gamma,
            batch_size: params.batch_size,
            training_steps: 0,
            total_games: 0,
            best_score: 0.0,
            average_score: 0.0,
            previous_average_score: 0.0,
        }
    }
}

impl TrainingMetadata {
    fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: io::Write,
    {
        writeln!(writer)?;
        writeln!(writer, "{METADATA_MARKER}")?;
        writeln!(writer, "EPSILON {}", self.epsilon)?;
        writeln!(writer, "EPSILON_MIN {}", self.epsilon_min)?;
        writeln!(writer, "EPSILON_DECAY {}", self.epsilon_decay)?;
        writeln!(writer, "LEARNING_RATE {}", self.learning_rate)?;
        writeln!(writer, "GAMMA {}", self.gamma)?;
        writeln!(writer, "BATCH_SIZE {}", self.batch_size)?;
        writeln!(writer, "TRAINING_EPISODES {}", self.training_steps)?;
        writeln!(writer, "TOTAL_GAMES {}", self.total_games)?;
        writeln!(writer, "BEST_SCORE {}", self.best_score)?;
        writeln!(writer, "AVERAGE_SCORE {}", self.average_score)?;
        writeln!(writer, "PREVIOUS_AVG_SCORE {}", self.previous_average_score)
    }

    /// Overwrites the fields found in the metadata block of `text`.
    ///
    /// Unknown keys are ignored. Values that fail to parse, are not finite or
    /// lie outside the domain of their field keep the current field value.
    /// Returns whether a metadata block was present.
    pub fn read_text(&mut self, text: &str) -> bool {
        let mut lines = text.lines();
        if !lines.any(|line| line.trim() == METADATA_MARKER) {
            return false;
        }
        for line in lines {
            let Some((key, value)) = line.trim().split_once(char::is_whitespace) else {
                continue;
            };
            let value = value.trim();
            let accepted = match key {
                "EPSILON" => parse_into(&mut self.epsilon, value, is_probability),
                "EPSILON_MIN" => parse_into(&mut self.epsilon_min, value, is_probability),
                "EPSILON_DECAY" => parse_into(&mut self.epsilon_decay, value, |v| *v > 0.0 && *v <= 1.0),
                "LEARNING_RATE" => parse_into(&mut self.learning_rate, value, |v| v.is_finite() && *v > 0.0),
                "GAMMA" => parse_into(&mut self.gamma, value, is_probability),
                "BATCH_SIZE" => parse_into(&mut self.batch_size, value, |v| *v >= 1),
                "TRAINING_EPISODES" => parse_into(&mut self.training_steps, value, |_| true),
                "TOTAL_GAMES" => parse_into(&mut self.total_games, value, |_| true),
                "BEST_SCORE" => parse_into(&mut self.best_score, value, is_score),
                "AVERAGE_SCORE" => parse_into(&mut self.average_score, value, is_score),
                "PREVIOUS_AVG_SCORE" => parse_into(&mut self.previous_average_score, value, is_score),
                _ => true,
            };
            if !accepted {
                tracing::warn!(key, value, "ignoring invalid checkpoint metadata value");
            }
        }
        true
    }
}

fn is_probability(value: &f32) -> bool {
    (0.0..=1.0).contains(value)
}

fn is_score(value: &f32) -> bool {
    value.is_finite() && *value >= 0.0
}

/// Stores the parsed `value` in `slot` when it satisfies `valid`.
fn parse_into<T, F>(slot: &mut T, value: &str, valid: F) -> bool
where
    T: std::str::FromStr,
    F: FnOnce(&T) -> bool,
{
    match value.parse() {
        Ok(parsed) if valid(&parsed) => {
            *slot = parsed;
            true
        }
        _ => false,
    }
}

/// Writes `path` through a temporary sibling file that is renamed into place,
/// so readers see either the old or the new content.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), CheckpointError>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(CheckpointError::io(dir))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = File::create(&tmp_path).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    });
    result
        .and_then(|()| fs::rename(&tmp_path, path))
        .map_err(CheckpointError::io(path))
}

/// Saves weights and metadata to `path`.
pub fn save_checkpoint(
    path: &Path,
    network: &ValueNetwork,
    metadata: &TrainingMetadata,
) -> Result<(), CheckpointError> {
    write_atomically(path, |writer| {
        writeln!(writer, "# saved at {}", Utc::now().to_rfc3339())?;
        network.write_text(writer)?;
        metadata.write(writer)
    })
}

/// Loads weights into `network` and metadata into `metadata`.
///
/// Returns whether the file carried a metadata block. On error both outputs
/// are left unchanged.
pub fn load_checkpoint(
    path: &Path,
    network: &mut ValueNetwork,
    metadata: &mut TrainingMetadata,
) -> Result<bool, CheckpointError> {
    let text = fs::read_to_string(path).map_err(CheckpointError::io(path))?;
    network
        .read_text(&text)
        .map_err(|source| CheckpointError::Weights {
            path: path.to_owned(),
            source,
        })?;
    Ok(metadata.read_text(&text))
}

impl ReplayTrainer {
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        save_checkpoint(path, self.network(), &self.metadata())?;
        tracing::info!(
            path = %path.display(),
            total_games = self.total_games(),
            epsilon = self.epsilon(),
            "saved checkpoint"
        );
        Ok(())
    }

    /// Resumes from the checkpoint at `path`, returning whether it loaded.
    ///
    /// On failure the network is freshly reinitialized and the training state
    /// is left as it was.
    pub fn load(&mut self, path: &Path) -> bool {
        let mut metadata = self.metadata();
        match load_checkpoint(path, self.network_mut(), &mut metadata) {
            Ok(_) => {
                if metadata.training_steps == 0 && metadata.total_games == 0 {
                    metadata.epsilon = RESUME_EPSILON;
                }
                self.restore(&metadata);
                tracing::info!(
                    path = %path.display(),
                    epsilon = self.epsilon(),
                    training_steps = self.training_steps(),
                    total_games = self.total_games(),
                    best_score = self.best_score(),
                    "loaded checkpoint"
                );
                true
            }
            Err(error) => {
                tracing::warn!(%error, "could not load checkpoint; starting from fresh initialization");
                self.network_mut().reinitialize();
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCheckpointEntry {
    pub path: PathBuf,
    pub score: f32,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    entries: Vec<BestCheckpointEntry>,
}

/// JSON list of checkpoints saved whenever a new best score was reached.
///
/// Scored checkpoints live in the directory of the index file.
#[derive(Debug, Clone)]
pub struct BestCheckpointIndex {
    path: PathBuf,
    entries: Vec<BestCheckpointEntry>,
}

impl BestCheckpointIndex {
    /// Opens the index at `path`; a missing file is an empty index.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => {
                serde_json::from_str::<IndexFile>(&text)
                    .map_err(|source| CheckpointError::Index {
                        path: path.clone(),
                        source,
                    })?
                    .entries
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => vec![],
            Err(error) => return Err(CheckpointError::io(&path)(error)),
        };
        Ok(Self { path, entries })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn entries(&self) -> &[BestCheckpointEntry] {
        &self.entries
    }

    /// The highest-scoring entry.
    #[must_use]
    pub fn best(&self) -> Option<&BestCheckpointEntry> {
        self.entries.iter().max_by(|a, b| a.score.total_cmp(&b.score))
    }

    /// Saves a scored checkpoint of `trainer` and records it, but only when
    /// `score` beats the best entry so far. Returns the new entry.
    pub fn record_if_better(
        &mut self,
        trainer: &ReplayTrainer,
        score: f32,
    ) -> Result<Option<&BestCheckpointEntry>, CheckpointError> {
        if self.best().is_some_and(|best| score <= best.score) {
            return Ok(None);
        }
        let saved_at = Utc::now();
        let file_name = format!("best_model_{score:.0}_{}.txt", saved_at.format("%Y%m%d%H%M%S"));
        let checkpoint_path = self.path.with_file_name(file_name);
        trainer.save(&checkpoint_path)?;

        self.entries.push(BestCheckpointEntry {
            path: checkpoint_path,
            score,
            saved_at,
        });
        self.save()?;
        tracing::info!(score, path = %self.path.display(), "recorded new best checkpoint");
        Ok(self.entries.last())
    }

    pub fn save(&self) -> Result<(), CheckpointError> {
        let file = IndexFile {
            entries: self.entries.clone(),
        };
        write_atomically(&self.path, |writer| {
            serde_json::to_writer_pretty(&mut *writer, &file).map_err(io::Error::other)?;
            writeln!(writer)
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    fn trainer() -> ReplayTrainer {
        let network = ValueNetwork::new(&mut Pcg32::seed_from_u64(3));
        ReplayTrainer::new(network, ParameterSet::MODERATE, 100, 3)
    }

    fn played_trainer() -> ReplayTrainer {
        let mut t = trainer();
        for score in [100.0, 300.0, 200.0, 400.0, 500.0, 250.0] {
            t.record_game(score);
        }
        t
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");
        let original = played_trainer();
        original.save(&path).unwrap();
        assert!(!dir.path().join("model.txt.tmp").exists());

        let mut resumed = trainer();
        resumed.network_mut().reinitialize();
        assert!(resumed.load(&path));
        assert_eq!(resumed.metadata(), original.metadata());
        for (a, b) in resumed.network().parameters().zip(original.network().parameters()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn weights_without_metadata_resume_with_moderate_exploration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.txt");
        trainer().network().save(&path).unwrap();

        let mut resumed = trainer();
        assert!(resumed.load(&path));
        assert_eq!(resumed.epsilon(), RESUME_EPSILON);
        assert_eq!(resumed.total_games(), 0);
    }

    #[test]
    fn missing_file_reinitializes() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = played_trainer();
        let before: Vec<f32> = t.network().parameters().collect();
        assert!(!t.load(&dir.path().join("absent.txt")));
        assert_ne!(t.network().parameters().collect::<Vec<_>>(), before);
        assert_eq!(t.total_games(), 6);
    }

    #[test]
    fn default_metadata_matches_fresh_trainer() {
        assert_eq!(TrainingMetadata::default(), trainer().metadata());
    }

    #[test]
    fn malformed_metadata_keeps_prior_values() {
        let mut metadata = trainer().metadata();
        let text = format!(
            "{METADATA_MARKER}\nEPSILON abc\nTOTAL_GAMES 42\nUNKNOWN_KEY 1\nBEST_SCORE\nGAMMA 0.5\n"
        );
        assert!(metadata.read_text(&text));
        assert_eq!(metadata.epsilon, 1.0);
        assert_eq!(metadata.total_games, 42);
        assert_eq!(metadata.best_score, 0.0);
        assert_eq!(metadata.gamma, 0.5);

        assert!(!metadata.read_text("EPSILON 0.1\n"));
        assert_eq!(metadata.epsilon, 1.0);
    }

    #[test]
    fn out_of_domain_metadata_keeps_prior_values() {
        let prior = trainer().metadata();
        for line in [
            "EPSILON NaN",
            "EPSILON 1.5",
            "EPSILON_MIN NaN",
            "EPSILON_MIN -0.1",
            "EPSILON_DECAY 0",
            "EPSILON_DECAY inf",
            "LEARNING_RATE inf",
            "LEARNING_RATE 0",
            "GAMMA -1",
            "BATCH_SIZE 0",
            "BEST_SCORE inf",
            "AVERAGE_SCORE NaN",
            "PREVIOUS_AVG_SCORE -5",
        ] {
            let mut metadata = prior;
            assert!(metadata.read_text(&format!("{METADATA_MARKER}\n{line}\n")));
            assert_eq!(metadata, prior, "{line}");
        }
    }

    #[test]
    fn invalid_metadata_in_file_does_not_stop_training() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.txt");
        played_trainer().save(&path).unwrap();
        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("EPSILON_MIN NaN\nBATCH_SIZE 0\nLEARNING_RATE inf\n");
        fs::write(&path, text).unwrap();

        let mut resumed = trainer();
        assert!(resumed.load(&path));
        let params = ParameterSet::default();
        assert_eq!(resumed.exploration().epsilon_min(), params.epsilon_min);
        assert_eq!(resumed.parameters().batch_size, params.batch_size);
        assert_eq!(resumed.parameters().learning_rate, params.learning_rate);
        assert_eq!(resumed.total_games(), 6);
    }

    #[test]
    fn truncated_weights_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        fs::write(&path, "# header\n0.1 0.2\n").unwrap();
        let mut network = ValueNetwork::new(&mut Pcg32::seed_from_u64(1));
        let mut metadata = trainer().metadata();
        let err = load_checkpoint(&path, &mut network, &mut metadata).unwrap_err();
        assert!(matches!(err, CheckpointError::Weights { .. }));
    }

    #[test]
    fn best_index_records_only_improvements() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("best.json");
        let t = played_trainer();

        let mut index = BestCheckpointIndex::open(&index_path).unwrap();
        assert!(index.best().is_none());
        let entry = index.record_if_better(&t, 500.0).unwrap().unwrap().clone();
        assert!(entry.path.exists());
        assert_eq!(entry.path.parent(), Some(dir.path()));
        assert!(index.record_if_better(&t, 400.0).unwrap().is_none());
        assert!(index.record_if_better(&t, 500.0).unwrap().is_none());
        index.record_if_better(&t, 800.0).unwrap();

        let reopened = BestCheckpointIndex::open(&index_path).unwrap();
        assert_eq!(reopened.entries().len(), 2);
        assert_eq!(reopened.best().map(|e| e.score), Some(800.0));
        assert_eq!(reopened.entries()[0], entry);
    }

    #[test]
    fn corrupt_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            BestCheckpointIndex::open(&path),
            Err(CheckpointError::Index { .. })
        ));
    }
}
