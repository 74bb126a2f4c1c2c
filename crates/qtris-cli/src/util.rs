use std::{fs::File, io, path::Path};

use anyhow::Context;

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use qtris_training::config::TrainingConfig;

    use super::*;

    #[test]
    fn reads_partial_training_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "seed": 9, "auto_tune": false }"#).unwrap();

        let config: TrainingConfig = read_json_file("training config", &path).unwrap();
        assert_eq!(config.seed, Some(9));
        assert!(!config.auto_tune);
        assert_eq!(config.replay_capacity, TrainingConfig::default().replay_capacity);
    }

    #[test]
    fn missing_file_names_the_kind() {
        let err = read_json_file::<TrainingConfig, _>("training config", "/nonexistent/qtris.json").unwrap_err();
        assert!(err.to_string().contains("training config"));
    }
}
