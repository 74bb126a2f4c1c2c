use std::{fs::OpenOptions, path::Path, sync::Mutex};

use anyhow::Context as _;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

fn level_filter(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global subscriber: compact events on stderr, and when
/// `diagnostics_log` is given, the same events appended to that file.
pub fn init(verbose: u8, diagnostics_log: Option<&Path>) -> anyhow::Result<()> {
    let file_layer = diagnostics_log
        .map(|path| {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open diagnostics log: {}", path.display()))?;
            anyhow::Ok(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        })
        .transpose()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .with(level_filter(verbose))
        .try_init()
        .context("Failed to install the log subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(level_filter(0), LevelFilter::INFO);
        assert_eq!(level_filter(1), LevelFilter::DEBUG);
        assert_eq!(level_filter(5), LevelFilter::TRACE);
    }
}
