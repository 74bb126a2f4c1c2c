use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};

use crate::state_vector::INPUT_SIZE;

use super::{HIDDEN_SIZE, OUTPUT_SIZE, ValueNetwork};

/// Prefix of comment lines in weight files.
pub const COMMENT_PREFIX: char = '#';

/// Number of numeric rows in the weight section.
pub const WEIGHT_ROWS: usize = INPUT_SIZE + 1 + HIDDEN_SIZE + 1;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ParseWeightsError {
    #[display("weight section ended after {found} of {WEIGHT_ROWS} rows")]
    Truncated { found: usize },
    #[display("weight row {row}: expected {expected} values, found {found}")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[display("weight row {row}: invalid number {token:?}")]
    InvalidNumber { row: usize, token: String },
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum LoadWeightsError {
    #[display("failed to read weight file: {_0}")]
    Io(io::Error),
    #[display("malformed weight file: {_0}")]
    Parse(ParseWeightsError),
}

fn write_row<W>(writer: &mut W, values: &[f32]) -> io::Result<()>
where
    W: Write,
{
    let mut first = true;
    for value in values {
        if !first {
            write!(writer, " ")?;
        }
        first = false;
        // `Display` for f32 prints the shortest text that parses back exactly.
        write!(writer, "{value}")?;
    }
    writeln!(writer)
}

/// Yields numeric rows, skipping blank and comment lines.
fn numeric_rows(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| {
        !line.is_empty() && !line.starts_with(COMMENT_PREFIX)
    })
}

fn parse_row<const N: usize>(row_index: usize, line: Option<&str>) -> Result<[f32; N], ParseWeightsError> {
    let line = line.ok_or(ParseWeightsError::Truncated { found: row_index })?;
    let mut values = [0.0; N];
    let mut found = 0;
    for token in line.split_whitespace() {
        if found < N {
            values[found] = token
                .parse()
                .map_err(|_| ParseWeightsError::InvalidNumber {
                    row: row_index,
                    token: token.to_owned(),
                })?;
        }
        found += 1;
    }
    if found != N {
        return Err(ParseWeightsError::RowLength {
            row: row_index,
            expected: N,
            found,
        });
    }
    Ok(values)
}

impl ValueNetwork {
    /// Writes the header comments and the weight section.
    ///
    /// Layout: `INPUT_SIZE` rows of `HIDDEN_SIZE` input weights, one row of
    /// hidden biases, `HIDDEN_SIZE` rows of `OUTPUT_SIZE` output weights and one
    /// row of output biases, all space separated.
    pub fn write_text<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: Write,
    {
        writeln!(writer, "{COMMENT_PREFIX} qtris value network")?;
        writeln!(
            writer,
            "{COMMENT_PREFIX} layout: {INPUT_SIZE}x{HIDDEN_SIZE} input weights, \
             {HIDDEN_SIZE} hidden biases, {HIDDEN_SIZE}x{OUTPUT_SIZE} output weights, \
             {OUTPUT_SIZE} output bias"
        )?;
        for row in &self.w1 {
            write_row(writer, row)?;
        }
        write_row(writer, &self.b1)?;
        for row in &self.w2 {
            write_row(writer, row)?;
        }
        write_row(writer, &self.b2)
    }

    /// Replaces the weights with those parsed from `text`.
    ///
    /// Comment and blank lines are skipped wherever they appear, and anything
    /// after the weight section (such as a metadata block) is ignored. Loaded
    /// values are clamped into the current bounds; on error the network is
    /// left unchanged.
    pub fn read_text(&mut self, text: &str) -> Result<(), ParseWeightsError> {
        let mut rows = numeric_rows(text);
        let mut index = 0;
        let mut next_row = || {
            let row = rows.next();
            index += 1;
            (index - 1, row)
        };

        let mut w1 = [[0.0; HIDDEN_SIZE]; INPUT_SIZE];
        for slot in &mut w1 {
            let (i, row) = next_row();
            *slot = parse_row(i, row)?;
        }
        let (i, row) = next_row();
        let b1 = parse_row(i, row)?;
        let mut w2 = [[0.0; OUTPUT_SIZE]; HIDDEN_SIZE];
        for slot in &mut w2 {
            let (i, row) = next_row();
            *slot = parse_row(i, row)?;
        }
        let (i, row) = next_row();
        let b2 = parse_row(i, row)?;

        self.w1 = w1;
        self.b1 = b1;
        self.w2 = w2;
        self.b2 = b2;
        self.clamp_parameters();
        Ok(())
    }

    /// Writes the weights to `path`.
    pub fn save<P>(&self, path: P) -> io::Result<()>
    where
        P: AsRef<Path>,
    {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_text(&mut writer)?;
        writer.flush()
    }

    /// Loads weights from `path`, returning whether that succeeded.
    ///
    /// A missing, truncated or malformed file leaves the network freshly
    /// reinitialized instead.
    pub fn load<P>(&mut self, path: P) -> bool
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        match self.try_load(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "loaded network weights");
                true
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "could not load network weights; starting from fresh initialization"
                );
                self.reinitialize();
                false
            }
        }
    }

    fn try_load(&mut self, path: &Path) -> Result<(), LoadWeightsError> {
        let text = fs::read_to_string(path).map_err(LoadWeightsError::Io)?;
        self.read_text(&text).map_err(LoadWeightsError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use crate::value_network::{SOFT_WEIGHT_LIMIT, WEIGHT_LIMIT};

    use super::*;

    fn network(seed: u64) -> ValueNetwork {
        ValueNetwork::new(&mut Pcg32::seed_from_u64(seed))
    }

    fn to_text(net: &ValueNetwork) -> String {
        let mut buf = Vec::new();
        net.write_text(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    /// Weight section where every value is `value`, with no header.
    fn uniform_text(value: f32) -> String {
        let row = |n: usize| vec![value.to_string(); n].join(" ");
        let mut lines = vec![row(HIDDEN_SIZE); INPUT_SIZE];
        lines.push(row(HIDDEN_SIZE));
        lines.extend(vec![row(OUTPUT_SIZE); HIDDEN_SIZE]);
        lines.push(row(OUTPUT_SIZE));
        lines.join("\n")
    }

    #[test]
    fn save_then_load_reproduces_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.txt");
        let original = network(17);
        original.save(&path).unwrap();

        let mut loaded = network(99);
        assert!(loaded.load(&path));
        for (a, b) in original.parameters().zip(loaded.parameters()) {
            assert!((a - b).abs() <= 1e-6, "{a} != {b}");
        }
    }

    #[test]
    fn header_is_optional() {
        let original = network(4);
        let text = to_text(&original);
        let headerless: String = text
            .lines()
            .filter(|line| !line.starts_with(COMMENT_PREFIX))
            .map(|line| format!("{line}\n"))
            .collect();

        let mut loaded = network(5);
        loaded.read_text(&headerless).unwrap();
        assert!(original.parameters().eq(loaded.parameters()));
    }

    #[test]
    fn trailing_metadata_is_ignored() {
        let original = network(4);
        let text = format!("{}\n# Training State Metadata\nEPSILON 0.5\n", to_text(&original));
        let mut loaded = network(5);
        loaded.read_text(&text).unwrap();
        assert!(original.parameters().eq(loaded.parameters()));
    }

    #[test]
    fn truncated_file_is_rejected_and_network_untouched() {
        let text = to_text(&network(4));
        let truncated: String = text.lines().take(20).map(|l| format!("{l}\n")).collect();
        let mut net = network(5);
        let before: Vec<f32> = net.parameters().collect();
        let err = net.read_text(&truncated).unwrap_err();
        assert!(matches!(err, ParseWeightsError::Truncated { .. }), "{err}");
        assert!(before.into_iter().eq(net.parameters()));
    }

    #[test]
    fn short_row_is_rejected() {
        let mut text = uniform_text(0.5);
        text.insert_str(0, "1 2 3\n");
        let err = network(1).read_text(&text).unwrap_err();
        assert!(matches!(
            err,
            ParseWeightsError::RowLength { row: 0, expected: HIDDEN_SIZE, found: 3 }
        ));
    }

    #[test]
    fn garbage_number_is_rejected() {
        let text = uniform_text(0.5).replacen("0.5", "zero", 1);
        let err = network(1).read_text(&text).unwrap_err();
        assert!(matches!(err, ParseWeightsError::InvalidNumber { row: 0, .. }));
    }

    #[test]
    fn missing_file_falls_back_to_fresh_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut net = network(1);
        assert!(!net.load(dir.path().join("absent.txt")));
        assert!(net.parameters().all(f32::is_finite));
    }

    #[test]
    fn legacy_saturated_weights_load_strictly_inside_current_bounds() {
        // Older checkpoints allowed ±10 in the hidden layer and ±50 at the output.
        let mut lines = vec![vec!["10"; HIDDEN_SIZE].join(" "); INPUT_SIZE];
        lines.push(vec!["-10"; HIDDEN_SIZE].join(" "));
        lines.extend(vec!["50".to_owned(); HIDDEN_SIZE]);
        lines.push("-50".to_owned());
        let text = lines.join("\n");

        let mut net = network(1);
        net.read_text(&text).unwrap();
        assert!(net.parameters().all(|p| p.abs() < WEIGHT_LIMIT));
        assert!(net.parameters().all(|p| p.abs() == SOFT_WEIGHT_LIMIT));
    }

    #[test]
    fn non_finite_values_are_healed_on_load() {
        let text = uniform_text(0.25).replacen("0.25", "NaN", 3);
        let mut net = network(1);
        net.read_text(&text).unwrap();
        assert!(net.parameters().all(f32::is_finite));
    }
}
