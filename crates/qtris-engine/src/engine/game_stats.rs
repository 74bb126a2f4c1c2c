use serde::Serialize;

/// Base points per simultaneous line clear, multiplied by the current level.
const SCORE_TABLE: [usize; 5] = [0, 100, 300, 500, 800];

/// Lines needed to advance one level.
const LINES_PER_LEVEL: usize = 10;

/// Score, level and line counters for one game.
///
/// Points for a clear are `SCORE_TABLE[lines] × level`, where the level starts
/// at 1 and rises every ten cleared lines.
///
/// ```
/// use qtris_engine::GameStats;
///
/// let mut stats = GameStats::new();
/// assert_eq!(stats.complete_piece_drop(4), 800);
/// for _ in 0..6 {
///     stats.complete_piece_drop(1);
/// }
/// assert_eq!(stats.level(), 2);
/// assert_eq!(stats.complete_piece_drop(2), 600);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct GameStats {
    score: usize,
    completed_pieces: usize,
    total_cleared_lines: usize,
    line_cleared_counter: [usize; 5],
}

impl Default for GameStats {
    fn default() -> Self {
        Self::new()
    }
}

impl GameStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            score: 0,
            completed_pieces: 0,
            total_cleared_lines: 0,
            line_cleared_counter: [0; 5],
        }
    }

    #[must_use]
    pub const fn score(&self) -> usize {
        self.score
    }

    #[must_use]
    pub const fn level(&self) -> usize {
        self.total_cleared_lines / LINES_PER_LEVEL + 1
    }

    #[must_use]
    pub const fn completed_pieces(&self) -> usize {
        self.completed_pieces
    }

    #[must_use]
    pub const fn total_cleared_lines(&self) -> usize {
        self.total_cleared_lines
    }

    /// Histogram of drops by lines cleared (index 0 counts drops that cleared nothing).
    #[must_use]
    pub const fn line_cleared_counter(&self) -> &[usize; 5] {
        &self.line_cleared_counter
    }

    /// Records a locked piece and returns the points it earned.
    pub fn complete_piece_drop(&mut self, cleared_lines: usize) -> usize {
        let cleared_lines = cleared_lines.min(SCORE_TABLE.len() - 1);
        let points = SCORE_TABLE[cleared_lines] * self.level();
        self.completed_pieces += 1;
        self.total_cleared_lines += cleared_lines;
        self.line_cleared_counter[cleared_lines] += 1;
        self.score += points;
        points
    }
}
