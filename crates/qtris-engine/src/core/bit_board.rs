use std::ops::Range;

use super::{
    PLAYABLE_HEIGHT, PLAYABLE_WIDTH, SENTINEL_MARGIN_LEFT, SENTINEL_MARGIN_TOP, TOTAL_HEIGHT,
    TOTAL_WIDTH, piece::Piece,
};

// Left wall: bits 0-1, right wall: bits 12-13.
const LEFT_SENTINEL_MASK: u16 = 0b11;
const RIGHT_SENTINEL_MASK: u16 = 0b11 << (SENTINEL_MARGIN_LEFT + PLAYABLE_WIDTH);
const SENTINEL_MASK: u16 = LEFT_SENTINEL_MASK | RIGHT_SENTINEL_MASK;
const FULL_ROW_MASK: u16 = (1 << TOTAL_WIDTH) - 1;
const PLAYABLE_MASK: u16 = FULL_ROW_MASK & !SENTINEL_MASK;

/// One board row as a bitmask; bit `x` is the cell at board column `x`.
///
/// Sentinel bits are always set so walls collide like ordinary blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRow {
    bits: u16,
}

impl BitRow {
    pub const EMPTY: Self = Self {
        bits: SENTINEL_MASK,
    };
    pub const FULL_SENTINEL: Self = Self {
        bits: FULL_ROW_MASK,
    };

    #[inline]
    #[must_use]
    pub fn is_playable_filled(self) -> bool {
        (self.bits & PLAYABLE_MASK) == PLAYABLE_MASK
    }

    #[inline]
    #[must_use]
    pub fn is_cell_occupied(self, x: usize) -> bool {
        (self.bits & (1 << x)) != 0
    }

    /// Checks a piece mask row shifted to `x0` against this row.
    ///
    /// The shift is done in 32 bits so that cells pushed past the right edge
    /// of the row count as a collision instead of silently disappearing.
    #[inline]
    fn collides(self, x0: usize, mask: u16) -> bool {
        let bits = u32::from(mask) << x0;
        (bits & !u32::from(FULL_ROW_MASK)) != 0 || (bits & u32::from(self.bits)) != 0
    }

    #[inline]
    #[expect(clippy::cast_possible_truncation)]
    fn occupy(&mut self, x0: usize, mask: u16) {
        let bits = (u32::from(mask) << x0) & u32::from(FULL_ROW_MASK);
        self.bits |= bits as u16;
    }

    #[inline]
    pub fn iter_playable_cells(self) -> impl Iterator<Item = bool> {
        BitBoard::PLAYABLE_X_RANGE.map(move |x| self.is_cell_occupied(x))
    }
}

/// Bit-packed board with 2-cell sentinel walls on the left, right and bottom
/// and two hidden spawn rows above the playable area.
///
/// The 2-cell margins let every 4×4 bounding box reach the outermost playable
/// columns (a vertical I piece sits two cells in from its box edge), which is
/// why column offsets range over `-2..=11` for a 10-wide field.
///
/// Besides collision tests and line clears the board answers the shape
/// metrics the agent's features are built from:
///
/// ```
/// use qtris_engine::BitBoard;
///
/// let board = BitBoard::from_ascii(
///     r"
///     ..........
///     .#........
///     ###.#......
///     ",
/// );
/// assert_eq!(board.column_heights()[..4], [1, 2, 0, 1]);
/// assert_eq!(board.num_holes(), 0);
/// assert_eq!(board.bumpiness(), 1 + 2 + 1 + 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBoard {
    rows: [BitRow; TOTAL_HEIGHT],
}

impl Default for BitBoard {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl BitBoard {
    pub const TOTAL_WIDTH: usize = TOTAL_WIDTH;
    pub const TOTAL_HEIGHT: usize = TOTAL_HEIGHT;
    pub const PLAYABLE_WIDTH: usize = PLAYABLE_WIDTH;
    pub const PLAYABLE_HEIGHT: usize = PLAYABLE_HEIGHT;
    pub const PLAYABLE_X_RANGE: Range<usize> =
        SENTINEL_MARGIN_LEFT..(SENTINEL_MARGIN_LEFT + PLAYABLE_WIDTH);
    pub const PLAYABLE_Y_RANGE: Range<usize> =
        SENTINEL_MARGIN_TOP..(SENTINEL_MARGIN_TOP + PLAYABLE_HEIGHT);

    pub const INITIAL: Self = {
        let mut rows = [BitRow::EMPTY; TOTAL_HEIGHT];
        let mut y = SENTINEL_MARGIN_TOP + PLAYABLE_HEIGHT;
        while y < TOTAL_HEIGHT {
            rows[y] = BitRow::FULL_SENTINEL;
            y += 1;
        }
        Self { rows }
    };

    #[must_use]
    pub fn playable_row(&self, y: usize) -> BitRow {
        self.rows[y + SENTINEL_MARGIN_TOP]
    }

    pub fn playable_rows(&self) -> impl Iterator<Item = BitRow> + '_ {
        self.rows[Self::PLAYABLE_Y_RANGE].iter().copied()
    }

    /// Checks whether the piece overlaps a block, a wall or the floor.
    ///
    /// Mask rows that would fall below the board are treated as colliding.
    #[must_use]
    pub fn is_colliding(&self, piece: Piece) -> bool {
        let x0 = piece.position().x();
        let y0 = piece.position().y();
        piece.mask().into_iter().enumerate().any(|(dy, mask)| {
            mask != 0
                && self
                    .rows
                    .get(y0 + dy)
                    .is_none_or(|row| row.collides(x0, mask))
        })
    }

    /// Collision test for the piece offset by `(dx, dy)` cells.
    ///
    /// Offsets that leave the board coordinate space always collide.
    #[must_use]
    pub fn is_colliding_at(&self, piece: Piece, dx: isize, dy: isize) -> bool {
        piece
            .shifted(dx, dy)
            .is_none_or(|moved| self.is_colliding(moved))
    }

    /// Locks a piece onto the board.
    pub fn fill_piece(&mut self, piece: Piece) {
        let x0 = piece.position().x();
        let y0 = piece.position().y();
        for (mask, row) in piece.mask().into_iter().zip(&mut self.rows[y0..]) {
            row.occupy(x0, mask);
        }
    }

    /// Clears filled lines in place and returns how many were removed.
    pub fn clear_lines(&mut self) -> usize {
        let playable_rows = &mut self.rows[Self::PLAYABLE_Y_RANGE];
        let mut count = 0;

        for y in (0..PLAYABLE_HEIGHT).rev() {
            if playable_rows[y].is_playable_filled() {
                count += 1;
                continue;
            }
            if count > 0 {
                playable_rows[y + count] = playable_rows[y];
            }
        }

        playable_rows[..count].fill(BitRow::EMPTY);
        count
    }

    /// Returns a copy of this board with full lines removed, plus the count.
    #[must_use]
    pub fn with_lines_cleared(&self) -> (usize, Self) {
        let mut board = self.clone();
        let cleared = board.clear_lines();
        (cleared, board)
    }

    /// Height of a playable column (`0..PLAYABLE_WIDTH`), measured from the floor
    /// to its topmost block. Blocks in the hidden spawn rows are not counted.
    #[must_use]
    pub fn column_height(&self, column: usize) -> usize {
        let x = column + SENTINEL_MARGIN_LEFT;
        self.playable_rows()
            .position(|row| row.is_cell_occupied(x))
            .map_or(0, |top| PLAYABLE_HEIGHT - top)
    }

    #[must_use]
    pub fn column_heights(&self) -> [usize; PLAYABLE_WIDTH] {
        std::array::from_fn(|column| self.column_height(column))
    }

    /// Number of empty cells lying below the top block of their column.
    #[must_use]
    pub fn num_holes(&self) -> usize {
        (0..PLAYABLE_WIDTH)
            .map(|column| {
                let x = column + SENTINEL_MARGIN_LEFT;
                let height = self.column_height(column);
                let filled = self
                    .playable_rows()
                    .skip(PLAYABLE_HEIGHT - height)
                    .filter(|row| row.is_cell_occupied(x))
                    .count();
                height - filled
            })
            .sum()
    }

    /// Sum of absolute height differences between neighboring columns.
    #[must_use]
    pub fn bumpiness(&self) -> usize {
        self.column_heights()
            .windows(2)
            .map(|w| w[0].abs_diff(w[1]))
            .sum()
    }

    #[must_use]
    pub fn aggregate_height(&self) -> usize {
        self.column_heights().iter().sum()
    }

    /// Builds a board from ASCII art: `#` is a block, `.` is empty.
    ///
    /// Rows are aligned to the floor, so short art describes the bottom of the
    /// field. Intended for tests and examples.
    ///
    /// # Panics
    ///
    /// Panics if a row is not exactly 10 cells wide or there are more than 20 rows.
    #[must_use]
    pub fn from_ascii(art: &str) -> Self {
        let lines: Vec<&str> = art.lines().filter(|line| !line.trim().is_empty()).collect();
        assert!(lines.len() <= PLAYABLE_HEIGHT, "too many rows: {}", lines.len());

        let mut board = Self::INITIAL;
        let top = SENTINEL_MARGIN_TOP + PLAYABLE_HEIGHT - lines.len();
        for (i, line) in lines.iter().enumerate() {
            let cells: Vec<char> = line.chars().filter(|c| *c == '#' || *c == '.').collect();
            assert_eq!(
                cells.len(),
                PLAYABLE_WIDTH,
                "each row must have exactly {PLAYABLE_WIDTH} cells, got {} at row {i}",
                cells.len(),
            );
            for (x, &ch) in cells.iter().enumerate() {
                if ch == '#' {
                    board.rows[top + i].occupy(x + SENTINEL_MARGIN_LEFT, 0b1);
                }
            }
        }
        board
    }
}
