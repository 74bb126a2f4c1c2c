use rand::{Rng, distr::StandardUniform, prelude::Distribution};
use serde::{Deserialize, Serialize};

use super::{SENTINEL_MARGIN_LEFT, TOTAL_HEIGHT, TOTAL_WIDTH};

/// Smallest column offset a piece's bounding box may be placed at.
///
/// Column offsets are measured from the left edge of the playable area to the
/// left edge of the piece's 4×4 bounding box, so pieces with empty leading
/// columns can use negative offsets.
pub const MIN_COLUMN: i8 = -2;

/// Largest column offset a piece's bounding box may be placed at.
pub const MAX_COLUMN: i8 = 11;

const _: () = assert!(MIN_COLUMN as isize == -(SENTINEL_MARGIN_LEFT as isize));
const _: () = assert!((MAX_COLUMN as isize) + (SENTINEL_MARGIN_LEFT as isize) + 1 == TOTAL_WIDTH as isize);

const PIECE_SPAWN_X: u8 = 5;
const PIECE_SPAWN_Y: u8 = 0;

/// A tetromino with position, rotation, and kind.
///
/// Pieces are plain values: every movement returns a new `Piece`, so a game
/// can hold its current piece in a slot and replace it on spawn without any
/// shared ownership.
///
/// # Example
///
/// ```
/// use qtris_engine::{Piece, PieceKind, PieceRotation};
///
/// let piece = Piece::new(PieceKind::T).with_rotation(PieceRotation::new(1));
/// let placed = piece.with_column(0).unwrap();
/// assert_eq!(placed.column(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    position: PiecePosition,
    rotation: PieceRotation,
    kind: PieceKind,
}

impl Piece {
    /// Creates a piece of the given kind at the spawn position.
    #[must_use]
    pub fn new(kind: PieceKind) -> Self {
        Self {
            position: PiecePosition::SPAWN_POSITION,
            rotation: PieceRotation::default(),
            kind,
        }
    }

    #[must_use]
    pub fn position(&self) -> PiecePosition {
        self.position
    }

    #[must_use]
    pub fn rotation(&self) -> PieceRotation {
        self.rotation
    }

    #[must_use]
    pub fn kind(&self) -> PieceKind {
        self.kind
    }

    /// Column offset of the bounding box relative to the playable area.
    #[must_use]
    #[expect(clippy::cast_possible_wrap)]
    pub fn column(&self) -> i8 {
        self.position.x as i8 + MIN_COLUMN
    }

    pub(crate) fn mask(&self) -> PieceMask {
        self.kind.mask(self.rotation)
    }

    /// Returns board coordinates (including sentinel margins) of every cell.
    pub fn occupied_positions(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.kind
            .occupied_positions(self.rotation)
            .map(move |(dx, dy)| (self.position.x() + dx, self.position.y() + dy))
    }

    #[must_use]
    pub fn with_rotation(&self, rotation: PieceRotation) -> Self {
        Self { rotation, ..*self }
    }

    /// Moves the bounding box to the given column offset, keeping the row.
    ///
    /// Returns `None` when the offset lies outside [`MIN_COLUMN`]`..=`[`MAX_COLUMN`].
    #[must_use]
    pub fn with_column(&self, column: i8) -> Option<Self> {
        if !(MIN_COLUMN..=MAX_COLUMN).contains(&column) {
            return None;
        }
        let x = u8::try_from(column - MIN_COLUMN).ok()?;
        Some(Self {
            position: PiecePosition::new(x, self.position.y),
            ..*self
        })
    }

    /// Moves the bounding box to the given board row, keeping the column.
    #[must_use]
    pub fn with_row(&self, y: usize) -> Option<Self> {
        let y = u8::try_from(y).ok()?;
        let position = PiecePosition::try_new(self.position.x, y)?;
        Some(Self { position, ..*self })
    }

    /// Offsets the piece by `(dx, dy)` cells, if the result stays on the board.
    #[must_use]
    pub fn shifted(&self, dx: isize, dy: isize) -> Option<Self> {
        let x = self.position.x().checked_add_signed(dx)?;
        let y = self.position.y().checked_add_signed(dy)?;
        let position = PiecePosition::try_new(u8::try_from(x).ok()?, u8::try_from(y).ok()?)?;
        Some(Self { position, ..*self })
    }

    #[must_use]
    pub fn down(&self) -> Option<Self> {
        self.shifted(0, 1)
    }
}

/// Position of a piece's bounding box on the board, sentinel margins included.
///
/// (0, 0) is the top-left corner of the full board; x grows rightward and y
/// grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PiecePosition {
    x: u8,
    y: u8,
}

impl PiecePosition {
    pub const SPAWN_POSITION: Self = Self::new(PIECE_SPAWN_X, PIECE_SPAWN_Y);

    #[must_use]
    pub const fn new(x: u8, y: u8) -> Self {
        assert!((x as usize) < TOTAL_WIDTH);
        assert!((y as usize) < TOTAL_HEIGHT);
        Self { x, y }
    }

    #[must_use]
    pub const fn try_new(x: u8, y: u8) -> Option<Self> {
        if (x as usize) < TOTAL_WIDTH && (y as usize) < TOTAL_HEIGHT {
            Some(Self { x, y })
        } else {
            None
        }
    }

    #[must_use]
    pub fn x(self) -> usize {
        usize::from(self.x)
    }

    #[must_use]
    pub fn y(self) -> usize {
        usize::from(self.y)
    }
}

/// Rotation state of a piece: `0` is the spawn orientation, each step is a
/// further 90° clockwise turn. Values wrap modulo 4.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PieceRotation(u8);

impl PieceRotation {
    /// Number of distinct rotation states.
    pub const LEN: usize = 4;

    #[must_use]
    pub const fn new(quarter_turns: u8) -> Self {
        Self(quarter_turns % 4)
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..4).map(Self)
    }

    #[must_use]
    pub fn rotated_right(self) -> Self {
        Self((self.0 + 1) % 4)
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// The seven tetromino kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(u8)]
pub enum PieceKind {
    I = 0,
    O = 1,
    S = 2,
    Z = 3,
    J = 4,
    L = 5,
    T = 6,
}

impl Distribution<PieceKind> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> PieceKind {
        PieceKind::ALL[rng.random_range(0..PieceKind::LEN)]
    }
}

impl PieceKind {
    /// Number of piece kinds (7).
    pub const LEN: usize = 7;

    pub const ALL: [Self; Self::LEN] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
        PieceKind::T,
    ];

    /// Stable index in `0..LEN`, used for one-hot encodings.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn mask(self, rotation: PieceRotation) -> PieceMask {
        PIECE_MASKS[self.index()][rotation.as_usize()]
    }

    /// Returns the occupied `(dx, dy)` cells inside the 4×4 bounding box.
    pub fn occupied_positions(self, rotation: PieceRotation) -> impl Iterator<Item = (usize, usize)> {
        let mask = self.mask(rotation);
        (0..4).flat_map(move |dy| {
            (0..4).filter_map(move |dx| (mask[dy] & (1 << dx) != 0).then_some((dx, dy)))
        })
    }

    /// # Examples
    ///
    /// ```
    /// use qtris_engine::PieceKind;
    ///
    /// assert_eq!(PieceKind::S.as_char(), 'S');
    /// ```
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            PieceKind::I => 'I',
            PieceKind::O => 'O',
            PieceKind::S => 'S',
            PieceKind::Z => 'Z',
            PieceKind::J => 'J',
            PieceKind::L => 'L',
            PieceKind::T => 'T',
        }
    }

    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'I' => Some(PieceKind::I),
            'O' => Some(PieceKind::O),
            'S' => Some(PieceKind::S),
            'Z' => Some(PieceKind::Z),
            'J' => Some(PieceKind::J),
            'L' => Some(PieceKind::L),
            'T' => Some(PieceKind::T),
            _ => None,
        }
    }
}

/// Four rows of a piece's bounding box; bit `dx` of row `dy` marks a cell.
pub(crate) type PieceMask = [u16; 4];

/// Builds all four rotation states by turning the `size`×`size` box clockwise.
const fn rotations(size: usize, spawn: PieceMask) -> [PieceMask; 4] {
    let mut out = [spawn; 4];
    let mut r = 1;
    while r < 4 {
        let mut turned = [0; 4];
        let mut y = 0;
        while y < size {
            let mut x = 0;
            while x < size {
                if out[r - 1][size - 1 - x] & (1 << y) != 0 {
                    turned[y] |= 1 << x;
                }
                x += 1;
            }
            y += 1;
        }
        out[r] = turned;
        r += 1;
    }
    out
}

const PIECE_MASKS: [[PieceMask; 4]; PieceKind::LEN] = [
    // I
    rotations(4, [0b0000, 0b1111, 0b0000, 0b0000]),
    // O
    rotations(2, [0b0011, 0b0011, 0b0000, 0b0000]),
    // S
    rotations(3, [0b0110, 0b0011, 0b0000, 0b0000]),
    // Z
    rotations(3, [0b0011, 0b0110, 0b0000, 0b0000]),
    // J
    rotations(3, [0b0001, 0b0111, 0b0000, 0b0000]),
    // L
    rotations(3, [0b0100, 0b0111, 0b0000, 0b0000]),
    // T
    rotations(3, [0b0010, 0b0111, 0b0000, 0b0000]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_rotation_has_four_cells() {
        for kind in PieceKind::ALL {
            for rotation in PieceRotation::all() {
                assert_eq!(
                    kind.occupied_positions(rotation).count(),
                    4,
                    "{kind:?} rotation {rotation:?}"
                );
            }
        }
    }

    #[test]
    fn vertical_i_piece_occupies_a_single_column() {
        let cells: Vec<_> = PieceKind::I.occupied_positions(PieceRotation::new(1)).collect();
        assert!(cells.iter().all(|&(dx, _)| dx == cells[0].0));
    }

    #[test]
    fn o_piece_is_rotation_invariant() {
        let spawn = PieceKind::O.mask(PieceRotation::new(0));
        for rotation in PieceRotation::all() {
            assert_eq!(PieceKind::O.mask(rotation), spawn);
        }
    }

    #[test]
    fn column_offsets_map_to_board_coordinates() {
        let piece = Piece::new(PieceKind::T);
        assert_eq!(piece.column(), 3);
        assert_eq!(piece.with_column(MIN_COLUMN).unwrap().position().x(), 0);
        assert_eq!(
            piece.with_column(MAX_COLUMN).unwrap().position().x(),
            TOTAL_WIDTH - 1
        );
        assert!(piece.with_column(MIN_COLUMN - 1).is_none());
        assert!(piece.with_column(MAX_COLUMN + 1).is_none());
    }

    #[test]
    fn shifted_rejects_positions_off_the_board() {
        let piece = Piece::new(PieceKind::L).with_column(MIN_COLUMN).unwrap();
        assert!(piece.shifted(-1, 0).is_none());
        assert!(piece.shifted(0, -1).is_none());
        assert_eq!(piece.shifted(1, 2).unwrap().position(), PiecePosition::new(1, 2));
    }

    #[test]
    fn rotation_wraps() {
        assert_eq!(PieceRotation::new(5), PieceRotation::new(1));
        assert_eq!(PieceRotation::new(3).rotated_right(), PieceRotation::new(0));
    }

    #[test]
    fn piece_kind_char_round_trip() {
        for kind in PieceKind::ALL {
            assert_eq!(PieceKind::from_char(kind.as_char()), Some(kind));
        }
        assert_eq!(PieceKind::from_char('X'), None);
    }
}
