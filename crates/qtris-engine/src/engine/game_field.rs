use crate::{
    GameOverError, PieceCollisionError,
    core::{
        bit_board::BitBoard,
        piece::{Piece, PieceKind},
    },
};

use super::piece_generator::PieceGenerator;

/// Maximum number of one-row steps taken when searching for a landing row.
///
/// A piece spawned above the field cannot fall further than the full board
/// height, so the bound only matters for corrupted positions.
pub const DROP_SAFETY_DEPTH: usize = BitBoard::PLAYABLE_HEIGHT + 10;

/// Board plus the falling piece and its successor.
///
/// The falling piece and the next kind are plain values; spawning moves the
/// next kind into the falling slot and draws a fresh successor.
#[derive(Debug, Clone)]
pub struct GameField {
    board: BitBoard,
    falling_piece: Piece,
    next_piece: PieceKind,
    generator: PieceGenerator,
}

impl GameField {
    #[must_use]
    pub fn new(mut generator: PieceGenerator) -> Self {
        let falling_piece = Piece::new(generator.next_kind());
        let next_piece = generator.next_kind();
        Self {
            board: BitBoard::INITIAL,
            falling_piece,
            next_piece,
            generator,
        }
    }

    /// Builds a field around an existing board, mainly for tests and analysis.
    #[must_use]
    pub fn from_parts(board: BitBoard, falling: PieceKind, next: PieceKind) -> Self {
        Self {
            board,
            falling_piece: Piece::new(falling),
            next_piece: next,
            generator: PieceGenerator::with_seed(0),
        }
    }

    #[must_use]
    pub fn board(&self) -> &BitBoard {
        &self.board
    }

    #[must_use]
    pub fn falling_piece(&self) -> Piece {
        self.falling_piece
    }

    #[must_use]
    pub fn next_piece(&self) -> PieceKind {
        self.next_piece
    }

    /// Collision test for `piece` shifted by `(dx, dy)` on the live board.
    #[must_use]
    pub fn is_colliding_at(&self, piece: Piece, dx: isize, dy: isize) -> bool {
        self.board.is_colliding_at(piece, dx, dy)
    }

    /// Returns the board row the piece would come to rest at when dropped
    /// straight down, or `None` if it already collides where it is.
    #[must_use]
    pub fn landing_row(&self, piece: Piece) -> Option<usize> {
        if self.board.is_colliding(piece) {
            return None;
        }
        let mut dropped = piece;
        for _ in 0..DROP_SAFETY_DEPTH {
            match dropped.down() {
                Some(next) if !self.board.is_colliding(next) => dropped = next,
                _ => break,
            }
        }
        Some(dropped.position().y())
    }

    /// Board that would result from locking `piece` at board row `row`.
    ///
    /// The live board is left untouched.
    pub fn simulate_place(&self, piece: Piece, row: usize) -> Result<BitBoard, PieceCollisionError> {
        let placed = piece.with_row(row).ok_or(PieceCollisionError)?;
        if self.board.is_colliding(placed) {
            return Err(PieceCollisionError);
        }
        let mut board = self.board.clone();
        board.fill_piece(placed);
        Ok(board)
    }

    /// Clears full rows of a simulated board, returning the count and the result.
    #[must_use]
    pub fn simulate_clear_lines(board: &BitBoard) -> (usize, BitBoard) {
        board.with_lines_cleared()
    }

    /// Locks `piece` into the live board, clears lines and spawns the next
    /// piece. Returns the number of cleared lines, and an error when the new
    /// piece has no room to spawn.
    pub(crate) fn lock_piece(&mut self, piece: Piece) -> (usize, Result<(), GameOverError>) {
        self.board.fill_piece(piece);
        let cleared = self.board.clear_lines();
        self.falling_piece = Piece::new(self.next_piece);
        self.next_piece = self.generator.next_kind();
        let spawn = if self.board.is_colliding(self.falling_piece) {
            Err(GameOverError)
        } else {
            Ok(())
        };
        (cleared, spawn)
    }

    /// Starts over with an empty board, continuing the piece sequence.
    pub(crate) fn reset(&mut self) {
        self.board = BitBoard::INITIAL;
        self.falling_piece = Piece::new(self.generator.next_kind());
        self.next_piece = self.generator.next_kind();
    }
}
