//! Fixed-length feature encoding of a board and piece situation.
//!
//! Layout (29 values):
//!
//! | index    | feature                      | scale |
//! |----------|------------------------------|-------|
//! | 0..10    | column heights               | / 20  |
//! | 10       | holes                        | / 100 |
//! | 11       | bumpiness                    | / 50  |
//! | 12       | aggregate height             | / 200 |
//! | 13..20   | one-hot falling piece kind   |       |
//! | 20..27   | one-hot next piece kind      |       |
//! | 27       | total cleared lines          | / 100 |
//! | 28       | level                        | / 20  |
//!
//! A state built for a *simulated* placement has an all-zero falling-piece
//! block, since that piece is already part of the board.

use std::ops::Range;

use qtris_engine::{BitBoard, GameSession, PieceKind};

pub const HEIGHTS: Range<usize> = 0..BitBoard::PLAYABLE_WIDTH;
pub const HOLES: usize = HEIGHTS.end;
pub const BUMPINESS: usize = HOLES + 1;
pub const AGGREGATE_HEIGHT: usize = BUMPINESS + 1;
pub const CURRENT_PIECE: Range<usize> = (AGGREGATE_HEIGHT + 1)..(AGGREGATE_HEIGHT + 1 + PieceKind::LEN);
pub const NEXT_PIECE: Range<usize> = CURRENT_PIECE.end..(CURRENT_PIECE.end + PieceKind::LEN);
pub const LINES: usize = NEXT_PIECE.end;
pub const LEVEL: usize = LINES + 1;

/// Length of every state vector; equals the network's input width.
pub const INPUT_SIZE: usize = LEVEL + 1;

const HEIGHT_SCALE: f32 = 20.0;
const HOLES_SCALE: f32 = 100.0;
const BUMPINESS_SCALE: f32 = 50.0;
const AGGREGATE_HEIGHT_SCALE: f32 = 200.0;
const LINES_SCALE: f32 = 100.0;
const LEVEL_SCALE: f32 = 20.0;

/// Encoded game situation. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector([f32; INPUT_SIZE]);

impl StateVector {
    /// Encodes an arbitrary board and piece situation.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_board(
        board: &BitBoard,
        current: Option<PieceKind>,
        next: Option<PieceKind>,
        cleared_lines: usize,
        level: usize,
    ) -> Self {
        let mut values = [0.0; INPUT_SIZE];

        for (slot, height) in values[HEIGHTS].iter_mut().zip(board.column_heights()) {
            *slot = height as f32 / HEIGHT_SCALE;
        }
        values[HOLES] = board.num_holes() as f32 / HOLES_SCALE;
        values[BUMPINESS] = board.bumpiness() as f32 / BUMPINESS_SCALE;
        values[AGGREGATE_HEIGHT] = board.aggregate_height() as f32 / AGGREGATE_HEIGHT_SCALE;
        if let Some(kind) = current {
            values[CURRENT_PIECE.start + kind.index()] = 1.0;
        }
        if let Some(kind) = next {
            values[NEXT_PIECE.start + kind.index()] = 1.0;
        }
        values[LINES] = cleared_lines as f32 / LINES_SCALE;
        values[LEVEL] = level as f32 / LEVEL_SCALE;

        Self(values)
    }

    /// Encodes the live situation of a game.
    #[must_use]
    pub fn from_session(session: &GameSession) -> Self {
        let stats = session.stats();
        Self::from_board(
            session.field().board(),
            Some(session.falling_piece().kind()),
            Some(session.next_piece()),
            stats.total_cleared_lines(),
            stats.level(),
        )
    }

    /// Encodes the situation right after the falling piece has been placed,
    /// producing `board` and clearing `cleared_lines` lines.
    #[must_use]
    pub fn after_placement(session: &GameSession, board: &BitBoard, cleared_lines: usize) -> Self {
        let stats = session.stats();
        Self::from_board(
            board,
            None,
            Some(session.next_piece()),
            stats.total_cleared_lines() + cleared_lines,
            stats.level(),
        )
    }

    #[must_use]
    pub fn from_array(values: [f32; INPUT_SIZE]) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn as_array(&self) -> &[f32; INPUT_SIZE] {
        &self.0
    }
}

/// Human-readable label for an input index, used by weight reports.
#[must_use]
pub fn feature_name(index: usize) -> String {
    match index {
        i if HEIGHTS.contains(&i) => format!("height[{i}]"),
        HOLES => "holes".to_owned(),
        BUMPINESS => "bumpiness".to_owned(),
        AGGREGATE_HEIGHT => "aggregate_height".to_owned(),
        i if CURRENT_PIECE.contains(&i) => {
            format!("current={}", PieceKind::ALL[i - CURRENT_PIECE.start].as_char())
        }
        i if NEXT_PIECE.contains(&i) => {
            format!("next={}", PieceKind::ALL[i - NEXT_PIECE.start].as_char())
        }
        LINES => "lines".to_owned(),
        LEVEL => "level".to_owned(),
        i => format!("input[{i}]"),
    }
}

#[cfg(test)]
mod tests {
    use qtris_engine::{GameField, PieceRotation};

    use super::*;

    #[test]
    fn layout_is_29_wide() {
        assert_eq!(INPUT_SIZE, 29);
        assert_eq!(CURRENT_PIECE, 13..20);
        assert_eq!(NEXT_PIECE, 20..27);
    }

    #[test]
    fn empty_board_encodes_only_pieces_and_level() {
        let field = GameField::from_parts(BitBoard::INITIAL, PieceKind::T, PieceKind::I);
        let session = GameSession::from_field(field);
        let state = StateVector::from_session(&session);
        let values = state.as_array();

        assert!(values[HEIGHTS].iter().all(|&v| v == 0.0));
        assert_eq!(values[CURRENT_PIECE.start + PieceKind::T.index()], 1.0);
        assert_eq!(values[NEXT_PIECE.start + PieceKind::I.index()], 1.0);
        assert_eq!(values[CURRENT_PIECE].iter().sum::<f32>(), 1.0);
        assert_eq!(values[LEVEL], 1.0 / 20.0);
    }

    #[test]
    fn board_metrics_are_normalized() {
        let board = BitBoard::from_ascii(
            r"
            #.........
            ..........
            ##........
            ",
        );
        let state = StateVector::from_board(&board, None, None, 50, 6);
        let values = state.as_array();
        assert_eq!(values[0], 3.0 / 20.0);
        assert_eq!(values[1], 1.0 / 20.0);
        assert_eq!(values[HOLES], 1.0 / 100.0);
        assert_eq!(values[BUMPINESS], 3.0 / 50.0);
        assert_eq!(values[AGGREGATE_HEIGHT], 4.0 / 200.0);
        assert_eq!(values[LINES], 0.5);
        assert_eq!(values[LEVEL], 0.3);
    }

    #[test]
    fn placement_state_drops_current_piece_and_counts_clears() {
        let field = GameField::from_parts(BitBoard::from_ascii("######...."), PieceKind::I, PieceKind::O);
        let session = GameSession::from_field(field);
        let piece = session.falling_piece().with_rotation(PieceRotation::new(0)).with_column(6).unwrap();
        let row = session.field().landing_row(piece).unwrap();
        let placed = session.field().simulate_place(piece, row).unwrap();
        let (cleared, board) = GameField::simulate_clear_lines(&placed);

        let state = StateVector::after_placement(&session, &board, cleared);
        let values = state.as_array();
        assert!(values[CURRENT_PIECE].iter().all(|&v| v == 0.0));
        assert_eq!(values[NEXT_PIECE.start + PieceKind::O.index()], 1.0);
        assert_eq!(values[LINES], 0.01);
        assert_eq!(values[AGGREGATE_HEIGHT], 0.0);
    }

    #[test]
    fn every_index_has_a_name() {
        assert_eq!(feature_name(0), "height[0]");
        assert_eq!(feature_name(CURRENT_PIECE.start), "current=I");
        assert_eq!(feature_name(LEVEL), "level");
    }
}
