use crate::{
    GameOverError, MAX_COLUMN, MIN_COLUMN,
    core::piece::{Piece, PieceKind, PieceRotation},
};

use super::{GameStats, game_field::GameField, piece_generator::PieceGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum SessionState {
    Playing,
    GameOver,
}

/// Result of executing one `(rotation, column)` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    /// The piece as it was locked, after any column correction.
    pub placed: Piece,
    pub cleared_lines: usize,
    /// Points earned by this placement.
    pub points: usize,
    pub game_over: bool,
}

/// One game: a [`GameField`] plus score bookkeeping.
///
/// The only way to change the live board is [`execute_action`](Self::execute_action);
/// everything else is a read-only view.
#[derive(Debug, Clone)]
pub struct GameSession {
    field: GameField,
    stats: GameStats,
    state: SessionState,
}

impl GameSession {
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_generator(PieceGenerator::with_seed(seed))
    }

    #[must_use]
    pub fn with_generator(generator: PieceGenerator) -> Self {
        Self {
            field: GameField::new(generator),
            stats: GameStats::new(),
            state: SessionState::Playing,
        }
    }

    /// Wraps an existing field, e.g. one built with [`GameField::from_parts`].
    #[must_use]
    pub fn from_field(field: GameField) -> Self {
        Self {
            field,
            stats: GameStats::new(),
            state: SessionState::Playing,
        }
    }

    #[must_use]
    pub fn field(&self) -> &GameField {
        &self.field
    }

    #[must_use]
    pub fn stats(&self) -> &GameStats {
        &self.stats
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn falling_piece(&self) -> Piece {
        self.field.falling_piece()
    }

    #[must_use]
    pub fn next_piece(&self) -> PieceKind {
        self.field.next_piece()
    }

    /// Drops the falling piece with the given rotation at the given column.
    ///
    /// If that placement collides, the nearest admissible column for the same
    /// rotation is used instead, and failing that the piece drops as spawned.
    pub fn execute_action(
        &mut self,
        rotation: PieceRotation,
        column: i8,
    ) -> Result<ActionOutcome, GameOverError> {
        if self.state.is_game_over() {
            return Err(GameOverError);
        }

        let piece = self.resolve_placement(rotation, column);
        let Some(row) = self.field.landing_row(piece) else {
            self.state = SessionState::GameOver;
            return Ok(ActionOutcome {
                placed: piece,
                cleared_lines: 0,
                points: 0,
                game_over: true,
            });
        };
        let placed = piece.with_row(row).unwrap_or(piece);

        let (cleared_lines, spawn) = self.field.lock_piece(placed);
        let points = self.stats.complete_piece_drop(cleared_lines);
        let game_over = spawn.is_err();
        if game_over {
            self.state = SessionState::GameOver;
        }

        Ok(ActionOutcome {
            placed,
            cleared_lines,
            points,
            game_over,
        })
    }

    fn resolve_placement(&self, rotation: PieceRotation, column: i8) -> Piece {
        let board = self.field.board();
        let rotated = self.field.falling_piece().with_rotation(rotation);
        let fits = |column: i8| {
            rotated
                .with_column(column)
                .filter(|piece| !board.is_colliding(*piece))
        };

        let column = column.clamp(MIN_COLUMN, MAX_COLUMN);
        (0..=MAX_COLUMN - MIN_COLUMN)
            .flat_map(|distance| [column - distance, column + distance])
            .find_map(fits)
            .unwrap_or_else(|| self.field.falling_piece())
    }

    /// Starts a new game on an empty board. The piece sequence continues, so
    /// consecutive games differ.
    pub fn reset(&mut self) {
        self.field.reset();
        self.stats = GameStats::new();
        self.state = SessionState::Playing;
    }
}
