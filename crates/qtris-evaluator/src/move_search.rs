//! Epsilon-greedy selection of a `(rotation, column)` action.
//!
//! When exploring, a uniformly random action is returned without evaluating
//! anything. Otherwise every rotation is tried against columns ordered
//! center-outward with strict left/right alternation, so that an early exit
//! never leaves one side of the board unexamined:
//!
//! ```text
//! 4, 3, 5, 2, 6, 1, 7, 0, 8, -1, 9, -2, 10, 11
//! ```
//!
//! Each admissible candidate is dropped on a copy of the board, full rows are
//! cleared, and the resulting state is scored by a [`StateEvaluator`]. The
//! search stops after [`MAX_EVALUATIONS`] candidates, or as soon as at least
//! [`MIN_EVALUATIONS`] have been scored and the best value exceeds
//! [`GOOD_ENOUGH_VALUE`].

use std::{
    fmt,
    time::{Duration, Instant},
};

use arrayvec::ArrayVec;
use qtris_engine::{GameField, GameSession, MAX_COLUMN, MIN_COLUMN, Piece, PieceRotation};
use rand::Rng;

use crate::{state_vector::StateVector, value_network::ValueNetwork};

/// Upper bound on candidates scored per search.
pub const MAX_EVALUATIONS: usize = 200;
/// Candidates that must be scored before an early exit is allowed.
pub const MIN_EVALUATIONS: usize = 10;
/// Best value above which the search may stop early.
pub const GOOD_ENOUGH_VALUE: f32 = 50.0;

#[expect(clippy::cast_sign_loss)]
const COLUMN_COUNT: usize = (MAX_COLUMN - MIN_COLUMN + 1) as usize;
const CENTER_COLUMN: i8 = (MIN_COLUMN + MAX_COLUMN) / 2;

/// Scores a game state; higher is better.
pub trait StateEvaluator: fmt::Debug {
    fn evaluate(&self, state: &StateVector) -> f32;
}

impl StateEvaluator for ValueNetwork {
    fn evaluate(&self, state: &StateVector) -> f32 {
        self.forward(state)
    }
}

/// A chosen action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub rotation: PieceRotation,
    pub column: i8,
    /// Estimated value of the resulting state; `0.0` for exploratory moves.
    pub value: f32,
    /// Whether the move was drawn at random.
    pub explored: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// `None` when no candidate was admissible.
    pub best: Option<Move>,
    /// Number of candidates scored.
    pub evaluated: usize,
    pub early_exit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("move search exceeded its {budget:?} budget after {evaluated} evaluations")]
pub struct SearchTimedOut {
    pub budget: Duration,
    pub evaluated: usize,
}

/// Columns ordered from the board center outwards, alternating left and right.
#[must_use]
pub fn center_out_columns() -> ArrayVec<i8, COLUMN_COUNT> {
    let mut columns = ArrayVec::new();
    columns.push(CENTER_COLUMN);
    for distance in 1.. {
        let left = CENTER_COLUMN - distance;
        let right = CENTER_COLUMN + distance;
        if left < MIN_COLUMN && right > MAX_COLUMN {
            break;
        }
        if left >= MIN_COLUMN {
            columns.push(left);
        }
        if right <= MAX_COLUMN {
            columns.push(right);
        }
    }
    columns
}

#[derive(Debug)]
pub struct MoveSearch<'a> {
    evaluator: &'a dyn StateEvaluator,
}

impl<'a> MoveSearch<'a> {
    #[must_use]
    pub fn new(evaluator: &'a dyn StateEvaluator) -> Self {
        Self { evaluator }
    }

    /// Picks an action for the falling piece of `session`.
    ///
    /// Runs in bounded time regardless of the board.
    pub fn select_move<R>(&self, session: &GameSession, exploring: bool, rng: &mut R) -> SearchResult
    where
        R: Rng + ?Sized,
    {
        // Without a deadline the search cannot time out.
        self.search(session, exploring, rng, None)
            .unwrap_or_else(|evaluated| SearchResult {
                best: None,
                evaluated,
                early_exit: false,
            })
    }

    /// Like [`select_move`](Self::select_move), but gives up once `budget`
    /// has elapsed. Partial results are discarded.
    pub fn select_move_within<R>(
        &self,
        session: &GameSession,
        exploring: bool,
        rng: &mut R,
        budget: Duration,
    ) -> Result<SearchResult, SearchTimedOut>
    where
        R: Rng + ?Sized,
    {
        let deadline = Instant::now() + budget;
        self.search(session, exploring, rng, Some(deadline))
            .map_err(|evaluated| SearchTimedOut { budget, evaluated })
    }

    fn search<R>(
        &self,
        session: &GameSession,
        exploring: bool,
        rng: &mut R,
        deadline: Option<Instant>,
    ) -> Result<SearchResult, usize>
    where
        R: Rng + ?Sized,
    {
        if exploring {
            return Ok(SearchResult {
                best: Some(random_move(rng)),
                evaluated: 0,
                early_exit: false,
            });
        }

        let field = session.field();
        let falling = session.falling_piece();
        let columns = center_out_columns();
        let mut best: Option<Move> = None;
        let mut evaluated = 0;

        'search: for rotation in PieceRotation::all() {
            let rotated = falling.with_rotation(rotation);
            for &column in &columns {
                if evaluated >= MAX_EVALUATIONS {
                    break 'search;
                }
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Err(evaluated);
                }
                let Some(value) = self.score_candidate(session, field, rotated, column) else {
                    continue;
                };
                evaluated += 1;

                if best.is_none_or(|best| value > best.value) {
                    best = Some(Move {
                        rotation,
                        column,
                        value,
                        explored: false,
                    });
                }
                if evaluated >= MIN_EVALUATIONS && best.is_some_and(|best| best.value > GOOD_ENOUGH_VALUE) {
                    return Ok(SearchResult {
                        best,
                        evaluated,
                        early_exit: true,
                    });
                }
            }
        }

        Ok(SearchResult {
            best,
            evaluated,
            early_exit: false,
        })
    }

    /// Scores one placement, or `None` when it is not admissible.
    fn score_candidate(
        &self,
        session: &GameSession,
        field: &GameField,
        rotated: Piece,
        column: i8,
    ) -> Option<f32> {
        let piece = rotated.with_column(column)?;
        let row = field.landing_row(piece)?;
        let placed = field.simulate_place(piece, row).ok()?;
        let (cleared_lines, board) = GameField::simulate_clear_lines(&placed);
        let state = StateVector::after_placement(session, &board, cleared_lines);
        Some(self.evaluator.evaluate(&state))
    }
}

fn random_move<R>(rng: &mut R) -> Move
where
    R: Rng + ?Sized,
{
    #[expect(clippy::cast_possible_truncation)]
    let rotation = PieceRotation::new(rng.random_range(0..PieceRotation::LEN) as u8);
    Move {
        rotation,
        column: rng.random_range(MIN_COLUMN..=MAX_COLUMN),
        value: 0.0,
        explored: true,
    }
}

#[cfg(test)]
mod tests {
    use qtris_engine::{BitBoard, PieceKind};
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::state_vector::LINES;

    #[derive(Debug)]
    struct Constant(f32);

    impl StateEvaluator for Constant {
        fn evaluate(&self, _state: &StateVector) -> f32 {
            self.0
        }
    }

    #[derive(Debug)]
    struct LineLover;

    impl StateEvaluator for LineLover {
        fn evaluate(&self, state: &StateVector) -> f32 {
            state.as_array()[LINES] * 100.0
        }
    }

    fn session_on(board: &str, falling: PieceKind) -> GameSession {
        GameSession::from_field(GameField::from_parts(
            BitBoard::from_ascii(board),
            falling,
            PieceKind::T,
        ))
    }

    fn rng() -> Pcg32 {
        Pcg32::seed_from_u64(7)
    }

    #[test]
    fn columns_alternate_from_the_center() {
        assert_eq!(
            center_out_columns().as_slice(),
            &[4, 3, 5, 2, 6, 1, 7, 0, 8, -1, 9, -2, 10, 11]
        );
    }

    #[test]
    fn empty_board_yields_legal_move_with_network() {
        let mut rng = rng();
        let network = ValueNetwork::new(&mut rng);
        for kind in PieceKind::ALL {
            let session = session_on("", kind);
            let result = MoveSearch::new(&network).select_move(&session, false, &mut rng);
            let best = result.best.unwrap();
            assert!(best.value.is_finite());
            assert!((MIN_COLUMN..=MAX_COLUMN).contains(&best.column));
            assert!(result.evaluated >= MIN_EVALUATIONS);
            assert!(result.evaluated <= MAX_EVALUATIONS);
            let piece = session.falling_piece().with_rotation(best.rotation).with_column(best.column);
            assert!(piece.is_some_and(|p| !session.field().board().is_colliding(p)));
        }
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let session = session_on("", PieceKind::O);
        let result = MoveSearch::new(&Constant(0.0)).select_move(&session, false, &mut rng());
        let best = result.best.unwrap();
        assert_eq!(best.rotation.as_u8(), 0);
        assert_eq!(best.column, 4);
        assert!(!result.early_exit);
    }

    #[test]
    fn good_enough_value_exits_after_minimum_evaluations() {
        let session = session_on("", PieceKind::T);
        let result = MoveSearch::new(&Constant(99.0)).select_move(&session, false, &mut rng());
        assert!(result.early_exit);
        assert_eq!(result.evaluated, MIN_EVALUATIONS);
    }

    #[test]
    fn evaluator_preference_drives_the_choice() {
        let session = session_on("######....", PieceKind::I);
        let result = MoveSearch::new(&LineLover).select_move(&session, false, &mut rng());
        let best = result.best.unwrap();
        assert_eq!(best.rotation.as_u8(), 0);
        assert_eq!(best.column, 6);
        assert!((best.value - 1.0).abs() < 1e-5);
    }

    #[test]
    fn exploring_skips_evaluation() {
        let session = session_on("", PieceKind::S);
        let mut rng = rng();
        for _ in 0..50 {
            let result = MoveSearch::new(&Constant(1.0)).select_move(&session, true, &mut rng);
            let best = result.best.unwrap();
            assert!(best.explored);
            assert_eq!(best.value, 0.0);
            assert_eq!(result.evaluated, 0);
            assert!((MIN_COLUMN..=MAX_COLUMN).contains(&best.column));
        }
    }

    #[test]
    fn zero_budget_times_out() {
        let session = session_on("", PieceKind::L);
        let err = MoveSearch::new(&Constant(0.0))
            .select_move_within(&session, false, &mut rng(), Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.evaluated, 0);
    }

    #[test]
    fn generous_budget_matches_unbounded_search() {
        let session = session_on("", PieceKind::J);
        let search = MoveSearch::new(&LineLover);
        let bounded = search
            .select_move_within(&session, false, &mut rng(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(bounded, search.select_move(&session, false, &mut rng()));
    }
}
