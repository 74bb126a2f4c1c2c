use qtris_engine::ActionOutcome;

/// Reward for losing the game.
pub const GAME_OVER_REWARD: f32 = -10.0;
/// Granted for every placement that does not end the game.
pub const SURVIVAL_BONUS: f32 = 0.1;
pub const HOLE_PENALTY: f32 = 0.5;
/// Points are divided by this before being used as a reward.
pub const POINTS_SCALE: f32 = 100.0;

/// Reward of one executed action, given the hole counts of the board before
/// and after it.
///
/// ```
/// # use qtris_engine::{ActionOutcome, Piece, PieceKind};
/// # use qtris_training::reward::action_reward;
/// let outcome = ActionOutcome {
///     placed: Piece::new(PieceKind::I),
///     cleared_lines: 1,
///     points: 100,
///     game_over: false,
/// };
/// assert!((action_reward(&outcome, 2, 1) - 1.1).abs() < 1e-6);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn action_reward(outcome: &ActionOutcome, holes_before: usize, holes_after: usize) -> f32 {
    if outcome.game_over {
        return GAME_OVER_REWARD;
    }
    let new_holes = holes_after.saturating_sub(holes_before) as f32;
    outcome.points as f32 / POINTS_SCALE + SURVIVAL_BONUS - HOLE_PENALTY * new_holes
}
