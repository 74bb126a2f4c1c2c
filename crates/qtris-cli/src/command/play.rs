use std::path::PathBuf;

use anyhow::bail;
use qtris_engine::{BitBoard, GameSession, PieceRotation};
use qtris_evaluator::{move_search::MoveSearch, value_network::ValueNetwork};
use qtris_stats::descriptive::DescriptiveStats;
use rand::SeedableRng as _;
use rand_pcg::Pcg32;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct PlayArg {
    /// Checkpoint to play with
    #[arg(long, default_value = "qtris_model.txt")]
    checkpoint: PathBuf,
    /// Number of games to play
    #[arg(long, default_value_t = 10)]
    games: u64,
    /// Piece limit per game
    #[arg(long, default_value_t = 10_000)]
    max_pieces: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Print the final board of every game
    #[arg(long)]
    show_board: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GameResult {
    score: usize,
    lines: usize,
    pieces: usize,
}

fn play_game(network: &ValueNetwork, session: &mut GameSession, max_pieces: usize, rng: &mut Pcg32) -> GameResult {
    let search = MoveSearch::new(network);
    while !session.state().is_game_over() && session.stats().completed_pieces() < max_pieces {
        let (rotation, column) = search
            .select_move(session, false, rng)
            .best
            .map_or((PieceRotation::new(0), 4), |m| (m.rotation, m.column));
        if session.execute_action(rotation, column).is_err() {
            break;
        }
    }
    let stats = session.stats();
    GameResult {
        score: stats.score(),
        lines: stats.total_cleared_lines(),
        pieces: stats.completed_pieces(),
    }
}

fn render_board(board: &BitBoard) -> String {
    board
        .playable_rows()
        .map(|row| {
            let cells: String = row
                .iter_playable_cells()
                .map(|occupied| if occupied { '#' } else { '.' })
                .collect();
            format!("|{cells}|\n")
        })
        .collect()
}

pub(crate) fn run(arg: &PlayArg) -> anyhow::Result<()> {
    let mut rng = Pcg32::seed_from_u64(arg.seed);
    let mut network = ValueNetwork::new(&mut rng);
    if !network.load(&arg.checkpoint) {
        bail!("Failed to load checkpoint: {}", arg.checkpoint.display());
    }

    let mut results = vec![];
    for game in 0..arg.games {
        let mut session = GameSession::with_seed(arg.seed.wrapping_add(game));
        let result = play_game(&network, &mut session, arg.max_pieces, &mut rng);
        println!(
            "Game #{}: score {}, lines {}, pieces {}",
            game + 1,
            result.score,
            result.lines,
            result.pieces
        );
        if arg.show_board {
            print!("{}", render_board(session.field().board()));
        }
        results.push(result);
    }

    #[expect(clippy::cast_precision_loss)]
    let scores = results.iter().map(|r| r.score as f32);
    if let Some(stats) = DescriptiveStats::new(scores) {
        println!();
        println!("Games: {}", stats.count);
        println!(
            "Score: mean {:.1}, median {:.1}, min {:.0}, max {:.0}, std {:.1}",
            stats.mean, stats.median, stats.min, stats.max, stats.std_dev
        );
    }
    Ok(())
}
