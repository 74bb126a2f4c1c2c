use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use self::{inspect::InspectArg, play::PlayArg, train::TrainArg};

mod inspect;
mod play;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Also append log events to this file
    #[arg(long, global = true)]
    diagnostics_log: Option<PathBuf>,
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train the agent by self-play
    Train(#[clap(flatten)] TrainArg),
    /// Play greedy evaluation games with a trained checkpoint
    Play(#[clap(flatten)] PlayArg),
    /// Print checkpoint metadata and weight diagnostics
    Inspect(#[clap(flatten)] InspectArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    crate::logging::init(args.verbose, args.diagnostics_log.as_deref())?;
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Play(arg) => play::run(&arg)?,
        Mode::Inspect(arg) => inspect::run(&arg)?,
    }
    Ok(())
}
