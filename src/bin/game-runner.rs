use std::{env, fs, process::ExitCode};

use anyhow::{bail, Context};
use game_runner::prelude::*;

const USAGE: &str =
    "usage: game-runner [--seed FILE] [--output FILE] <referee command> <player command>...";

struct Args {
    seed: Option<String>,
    output: Option<String>,
    referee: String,
    players: Vec<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut seed = None;
    let mut output = None;
    let mut commands = vec![];
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seed" => seed = Some(args.next().context("--seed expects a file")?),
            "--output" => output = Some(args.next().context("--output expects a file")?),
            _ => commands.push(arg),
        }
    }
    let mut commands = commands.into_iter();
    let Some(referee) = commands.next() else {
        bail!("missing referee command");
    };
    let players = commands.collect::<Vec<_>>();
    if players.is_empty() {
        bail!("missing player command");
    }
    Ok(Args {
        seed,
        output,
        referee,
        players,
    })
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut runner = GameRunner::with_command_line_referee(&args.referee, Configuration::from_env())?;
    if let Some(seed) = &args.seed {
        runner = runner.with_init_file(seed)?;
    }
    for player in &args.players {
        runner.add_command_line_player(player)?;
    }

    let outcome = runner.run();
    let json = runner.result().to_json()?;
    match &args.output {
        Some(path) => fs::write(path, json).with_context(|| format!("could not write {path}"))?,
        None => println!("{json}"),
    }
    outcome.map(|end| eprintln!("{end:?}"))
}

fn main() -> ExitCode {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
