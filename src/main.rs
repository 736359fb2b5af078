use anyhow::Result;
use boardlang::{options::Options, runtime::Game, Context};
use clap::{Parser, Subcommand};
use colorized::{Color, Colors};
use std::{io::Read, time::Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Rule file, or pass "-" to read from stdin
    #[clap(value_parser)]
    file: clio::Input,

    /// Log every applied and undone move
    #[clap(long)]
    trace: bool,

    /// Report elapsed time
    #[clap(long)]
    timing: bool,

    /// Longest move explored during move generation, in letters
    #[clap(long, default_value_t = 256)]
    max_move_length: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the board and the legal moves of the player to move
    Moves,
    /// Count the leaf positions reachable in `depth` moves
    Perft { depth: usize },
    /// Print the board and the legal moves as JSON
    Json,
    /// Print the automaton compiled for each piece
    Automata,
}

fn player_color(player: usize) -> Colors {
    match player % 6 {
        0 => Colors::CyanFg,
        1 => Colors::RedFg,
        2 => Colors::GreenFg,
        3 => Colors::YellowFg,
        4 => Colors::MagentaFg,
        _ => Colors::BlueFg,
    }
}

fn init_logging(args: &Cli) {
    let default = if args.trace {
        "warn,boardlang=trace"
    } else if args.timing {
        "warn,boardlang=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_board(game: &Game) {
    let rules = game.rules();
    let board = game.board();
    let width = rules
        .pieces
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(1);
    println!(
        "{} to move",
        game.player_name(game.current_player())
            .color(player_color(game.current_player().0))
    );
    for y in (0..board.height() as i64).rev() {
        let mut line = String::new();
        for x in 0..board.width() as i64 {
            let cell = match board.get(x, y) {
                Ok(Some(piece)) => {
                    let piece = &rules.pieces[piece.0];
                    format!("{:>width$}", piece.name).color(player_color(piece.owner.0))
                }
                _ => format!("{:>width$}", ".").color(Colors::BrightBlackFg),
            };
            line.push_str(&cell);
            line.push(' ');
        }
        println!("{}", line.trim_end());
    }
}

fn main() -> Result<()> {
    let mut args = Cli::parse();
    init_logging(&args);

    let mut source = String::new();
    args.file.read_to_string(&mut source)?;
    let filename = args.file.path().to_string_lossy().to_string();

    let options = Options {
        trace: args.trace,
        timing: args.timing,
        max_move_length: args.max_move_length,
    };

    let mut game = Context::new()
        .set_options(options)
        .add_file(&filename, &source)?
        .build()?;

    match args.command {
        Command::Moves => {
            print_board(&game);
            let start = Instant::now();
            let moves = game.generate_moves();
            if args.timing {
                info!("generated {} moves in {:?}", moves.len(), start.elapsed());
            }
            for mv in &moves {
                println!("{}", mv);
            }
        }
        Command::Perft { depth } => {
            let start = Instant::now();
            let nodes = game.perft(depth)?;
            println!("{}", nodes);
            if args.timing {
                let elapsed = start.elapsed();
                info!(
                    "{} nodes in {:?} ({:.0} nodes/s)",
                    nodes,
                    elapsed,
                    nodes as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
                );
            }
        }
        Command::Json => {
            println!("{}", serde_json::to_string_pretty(&game.serialize()?)?);
        }
        Command::Automata => {
            for piece in &game.rules().pieces {
                println!("{} ({})", piece.name, game.player_name(piece.owner));
                print!("{}", piece.dfa);
            }
        }
    }

    Ok(())
}
