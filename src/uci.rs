use crate::chess::game::GameState;
use crate::chess::perft::{perft, perft_split};
use crate::search::parallel::ParallelSearcher;
use crate::search::searcher::SearchResult;
use std::time::Instant;

const OVERHEAD_MS: u64 = 20;
const BYTES_PER_ENTRY: usize = 16;

pub fn run_command(command: &str, game: &mut GameState, engine: &mut ParallelSearcher) {
    let tokens: Vec<&str> = command.split_whitespace().collect();

    if tokens.is_empty() {
        return;
    }

    match tokens[0] {
        "uci" => {
            println!("id name petrel");
            println!("option name Hash type spin default 256 min 1 max 65536");
            println!("option name Threads type spin default 1 min 1 max 1024");
            println!("uciok");
        }
        "isready" => println!("readyok"),
        "ucinewgame" => {
            *game = GameState::default();
            engine.clear_table();
        }
        "position" => uci_position(&tokens, game),
        "go" => uci_go(&tokens, game, engine),
        "setoption" => uci_setoption(&tokens, engine),
        "stop" => engine.stop(),
        "quit" => std::process::exit(0),
        // Debug commands outside the protocol.
        "d" | "display" => game.display(),
        "eval" => println!("{}", game.evaluate()),
        "perft" => {
            if let Some(depth) = tokens.get(1).and_then(|t| t.parse::<u32>().ok()) {
                let start_time = Instant::now();
                let nodes = perft(game.board(), depth);
                let nps = nodes * 1000 / (start_time.elapsed().as_millis().max(1) as u64);
                println!("{nodes} nodes {nps} nps");
            } else {
                println!("info string error parsing perft depth");
            }
        }
        "perftsplit" | "splitperft" => {
            if let Some(depth) = tokens.get(1).and_then(|t| t.parse::<u32>().ok()) {
                perft_split(game.board(), depth);
            } else {
                println!("info string error parsing {} depth", tokens[0]);
            }
        }
        _ => {}
    }
}

fn uci_position(tokens: &[&str], game: &mut GameState) {
    if tokens.len() <= 1 {
        return;
    }

    match tokens[1] {
        "startpos" => *game = GameState::default(),
        "fen" => {
            let fen: String = tokens
                .iter()
                .skip(2)
                .take_while(|&&t| t != "moves")
                .copied()
                .collect::<Vec<_>>()
                .join(" ");

            match GameState::try_from(fen.as_str()) {
                Ok(parsed) => *game = parsed,
                Err(error) => {
                    // The previous position stays in place.
                    println!("info string {error}");
                    return;
                }
            }
        }
        _ => return,
    }

    if let Some(moves_idx) = tokens.iter().position(|&t| t == "moves") {
        for uci_move in &tokens[moves_idx + 1..] {
            match game.find_move(uci_move) {
                Some(mv) => {
                    if !game.apply(mv) {
                        println!("info string move {uci_move} refused");
                        return;
                    }
                }
                None => {
                    println!("info string illegal move {uci_move}");
                    return;
                }
            }
        }
    }
}

fn uci_go(tokens: &[&str], game: &mut GameState, engine: &mut ParallelSearcher) {
    let mut depth: Option<i32> = None;
    let mut nodes: Option<u64> = None;
    let mut think_ms: Option<u64> = None;

    for pair in tokens[1..].chunks(2) {
        if let &[key, value] = pair {
            match key {
                "depth" => depth = value.parse().ok(),
                "nodes" => nodes = value.parse().ok(),
                "movetime" => {
                    think_ms = value
                        .parse::<u64>()
                        .ok()
                        .map(|ms| ms.saturating_sub(OVERHEAD_MS).max(1));
                }
                "wtime" if game.white_to_move() => think_ms = clock_share(value),
                "btime" if !game.white_to_move() => think_ms = clock_share(value),
                _ => {}
            }
        }
    }

    let result = if let Some(depth) = depth {
        engine.depth_bound_search(game, depth)
    } else if let Some(nodes) = nodes {
        engine.node_bound_search(game, nodes, 63)
    } else if let Some(think_ms) = think_ms {
        engine.time_bound_search(game, think_ms)
    } else {
        // "go infinite" and bare "go" run until "stop" or the cap.
        engine.depth_bound_search(game, 63)
    };

    report(&result, engine);
}

fn clock_share(value: &str) -> Option<u64> {
    let remaining: i64 = value.parse().ok()?;
    let share = (remaining.max(0) as u64 / 25).saturating_sub(OVERHEAD_MS);
    Some(share.max(1))
}

fn uci_setoption(tokens: &[&str], engine: &mut ParallelSearcher) {
    let name = tokens
        .iter()
        .position(|&t| t == "name")
        .and_then(|i| tokens.get(i + 1));

    let value = tokens
        .iter()
        .position(|&t| t == "value")
        .and_then(|i| tokens.get(i + 1));

    if let (Some(&name), Some(&value)) = (name, value) {
        match name {
            "Threads" => {
                if let Ok(threads) = value.parse() {
                    engine.set_threads(threads);
                }
            }
            "Hash" => {
                if let Ok(megabytes) = value.parse::<usize>() {
                    engine.set_table_entries(megabytes.max(1) * 1024 * 1024 / BYTES_PER_ENTRY);
                }
            }
            _ => {}
        }
    }
}

fn report(result: &SearchResult, engine: &ParallelSearcher) {
    println!(
        "info depth {} score cp {} nodes {} hashfull {}",
        result.depth,
        result.score,
        result.nodes,
        engine.hashfull()
    );

    if result.ponder.is_null() {
        println!("bestmove {}", result.best);
    } else {
        println!("bestmove {} ponder {}", result.best, result.ponder);
    }
}
