//! The UCI front-end: a line-oriented command loop on stdin.
//!
//! The reader thread owns the current position and options. `go` hands a
//! clone of the position to a worker thread that runs the iterative
//! deepening loop and prints `info`/`bestmove`; the only shared state is
//! the search state behind a mutex and the one-way abort latch.

pub mod options;
pub mod report;

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::board::{attack_tables, Position, STARTPOS_FEN};
use crate::search::{SearchLimits, SearchState, Searcher};

use options::{parse_bool, parse_setoption, EngineOptions};
use report::{format_bestmove, format_info};

const ENGINE_NAME: &str = "Vanguard";
const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
const ENGINE_AUTHOR: &str = "the Vanguard developers";

/// Run the UCI loop until `quit`
pub fn run() -> ExitCode {
    attack_tables::init();

    let mut engine = Engine::new();
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if !engine.handle_line(&line) {
            break;
        }
    }
    engine.stop_search();
    ExitCode::SUCCESS
}

struct Engine {
    options: EngineOptions,
    position: Position,
    state: Arc<Mutex<SearchState>>,
    stop: Arc<AtomicBool>,
    search_thread: Option<JoinHandle<()>>,
}

impl Engine {
    fn new() -> Self {
        let options = EngineOptions::default();
        Engine {
            position: Position::new(),
            state: Arc::new(Mutex::new(SearchState::new(options.hash_mb))),
            stop: Arc::new(AtomicBool::new(false)),
            search_thread: None,
            options,
        }
    }

    /// Dispatch one input line; returns false on `quit`
    fn handle_line(&mut self, line: &str) -> bool {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            return true;
        };

        match command {
            "uci" => {
                println!("id name {ENGINE_NAME} {ENGINE_VERSION}");
                println!("id author {ENGINE_AUTHOR}");
                self.options.print_all();
                println!("uciok");
            }
            "isready" => {
                // Option changes (including hash resizes) are applied
                // synchronously, so there is never pending work to wait on
                println!("readyok");
            }
            "ucinewgame" => {
                self.stop_search();
                self.state.lock().new_game(self.options.threads);
            }
            "setoption" => {
                self.stop_search();
                self.handle_setoption(&tokens[1..]);
            }
            "position" => {
                self.stop_search();
                self.handle_position(&tokens[1..]);
            }
            "go" => {
                self.stop_search();
                self.handle_go(&tokens[1..]);
            }
            "stop" => self.stop_search(),
            "quit" => return false,
            _ => {
                debug!("ignoring unknown command: {command}");
                println!("info string unknown command '{command}'");
            }
        }
        true
    }

    fn handle_setoption(&mut self, tokens: &[&str]) {
        let Some((name, value)) = parse_setoption(tokens) else {
            println!("info string malformed setoption");
            return;
        };
        let value = value.unwrap_or_default();

        match name.to_ascii_lowercase().as_str() {
            "hash" => {
                let megabytes = value
                    .parse::<usize>()
                    .unwrap_or(self.options.hash_mb)
                    .clamp(1, 65536);
                let mut state = self.state.lock();
                if state.tt.resize(megabytes).is_ok() {
                    self.options.hash_mb = megabytes;
                } else {
                    warn!("hash resize to {megabytes} MB failed, keeping previous size");
                    println!(
                        "info string hash allocation failed, keeping {} MB",
                        state.tt.size_megabytes()
                    );
                }
            }
            "threads" => {
                self.options.threads = value.parse::<usize>().unwrap_or(1).clamp(1, 256);
            }
            "uci_chess960" => self.options.chess960 = parse_bool(&value),
            "uci_showwdl" => self.options.show_wdl = parse_bool(&value),
            "moveoverhead" => {
                self.options.move_overhead_ms =
                    value.parse::<u64>().unwrap_or(10).clamp(0, 1000);
            }
            _ => {
                debug!("unknown option: {name}");
                println!("info string unknown option '{name}'");
            }
        }
    }

    /// `position [startpos | frc N | fen <6 fields>] [moves <uci>...]`;
    /// on any error the previous position is kept
    fn handle_position(&mut self, tokens: &[&str]) {
        match self.parse_position(tokens) {
            Ok(position) => self.position = position,
            Err(message) => {
                warn!("bad position command: {message}");
                println!("info string {message}");
            }
        }
    }

    fn parse_position(&self, tokens: &[&str]) -> Result<Position, String> {
        let mut index = 0;
        let mut position = match tokens.first() {
            Some(&"startpos") => {
                index += 1;
                Position::from_fen(STARTPOS_FEN, self.options.chess960)
                    .expect("startpos parses")
            }
            Some(&"frc") => {
                let number = tokens
                    .get(1)
                    .and_then(|t| t.parse::<usize>().ok())
                    .filter(|&n| n < 960)
                    .ok_or_else(|| "frc needs an index in 0..960".to_string())?;
                index += 2;
                Position::from_frc(number, number)
            }
            Some(&"fen") => {
                let fen_tokens: Vec<&str> = tokens[1..]
                    .iter()
                    .take_while(|&&t| t != "moves")
                    .copied()
                    .collect();
                index += 1 + fen_tokens.len();
                let fen = fen_tokens.join(" ");
                Position::from_fen(&fen, self.options.chess960)
                    .map_err(|e| format!("bad fen: {e}"))?
            }
            _ => return Err("position needs startpos, frc or fen".to_string()),
        };

        if tokens.get(index) == Some(&"moves") {
            for token in &tokens[index + 1..] {
                position
                    .push_uci(token, self.options.chess960)
                    .map_err(|e| format!("bad move: {e}"))?;
            }
        }
        Ok(position)
    }

    fn handle_go(&mut self, tokens: &[&str]) {
        fn next_number(iter: &mut std::slice::Iter<'_, &str>) -> Option<u64> {
            iter.next().and_then(|t| t.parse::<u64>().ok())
        }

        let mut limits = SearchLimits {
            overhead_ms: Some(self.options.move_overhead_ms),
            ..Default::default()
        };
        let mut iter = tokens.iter();
        while let Some(&token) = iter.next() {
            match token {
                "wtime" => limits.wtime = next_number(&mut iter),
                "btime" => limits.btime = next_number(&mut iter),
                "winc" => limits.winc = next_number(&mut iter),
                "binc" => limits.binc = next_number(&mut iter),
                "movestogo" => limits.movestogo = next_number(&mut iter),
                "movetime" => limits.movetime = next_number(&mut iter),
                "nodes" => limits.nodes = next_number(&mut iter),
                "depth" => {
                    limits.depth = iter.next().and_then(|t| t.parse::<i32>().ok());
                }
                "infinite" => limits.infinite = true,
                "perft" => {
                    let depth = next_number(&mut iter).unwrap_or(1) as usize;
                    self.run_perft(depth);
                    return;
                }
                _ => debug!("ignoring go token: {token}"),
            }
        }
        self.start_search(limits);
    }

    fn run_perft(&self, depth: usize) {
        let mut position = self.position.clone();
        let start = std::time::Instant::now();
        let nodes = if depth == 0 {
            1
        } else {
            position.perft_divide(depth)
        };
        let elapsed = start.elapsed().as_secs_f64().max(1e-6);
        println!("{nodes}");
        println!(
            "info string perft({depth}) in {:.2}s ({:.1} Mnps)",
            elapsed,
            nodes as f64 / elapsed / 1e6
        );
    }

    fn start_search(&mut self, limits: SearchLimits) {
        self.stop.store(false, Ordering::Relaxed);

        let position = self.position.clone();
        let state = Arc::clone(&self.state);
        let stop = Arc::clone(&self.stop);
        let chess960 = self.options.chess960;
        let show_wdl = self.options.show_wdl;

        self.search_thread = Some(std::thread::spawn(move || {
            let mut state = state.lock();
            let mut searcher = Searcher::new(position, &mut state, &stop, limits);
            let result = searcher.run(|report| {
                println!("{}", format_info(report, chess960, show_wdl));
            });
            println!("{}", format_bestmove(result.best_move, chess960));
        }));
    }

    /// Latch the abort flag and wait for the worker to finish
    fn stop_search(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.search_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position_startpos_moves() {
        let engine = Engine::new();
        let pos = engine
            .parse_position(&["startpos", "moves", "e2e4", "e7e5"])
            .unwrap();
        assert_eq!(pos.stack_height(), 2);
    }

    #[test]
    fn test_parse_position_fen() {
        let engine = Engine::new();
        let pos = engine
            .parse_position(&[
                "fen", "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R", "w", "KQkq",
                "-", "0", "1",
            ])
            .unwrap();
        assert_eq!(pos.board().occupancy_all().popcount(), 32);
    }

    #[test]
    fn test_parse_position_fen_with_moves() {
        let engine = Engine::new();
        let pos = engine
            .parse_position(&[
                "fen", "4k3/8/8/8/8/8/4P3/4K3", "w", "-", "-", "0", "1", "moves", "e2e4",
            ])
            .unwrap();
        assert_eq!(pos.stack_height(), 1);
    }

    #[test]
    fn test_parse_position_rejects_garbage() {
        let engine = Engine::new();
        assert!(engine.parse_position(&["fen", "garbage"]).is_err());
        assert!(engine
            .parse_position(&["startpos", "moves", "e2e5"])
            .is_err());
        assert!(engine.parse_position(&[]).is_err());
    }

    #[test]
    fn test_parse_position_frc() {
        let engine = Engine::new();
        let pos = engine.parse_position(&["frc", "518"]).unwrap();
        assert_eq!(
            pos.board().king_square(crate::board::Color::White),
            crate::board::Square::E1
        );
        assert!(engine.parse_position(&["frc", "960"]).is_err());
    }
}
