//! Engine state machine behind the UCI command loop.

use anyhow::Result;
use chess::ChessMove;
use serde_json::json;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use engine_core::history::History;
use engine_core::search::{think, LimitsType, SearchContext};
use engine_core::threads::ThreadPool;
use engine_core::tt::{TranspositionTable, TT_DEFAULT_MB};
use engine_core::Position;

use crate::options::Options;

const ENGINE_NAME: &str = "Ironclad";
const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
const ENGINE_AUTHOR: &str = "Ironclad developers";

/// Stack size for the search session thread; the stack frames of a deep
/// search plus the worker locals need room.
const SEARCH_STACK_SIZE: usize = 32 * 1024 * 1024;

pub struct UciEngine {
    pool: Arc<ThreadPool>,
    tt: Arc<TranspositionTable>,
    history: Arc<History>,
    options: Options,
    position: Position,
    search_thread: Option<thread::JoinHandle<()>>,
    /// Context of the running (or last) search; carries the stop signals.
    active: Option<Arc<SearchContext>>,
}

impl UciEngine {
    pub fn new() -> Self {
        UciEngine {
            pool: ThreadPool::new(),
            tt: Arc::new(TranspositionTable::new(TT_DEFAULT_MB)),
            history: Arc::new(History::new()),
            options: Options::default(),
            position: Position::startpos(),
            search_thread: None,
            active: None,
        }
    }

    /// Handle one line. Returns false when the engine should exit.
    pub fn process_command(&mut self, line: &str) -> Result<bool> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            return Ok(true);
        };

        match command {
            "uci" => self.cmd_uci(),
            "isready" => println!("readyok"),
            "setoption" => self.cmd_setoption(&tokens),
            "ucinewgame" => self.cmd_ucinewgame(),
            "position" => self.cmd_position(&tokens),
            "go" => self.cmd_go(&tokens),
            "stop" => self.cmd_stop(),
            "ponderhit" => self.cmd_ponderhit(),
            "quit" => {
                self.cmd_stop();
                return Ok(false);
            }
            _ => println!("Unknown command: {line}"),
        }

        Ok(true)
    }

    pub fn shutdown(&mut self) {
        self.cmd_stop();
        self.pool.shutdown();
    }

    fn cmd_uci(&self) {
        println!("id name {ENGINE_NAME} {ENGINE_VERSION}");
        println!("id author {ENGINE_AUTHOR}");
        println!();
        self.options.print_all();
        println!("uciok");
    }

    fn cmd_setoption(&mut self, tokens: &[&str]) {
        // Never reconfigure under a running search.
        self.wait_for_search();

        let mut name = String::new();
        let mut value = String::new();
        let mut target: Option<&mut String> = None;
        for &token in &tokens[1..] {
            match token {
                "name" => target = Some(&mut name),
                "value" => target = Some(&mut value),
                _ => {
                    if let Some(buf) = target.as_mut() {
                        if !buf.is_empty() {
                            buf.push(' ');
                        }
                        buf.push_str(token);
                    }
                }
            }
        }
        // Buttons carry an implicit value.
        if value.is_empty() {
            value.push_str("true");
        }

        match name.as_str() {
            "Hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    let mb = mb.clamp(4, 1024);
                    self.options.hash_mb = mb;
                    self.tt = Arc::new(TranspositionTable::new(mb));
                }
            }
            "Clear Hash" => self.tt.clear(),
            "Threads" => {
                if let Ok(n) = value.parse::<usize>() {
                    let n = n.clamp(1, engine_core::threads::MAX_THREADS);
                    self.options.threads = n;
                    self.pool.set_active_threads(n);
                }
            }
            _ => {
                if !self.options.set(&name, &value) {
                    println!("No such option: {name}");
                } else if name == "UCI_Chess960" && self.options.chess960 {
                    let payload = json!({
                        "type": "warning",
                        "message": "UCI_Chess960 accepted, standard castling rules apply",
                    });
                    println!("info string {payload}");
                }
            }
        }
    }

    fn cmd_ucinewgame(&mut self) {
        self.cmd_stop();
        self.history.clear();
        self.position = Position::startpos();
    }

    fn cmd_position(&mut self, tokens: &[&str]) {
        self.wait_for_search();

        let mut idx = 1;
        if idx >= tokens.len() {
            return;
        }

        if tokens[idx] == "startpos" {
            self.position = Position::startpos();
            idx += 1;
        } else if tokens[idx] == "fen" {
            idx += 1;
            let mut fen_parts = Vec::new();
            while idx < tokens.len() && tokens[idx] != "moves" {
                fen_parts.push(tokens[idx]);
                idx += 1;
            }
            match Position::from_fen(&fen_parts.join(" ")) {
                Ok(pos) => self.position = pos,
                Err(e) => {
                    log::warn!("rejected FEN: {e}");
                    println!("info string Error parsing fen");
                    return;
                }
            }
        }

        if idx < tokens.len() && tokens[idx] == "moves" {
            for &token in &tokens[idx + 1..] {
                match ChessMove::from_str(token) {
                    Ok(mv) if self.position.is_legal(mv) => self.position.do_move(mv),
                    _ => {
                        println!("info string Error parsing move: {token}");
                        break;
                    }
                }
            }
        }
    }

    fn cmd_go(&mut self, tokens: &[&str]) {
        self.cmd_stop();

        let limits = self.parse_go(&tokens[1..]);
        let mut config = self.options.search_config();
        config.threads = self.options.threads;

        self.pool.set_active_threads(config.threads);

        let info: engine_core::search::InfoSink = Arc::new(|line: &str| {
            println!("{line}");
            std::io::stdout().flush().ok();
        });

        let ctx = SearchContext::new(
            self.tt.clone(),
            self.history.clone(),
            config,
            limits,
            &self.position,
            info,
        );
        self.active = Some(ctx.clone());

        let pool = self.pool.clone();
        let mut pos = self.position.clone();

        let builder = thread::Builder::new()
            .name("search".into())
            .stack_size(SEARCH_STACK_SIZE);
        self.search_thread = Some(
            builder
                .spawn(move || {
                    let report = think(&pool, &ctx, &mut pos);

                    let best = report
                        .best_move
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "0000".to_string());
                    match report.ponder {
                        Some(ponder) => println!("bestmove {best} ponder {ponder}"),
                        None => println!("bestmove {best}"),
                    }
                    std::io::stdout().flush().ok();
                })
                .unwrap_or_else(|e| {
                    log::error!("failed to create search thread: {e}");
                    std::process::exit(1);
                }),
        );
    }

    fn parse_go(&self, tokens: &[&str]) -> LimitsType {
        let mut limits = LimitsType::default();
        let mut iter = tokens.iter().peekable();

        fn number<T: FromStr + Default>(iter: &mut std::iter::Peekable<std::slice::Iter<&str>>) -> T {
            iter.next()
                .and_then(|t| t.parse().ok())
                .unwrap_or_default()
        }

        while let Some(&token) = iter.next() {
            match token {
                "infinite" => limits.infinite = true,
                "ponder" => limits.ponder = true,
                "wtime" => limits.time[chess::Color::White as usize] = number(&mut iter),
                "btime" => limits.time[chess::Color::Black as usize] = number(&mut iter),
                "winc" => limits.inc[chess::Color::White as usize] = number(&mut iter),
                "binc" => limits.inc[chess::Color::Black as usize] = number(&mut iter),
                "movestogo" => limits.movestogo = number(&mut iter),
                "depth" => limits.depth = number(&mut iter),
                "nodes" => limits.nodes = number(&mut iter),
                "movetime" => limits.movetime = number(&mut iter),
                "searchmoves" => {
                    while let Some(&&candidate) = iter.peek() {
                        let Ok(mv) = ChessMove::from_str(candidate) else {
                            break;
                        };
                        if !self.position.is_legal(mv) {
                            log::warn!("ignoring illegal searchmove {candidate}");
                            iter.next();
                            continue;
                        }
                        limits.searchmoves.push(mv);
                        iter.next();
                    }
                }
                _ => {}
            }
        }

        limits
    }

    fn cmd_stop(&mut self) {
        if let Some(ctx) = &self.active {
            ctx.signals.ponder.store(false, std::sync::atomic::Ordering::SeqCst);
            ctx.signals.abort.store(true, std::sync::atomic::Ordering::SeqCst);
        }
        self.wait_for_search();
    }

    fn cmd_ponderhit(&mut self) {
        if let Some(ctx) = &self.active {
            if ctx
                .signals
                .stop_on_ponderhit
                .load(std::sync::atomic::Ordering::SeqCst)
            {
                ctx.signals.abort.store(true, std::sync::atomic::Ordering::SeqCst);
            }
            // Time accounting restarts from the hit.
            ctx.time.rebase();
            ctx.signals.ponder.store(false, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn wait_for_search(&mut self) {
        if let Some(handle) = self.search_thread.take() {
            if handle.join().is_err() {
                log::error!("search thread panicked");
            }
        }
        self.active = None;
    }
}
