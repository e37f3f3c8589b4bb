//! End-to-end UCI protocol tests against the compiled binary.

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command as AssertCommand;
use predicates::str::contains;

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A running engine with a background reader collecting stdout lines.
struct Engine {
    child: Child,
    stdin: ChildStdin,
    lines: Arc<Mutex<Vec<String>>>,
}

impl Engine {
    fn spawn() -> Engine {
        let mut child = Command::new(cargo_bin("ironclad"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("engine starts");

        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                sink.lock().unwrap().push(line);
            }
        });

        Engine { child, stdin, lines }
    }

    fn send(&mut self, command: &str) {
        writeln!(self.stdin, "{command}").expect("engine accepts input");
        self.stdin.flush().unwrap();
    }

    /// Wait until some line satisfies `pred`, within `timeout`.
    fn wait_for<F: Fn(&str) -> bool>(&self, pred: F, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.lines.lock().unwrap().iter().any(|l| pred(l)) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn quit(mut self) {
        let _ = writeln!(self.stdin, "quit");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

const LONG: Duration = Duration::from_secs(60);

#[test]
fn handshake_lists_options() {
    AssertCommand::new(cargo_bin("ironclad"))
        .write_stdin("uci\nquit\n")
        .assert()
        .success()
        .stdout(contains("id name Ironclad"))
        .stdout(contains("option name Hash type spin"))
        .stdout(contains("option name MultiPV type spin default 1 min 1 max 500"))
        .stdout(contains("option name Minimum Split Depth type spin default 4 min 4 max 7"))
        .stdout(contains("uciok"));
}

#[test]
fn isready_answers_readyok() {
    AssertCommand::new(cargo_bin("ironclad"))
        .write_stdin("isready\nquit\n")
        .assert()
        .success()
        .stdout(contains("readyok"));
}

#[test]
fn unknown_command_and_option_are_diagnosed() {
    AssertCommand::new(cargo_bin("ironclad"))
        .write_stdin("flibbertigibbet\nsetoption name Bogus value 1\nquit\n")
        .assert()
        .success()
        .stdout(contains("Unknown command: flibbertigibbet"))
        .stdout(contains("No such option: Bogus"));
}

#[test]
fn finds_mate_in_one_over_uci() {
    let mut engine = Engine::spawn();
    engine.send("uci");
    engine.send("isready");
    engine.send("position fen 4k3/8/4K3/8/8/8/8/4Q3 w - - 0 1");
    engine.send("go depth 2");

    assert!(engine.wait_for(|l| l.starts_with("bestmove"), LONG));
    let lines = engine.snapshot();
    assert!(
        lines.iter().any(|l| l.contains("score mate 1")),
        "no mate score reported: {lines:?}"
    );

    let best = lines
        .iter()
        .rev()
        .find(|l| l.starts_with("bestmove"))
        .and_then(|l| l.split_whitespace().nth(1))
        .map(str::to_string)
        .unwrap();
    use std::str::FromStr;
    let board = chess::Board::from_str("4k3/8/4K3/8/8/8/8/4Q3 w - - 0 1").unwrap();
    let mv: chess::ChessMove = best.parse().expect("bestmove parses");
    assert_eq!(
        board.make_move_new(mv).status(),
        chess::BoardStatus::Checkmate,
        "bestmove {best} is not mate"
    );

    engine.quit();
}

#[test]
fn stalemate_answers_null_move() {
    let mut engine = Engine::spawn();
    engine.send("position fen 7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
    engine.send("go depth 2");
    assert!(engine.wait_for(|l| l == "bestmove 0000", LONG));
    engine.quit();
}

#[test]
fn threefold_repetition_scores_zero_over_uci() {
    let mut engine = Engine::spawn();
    engine.send(
        "position startpos moves d2d4 d7d5 b1c3 b8c6 c3b1 c6b8 b1c3 b8c6 c3b1 c6b8",
    );
    engine.send("go depth 10");
    assert!(engine.wait_for(|l| l.starts_with("bestmove"), LONG));
    let lines = engine.snapshot();
    assert!(
        lines.iter().any(|l| l.contains("score cp 0")),
        "draw score missing: {lines:?}"
    );
    engine.quit();
}

#[test]
fn movetime_is_honored() {
    let mut engine = Engine::spawn();
    engine.send("position startpos");

    let start = Instant::now();
    engine.send("go movetime 500");
    assert!(engine.wait_for(|l| l.starts_with("bestmove"), Duration::from_secs(10)));
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(400), "stopped early: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(1500), "stopped late: {elapsed:?}");
    engine.quit();
}

#[test]
fn ponder_holds_bestmove_until_stop() {
    let mut engine = Engine::spawn();
    engine.send("position startpos");
    engine.send("go ponder wtime 1000 btime 1000");

    std::thread::sleep(Duration::from_millis(400));
    assert!(
        !engine.snapshot().iter().any(|l| l.starts_with("bestmove")),
        "bestmove leaked while pondering"
    );

    engine.send("stop");
    assert!(engine.wait_for(|l| l.starts_with("bestmove"), LONG));
    engine.quit();
}

#[test]
fn ponderhit_converts_to_normal_search() {
    let mut engine = Engine::spawn();
    engine.send("position startpos");
    engine.send("go ponder movetime 300");

    std::thread::sleep(Duration::from_millis(200));
    assert!(!engine.snapshot().iter().any(|l| l.starts_with("bestmove")));

    engine.send("ponderhit");
    assert!(engine.wait_for(|l| l.starts_with("bestmove"), Duration::from_secs(10)));
    engine.quit();
}

#[test]
fn multipv_emits_ranked_lines() {
    let mut engine = Engine::spawn();
    engine.send("setoption name MultiPV value 3");
    engine.send("position startpos");
    engine.send("go depth 6");
    assert!(engine.wait_for(|l| l.starts_with("bestmove"), LONG));

    let lines = engine.snapshot();
    let score_of = |needle: &str| -> Option<i32> {
        lines
            .iter()
            .rev()
            .find(|l| l.contains(needle) && l.contains("score cp "))
            .and_then(|l| {
                let rest = l.split("score cp ").nth(1)?;
                rest.split_whitespace().next()?.parse().ok()
            })
    };

    for k in 1..=3 {
        assert!(
            lines.iter().any(|l| l.contains(&format!("multipv {k} "))),
            "missing multipv {k} line: {lines:?}"
        );
    }

    if let (Some(s1), Some(s2), Some(s3)) = (
        score_of("multipv 1 "),
        score_of("multipv 2 "),
        score_of("multipv 3 "),
    ) {
        assert!(s1 >= s2 && s2 >= s3, "multipv scores unsorted: {s1} {s2} {s3}");
    }

    engine.quit();
}

#[test]
fn threads_option_is_accepted_and_search_completes() {
    let mut engine = Engine::spawn();
    engine.send("setoption name Threads value 2");
    engine.send("setoption name Minimum Split Depth value 4");
    engine.send("position startpos");
    engine.send("go depth 6");
    assert!(engine.wait_for(|l| l.starts_with("bestmove"), LONG));
    engine.quit();
}
