//! UCI protocol front-end for the Ironclad engine.

mod engine;
mod options;

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead};

use engine::UciEngine;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logging goes to stderr: stdout carries only protocol output.
    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Ironclad starting");

    let mut engine = UciEngine::new();
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        // EOF or a broken pipe is treated as a quit request.
        let Ok(line) = line else { break };
        if !engine.process_command(line.trim())? {
            break;
        }
    }

    engine.shutdown();
    Ok(())
}
