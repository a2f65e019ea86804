mod args;
mod commands;
mod shell;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use memsift_core::Environment;
use tracing_subscriber::EnvFilter;

use shell::Shell;

/// Offline forensic analyzer for process-memory snapshots.
#[derive(Debug, Parser)]
#[command(name = "memsift", version)]
struct Args {
    /// Snapshot to analyze: a directory of mem.<start>.<end>.bin region
    /// files, or a single concatenated region file.
    snapshot: PathBuf,

    /// Worker threads for memory sweeps (default: all hardware threads).
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Run one shell command and exit instead of starting the prompt.
    #[arg(long)]
    command: Option<String>,

    /// Skip the automatic base-type/type-map bootstrap scans.
    #[arg(long)]
    no_prepare: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("memsift=info,memsift_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut env = Environment::open(&args.snapshot)?;
    if !args.no_prepare {
        if let Err(e) = env.prepare(args.threads, true) {
            eprintln!("Analysis bootstrap incomplete: {:#}", e);
        }
    }

    let mut shell = Shell::new(env, args.threads);
    match args.command {
        Some(command) => shell.run_command(&command),
        None => shell.run(),
    }
}
