/*!
 * minidb Server Main Entry Point
 *
 * Parses the command line, initialises logging, loads the snapshot,
 * binds the listener and runs the event loop until a termination signal
 * arrives. The snapshot is rewritten before the process exits.
 */

use anyhow::*;
use clap::Parser;
use minidb::*;
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "minidb", version, about = "In-memory key-value store with snapshot persistence")]
struct Cli {
    /// TCP port to listen on
    port: u16,

    /// Snapshot file; must exist, rewritten on shutdown
    file: PathBuf,

    /// Interface to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Listen backlog
    #[arg(long, default_value_t = DEFAULT_BACKLOG)]
    backlog: i32,

    /// Longest accepted unterminated command line, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE)]
    max_line: usize,
}

fn main() -> Result<()> {
    // Status lines go through the log facade; RUST_LOG overrides the level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config {
        host: cli.host,
        port: cli.port,
        snapshot: cli.file,
        backlog: cli.backlog,
        max_line: cli.max_line,
    };

    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut server = Server::bind(&config)?;

    #[cfg(unix)]
    server.install_signal_handlers()?;

    server.run()
}
