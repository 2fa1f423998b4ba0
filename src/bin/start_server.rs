//! `start-server` (spec §6): bind the well-known listener port and run the
//! demultiplexer until killed.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use rdt_transfer::config::{DEFAULT_ADDR, DEFAULT_PORT, DEFAULT_STORAGE_DIR};
use rdt_transfer::demux::Demultiplexer;

#[derive(Parser, Debug)]
#[command(name = "start-server", about = "Serve file uploads and downloads over the RDT protocol")]
struct Args {
    /// Increase verbosity (debug-level logging).
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    verbose: bool,

    /// Decrease verbosity (errors only).
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,

    /// Listener address.
    #[arg(short = 'H', long, default_value = DEFAULT_ADDR)]
    host: String,

    /// Listener port.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory to read/write transferred files.
    #[arg(short = 's', long, default_value = DEFAULT_STORAGE_DIR)]
    storage: PathBuf,
}

fn level_filter(args: &Args) -> log::LevelFilter {
    if args.verbose {
        log::LevelFilter::Debug
    } else if args.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::new().filter_level(level_filter(&args)).init();

    if let Err(e) = std::fs::create_dir_all(&args.storage) {
        error!("cannot create storage directory {}: {e}", args.storage.display());
        return ExitCode::from(1);
    }

    let addr: SocketAddr = match format!("{}:{}", args.host, args.port).parse() {
        Ok(a) => a,
        Err(e) => {
            error!("invalid host/port: {e}");
            return ExitCode::from(2);
        }
    };

    let mut demux = match Demultiplexer::with_default_pool(addr, args.storage) {
        Ok(d) => d,
        Err(e) => {
            error!("bind failed: {e}");
            return ExitCode::from(1);
        }
    };

    match demux.run() {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!("server stopped: {e}");
            ExitCode::from(1)
        }
    }
}
