//! `download` (spec §6): fetch a file from the server into a local path.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{error, info};

use rdt_transfer::config::{DEFAULT_ADDR, DEFAULT_PORT};
use rdt_transfer::err::Error;
use rdt_transfer::handshake::Protocol as CoreProtocol;
use rdt_transfer::storage::FsFileSink;
use rdt_transfer::{client, Result};

#[derive(ValueEnum, Clone, Copy, Debug)]
#[value(rename_all = "snake_case")]
enum Protocol {
    StopAndWait,
    SelectiveRepeat,
}

impl From<Protocol> for CoreProtocol {
    fn from(p: Protocol) -> Self {
        match p {
            Protocol::StopAndWait => CoreProtocol::StopAndWait,
            Protocol::SelectiveRepeat => CoreProtocol::SelectiveRepeat,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "download", about = "Download a file from an RDT server")]
struct Args {
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,

    #[arg(short = 'H', long, default_value = DEFAULT_ADDR)]
    host: String,

    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory the file is written into; defaults to the current directory.
    #[arg(short = 'd', long, default_value = ".")]
    dest: PathBuf,

    /// Name of the file to request from the server.
    #[arg(short = 'n', long)]
    name: String,

    /// ARQ strategy to negotiate.
    #[arg(short = 'r', long, value_enum)]
    protocol: Protocol,
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

fn run(args: &Args) -> Result<u64> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|_| Error::ProtocolViolation("invalid host/port"))?;

    let sink = Box::new(FsFileSink::create(&args.dest, &args.name)?);
    client::download(addr, &args.name, args.protocol.into(), sink)
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::new().filter_level(level_filter(&args)).init();

    match run(&args) {
        Ok(size) => {
            info!("downloaded {} ({size} bytes advertised)", args.name);
            ExitCode::from(0)
        }
        Err(Error::RequestRejected(reason)) if reason == "no such file" => {
            error!("server has no file named {}", args.name);
            ExitCode::from(5)
        }
        Err(e @ Error::Io(_)) => {
            error!("cannot write destination: {e}");
            ExitCode::from(3)
        }
        Err(e) => {
            error!("download failed: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
