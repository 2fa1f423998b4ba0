//! `upload` (spec §6): send a local file to the server under a given name.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::error;

use rdt_transfer::config::{DEFAULT_ADDR, DEFAULT_PORT};
use rdt_transfer::err::Error;
use rdt_transfer::handshake::Protocol as CoreProtocol;
use rdt_transfer::storage::FsFileSource;
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
#[command(name = "upload", about = "Upload a file to an RDT server")]
struct Args {
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,

    #[arg(short = 'H', long, default_value = DEFAULT_ADDR)]
    host: String,

    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Local file to upload.
    #[arg(short = 's', long)]
    source: PathBuf,

    /// Name the file is stored under on the server.
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

fn run(args: &Args) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|_| Error::ProtocolViolation("invalid host/port"))?;

    let mut source = FsFileSource::open(&args.source)?;
    client::upload(addr, &args.name, args.protocol.into(), &mut source)
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::new().filter_level(level_filter(&args)).init();

    match run(&args) {
        Ok(()) => ExitCode::from(0),
        Err(e @ Error::Io(_)) => {
            error!("cannot read source file: {e}");
            ExitCode::from(3)
        }
        Err(e) => {
            error!("upload failed: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
