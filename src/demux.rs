//! Server-side Demultiplexer and Worker Pool (spec §4.6).
//!
//! A single [`UdpSocket`] listens on the well-known port. Every datagram
//! from a not-yet-known [`SocketAddr`] is a candidate SYN; everything else
//! is routed to whichever worker thread owns that address. Each accepted
//! client gets its own ephemeral-port socket and a dedicated OS thread —
//! mirroring the teacher's one-`TcpStream`-per-accepted-connection model,
//! just without the shared `Manager`/condvar plumbing, since here each
//! worker owns its socket outright instead of sharing the tun device.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use log::{debug, info, warn};

use crate::arq::engine_for;
use crate::config::{
    DEFAULT_POOL_SIZE, DEMUX_POLL_INTERVAL, MAX_PACKET, MAX_SYN_RETRIES, SOCKET_TIMEOUT,
};
use crate::err::Result;
use crate::handshake::{Operation, SynAckPayload, SynPayload};
use crate::packet::{self, Packet};
use crate::session;
use crate::storage::{is_safe_filename, FsFileSink, FsFileSource};

/// A client address known to have an active worker, plus the channel used
/// to learn when that worker is done.
struct WorkerHandle {
    done_rx: mpsc::Receiver<()>,
}

/// The bounded worker pool fronting the well-known listener port (spec
/// §4.6): at most `pool_size` sessions run concurrently; a SYN arriving
/// while the pool is saturated is rejected with `ERR("server busy")`
/// rather than queued.
pub struct Demultiplexer {
    listener: UdpSocket,
    storage_dir: PathBuf,
    pool_size: usize,
    workers: HashMap<SocketAddr, WorkerHandle>,
}

impl Demultiplexer {
    pub fn bind(addr: SocketAddr, storage_dir: PathBuf, pool_size: usize) -> Result<Self> {
        let listener = UdpSocket::bind(addr)?;
        listener.set_read_timeout(Some(DEMUX_POLL_INTERVAL))?;
        info!(
            "listening on {addr}, storage={}, pool_size={pool_size}",
            storage_dir.display()
        );
        Ok(Demultiplexer {
            listener,
            storage_dir,
            pool_size,
            workers: HashMap::new(),
        })
    }

    pub fn with_default_pool(addr: SocketAddr, storage_dir: PathBuf) -> Result<Self> {
        Self::bind(addr, storage_dir, DEFAULT_POOL_SIZE)
    }

    /// The address actually bound, useful when `addr`'s port was 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run forever, accepting new sessions and reaping finished ones (spec
    /// §4.6). Only returns on a local I/O error from the listener socket
    /// itself.
    pub fn run(&mut self) -> Result<()> {
        let mut buf = [0u8; MAX_PACKET];

        loop {
            self.reap_finished();

            let (n, from) = match self.listener.recv_from(&mut buf) {
                Ok(v) => v,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if self.workers.contains_key(&from) {
                // A retransmitted SYN for a session already being
                // established, or a stray late packet: the worker owns
                // its own dedicated port by the time it exists, so
                // nothing arriving here on the listener port needs
                // forwarding. Drop it (spec §4.6).
                continue;
            }

            let Ok(packet) = packet::decode(&buf[..n]) else {
                continue; // malformed: dropped silently (spec §4.1)
            };

            if !packet.is_syn() {
                continue; // stray non-SYN from an unknown address
            }

            self.handle_syn(&packet, from);
        }
    }

    fn reap_finished(&mut self) {
        self.workers.retain(|addr, handle| match handle.done_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => {
                debug!("reaping worker for {addr}");
                false
            }
            Err(mpsc::TryRecvError::Empty) => true,
        });
    }

    fn handle_syn(&mut self, packet: &Packet, from: SocketAddr) {
        let request = match SynPayload::decode(&packet.payload) {
            Ok(r) => r,
            Err(_) => return, // malformed SYN payload: dropped silently
        };

        if !is_safe_filename(&request.filename) {
            self.reject(from, "invalid filename");
            return;
        }

        if request.operation == Operation::Download
            && !self.storage_dir.join(&request.filename).is_file()
        {
            self.reject(from, "no such file");
            return;
        }

        if self.workers.len() >= self.pool_size {
            warn!("pool saturated ({}/{}), rejecting {from}", self.workers.len(), self.pool_size);
            self.reject(from, "server busy");
            return;
        }

        let storage_dir = self.storage_dir.clone();
        let (done_tx, done_rx) = mpsc::channel();

        thread::spawn(move || {
            if let Err(e) = worker_main(from, request, storage_dir) {
                warn!("session with {from} ended with error: {e}");
            }
            let _ = done_tx.send(());
        });

        self.workers.insert(from, WorkerHandle { done_rx });
    }

    fn reject(&self, to: SocketAddr, reason: &str) {
        let _ = self.listener.send_to(&packet::encode(&Packet::err(reason)), to);
    }
}

/// Per-session worker thread body: bind a dedicated ephemeral-port socket,
/// complete the server side of the handshake, then dispatch to
/// [`session::run_sender`] (client downloads) or [`session::run_receiver`]
/// (client uploads) (spec §4.4, §4.6).
fn worker_main(client: SocketAddr, request: SynPayload, storage_dir: PathBuf) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    let tag = format!("session[{client} {}]", request.filename);
    info!("{tag}: accepted, operation={:?} protocol={:?}", request.operation, request.protocol);

    match request.operation {
        Operation::Upload => {
            let sink = Box::new(FsFileSink::create(&storage_dir, &request.filename)?);
            let ack = SynAckPayload::UploadAck;
            let primed = run_server_handshake(&socket, client, &ack)?;

            socket.connect(client)?;
            let mut engine = engine_for(request.protocol);
            session::run_receiver(&socket, engine.as_mut(), sink, &tag, primed)
        }
        Operation::Download => {
            let mut source = FsFileSource::open(storage_dir.join(&request.filename))?;
            let ack = SynAckPayload::DownloadAck {
                file_size: source.size(),
            };
            let _primed = run_server_handshake(&socket, client, &ack)?;

            socket.connect(client)?;
            let mut engine = engine_for(request.protocol);
            session::run_sender(&socket, engine.as_mut(), &mut source, &tag)
        }
    }
}

/// Send SYN|ACK from the session's new ephemeral port, retransmitting
/// until the client migrates and replies (spec §4.4). A plain final ACK
/// and the client's first DATA packet both confirm `ESTABLISHED`; in the
/// latter case that DATA packet is returned so the caller can still feed
/// it through the ARQ engine instead of discarding it (spec §9 Open
/// Question (a)).
fn run_server_handshake(
    socket: &UdpSocket,
    client: SocketAddr,
    ack: &SynAckPayload,
) -> Result<Option<Packet>> {
    socket.set_read_timeout(Some(SOCKET_TIMEOUT))?;

    let synack = Packet::syn_ack(0, 0, ack.encode());
    let synack_bytes = packet::encode(&synack);

    let mut buf = [0u8; MAX_PACKET];
    for attempt in 0..MAX_SYN_RETRIES {
        socket.send_to(&synack_bytes, client)?;

        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if from != client {
            continue; // only the migrating client matters on this port
        }

        let Ok(packet) = packet::decode(&buf[..n]) else {
            continue;
        };

        if packet.is_ack() && !packet.is_data() {
            debug!("handshake with {client} complete after {} attempt(s)", attempt + 1);
            return Ok(None);
        }

        if packet.is_data() {
            debug!(
                "handshake with {client} completed implicitly by first DATA (attempt {})",
                attempt + 1
            );
            return Ok(Some(packet));
        }
    }

    Err(crate::err::Error::HandshakeFailed)
}

