//! Client-side connection establishment and transfer driving (spec §4.4,
//! §4.5). Used by both the `upload` and `download` binaries.

use std::net::{SocketAddr, UdpSocket};

use log::info;

use crate::arq::engine_for;
use crate::config::{MAX_PACKET, MAX_SYN_RETRIES, SOCKET_TIMEOUT};
use crate::err::{Error, Result};
use crate::handshake::{Operation, Protocol, SynAckPayload, SynPayload};
use crate::packet::{self, Packet};
use crate::session;
use crate::storage::{FileSink, FileSource};

/// Perform the client side of the handshake (spec §4.4): send SYN,
/// retransmit on timeout up to [`MAX_SYN_RETRIES`], and on SYN|ACK
/// migrate to the server's new ephemeral port.
///
/// Returns a socket connected to the session's dedicated port, plus
/// whatever the server's SYN|ACK conveyed.
fn connect(server_addr: SocketAddr, request: &SynPayload) -> Result<(UdpSocket, SynAckPayload)> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_read_timeout(Some(SOCKET_TIMEOUT))?;

    let syn = Packet::syn(0, request.encode());
    let syn_bytes = packet::encode(&syn);

    let mut buf = [0u8; MAX_PACKET];
    for attempt in 0..MAX_SYN_RETRIES {
        socket.send_to(&syn_bytes, server_addr)?;

        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let Ok(packet) = packet::decode(&buf[..n]) else {
            continue; // malformed: dropped silently (spec §4.1)
        };

        if packet.is_err() {
            return Err(Error::RequestRejected(packet.err_reason()));
        }

        if packet.is_syn() && packet.is_ack() {
            let synack = SynAckPayload::decode(request.operation, &packet.payload)?;

            // Migrate: all subsequent traffic targets the session's new
            // ephemeral port (spec §4.4). The final ACK is not
            // retransmitted — a lost one is self-healed by the server
            // re-sending SYN|ACK (spec §9 Open Question (a)).
            socket.send_to(&packet::encode(&Packet::ack(0)), from)?;
            socket.connect(from)?;

            info!("connected to {from} after {} attempt(s)", attempt + 1);
            return Ok((socket, synack));
        }
        // stray packet on the listener port: ignore, retry on next SYN
    }

    Err(Error::HandshakeFailed)
}

/// Upload `source` to the server under `filename` (spec §4.5, upload is
/// client-as-sender).
pub fn upload(
    server_addr: SocketAddr,
    filename: &str,
    protocol: Protocol,
    source: &mut dyn FileSource,
) -> Result<()> {
    let request = SynPayload {
        operation: Operation::Upload,
        protocol,
        filename: filename.to_string(),
    };
    let (socket, _ack) = connect(server_addr, &request)?;

    let mut engine = engine_for(protocol);
    let tag = format!("upload[{filename}]");
    session::run_sender(&socket, engine.as_mut(), source, &tag)
}

/// Download `filename` from the server into `sink` (spec §4.5, download
/// is client-as-receiver). Returns the file size the server advertised in
/// its SYN|ACK, which callers may use for progress reporting only — not
/// for correctness (spec §4.5: "correctness does not depend on it").
pub fn download(
    server_addr: SocketAddr,
    filename: &str,
    protocol: Protocol,
    sink: Box<dyn FileSink>,
) -> Result<u64> {
    let request = SynPayload {
        operation: Operation::Download,
        protocol,
        filename: filename.to_string(),
    };
    let (socket, ack) = connect(server_addr, &request)?;

    let file_size = match ack {
        SynAckPayload::DownloadAck { file_size } => file_size,
        SynAckPayload::UploadAck => {
            return Err(Error::ProtocolViolation("server acked as upload for a download request"))
        }
    };

    let mut engine = engine_for(protocol);
    let tag = format!("download[{filename}]");
    session::run_receiver(&socket, engine.as_mut(), sink, &tag, None)?;
    Ok(file_size)
}
