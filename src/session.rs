//! Session Endpoint (spec §4.3): the per-transfer driving loop that sits
//! on top of an already-established, already-migrated
//! [`std::net::UdpSocket`] and drives one [`ArqEngine`] plus one
//! [`FileSource`]/[`FileSink`] to completion.
//!
//! Mirrors the teacher's split between a pure state machine (`TCB`) and
//! the thread that owns the socket and does the actual I/O
//! (`segment_loop`): the engines in [`crate::arq`] never touch a socket,
//! this module is where packets are actually sent and received.

use std::net::UdpSocket;
use std::time::Instant;

use log::{debug, info, trace, warn};

use crate::arq::{ArqEngine, DataOutcome, SendAdmission};
use crate::config::{MAX_IDLE, MAX_PAYLOAD, MAX_PACKET, SOCKET_TIMEOUT};
use crate::err::{Error, Result};
use crate::packet::{self, Packet};
use crate::storage::{FileSink, FileSource};

fn recv_packet(socket: &UdpSocket) -> std::io::Result<Option<Packet>> {
    let mut buf = [0u8; MAX_PACKET];
    match socket.recv(&mut buf) {
        Ok(n) => Ok(packet::decode(&buf[..n]).ok()),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn send_all(socket: &UdpSocket, packets: &[Packet]) -> std::io::Result<()> {
    for p in packets {
        socket.send(&packet::encode(p))?;
    }
    Ok(())
}

/// Drive the sender side of a transfer: read the file in
/// [`MAX_PAYLOAD`]-sized chunks, offer each to `engine`, retransmit on
/// timer expiry, and close out with a FIN once every segment is
/// acknowledged (spec §4.5 upload-sender / download-sender).
pub fn run_sender(
    socket: &UdpSocket,
    engine: &mut dyn ArqEngine,
    source: &mut dyn FileSource,
    tag: &str,
) -> Result<()> {
    socket.set_read_timeout(Some(SOCKET_TIMEOUT))?;

    let mut offset: u64 = 0;
    let mut pending: Option<Vec<u8>> = None;
    let mut eof = false;
    let mut last_activity = Instant::now();

    loop {
        if !eof {
            if pending.is_none() {
                let chunk = source.read_at(offset, MAX_PAYLOAD)?;
                if chunk.is_empty() {
                    eof = true;
                    engine.drain();
                    trace!("{tag}: source exhausted, draining ARQ engine");
                } else {
                    offset += chunk.len() as u64;
                    pending = Some(chunk);
                }
            }

            if let Some(chunk) = pending.take() {
                let (admission, outbound) = engine.offer_send(chunk.clone());
                match admission {
                    SendAdmission::Admitted => send_all(socket, &outbound)?,
                    SendAdmission::WindowFull => pending = Some(chunk),
                }
            }
        }

        if eof && engine.fully_acked() {
            break;
        }

        match recv_packet(socket)? {
            Some(packet) => {
                last_activity = Instant::now();
                if packet.is_err() {
                    return Err(Error::Peer(packet.err_reason()));
                }
                if packet.is_ack() {
                    engine.on_ack(&packet);
                }
            }
            None => {
                if last_activity.elapsed() > MAX_IDLE {
                    return Err(Error::PeerGone(socket.peer_addr()?));
                }
                let retransmits = engine.tick(Instant::now());
                if !retransmits.is_empty() {
                    debug!("{tag}: retransmitting {} segment(s)", retransmits.len());
                    send_all(socket, &retransmits)?;
                }
            }
        }
    }

    close_as_sender(socket, tag)
}

/// Drive the receiver side of a transfer: deliver in-order chunks to
/// `sink`, ACK every DATA segment, and finalize on the peer's FIN (spec
/// §4.5 upload-receiver / download-receiver).
///
/// `primed`, when given, is a packet the caller already pulled off the
/// socket before this loop started (the server side's handshake accepts
/// the client's first DATA packet as an implicit final ACK — spec §4.4 —
/// so that packet must still be processed, not discarded).
pub fn run_receiver(
    socket: &UdpSocket,
    engine: &mut dyn ArqEngine,
    mut sink: Box<dyn FileSink>,
    tag: &str,
    primed: Option<Packet>,
) -> Result<()> {
    socket.set_read_timeout(Some(SOCKET_TIMEOUT))?;
    let mut last_activity = Instant::now();

    let mut pending_first = primed;

    loop {
        let next = match pending_first.take() {
            Some(p) => Some(p),
            None => recv_packet(socket)?,
        };

        match next {
            Some(packet) => {
                last_activity = Instant::now();

                if packet.is_err() {
                    sink.abort()?;
                    return Err(Error::Peer(packet.err_reason()));
                }

                if packet.is_fin() {
                    info!("{tag}: peer done sending, finalizing");
                    break;
                }

                if packet.is_data() {
                    let (outcome, acks) = engine.on_data(&packet);
                    if let DataOutcome::Delivered(chunks) = outcome {
                        for chunk in chunks {
                            sink.append(&chunk)?;
                        }
                    }
                    send_all(socket, &acks)?;
                }
            }
            None => {
                if last_activity.elapsed() > MAX_IDLE {
                    sink.abort()?;
                    return Err(Error::PeerGone(socket.peer_addr()?));
                }
                // No sender-side timers to fire on the receiving half;
                // the wait here exists purely to re-check the idle
                // deadline (spec §5 suspension point (a)).
            }
        }
    }

    close_as_receiver(socket, sink, tag)
}

/// Sender-side teardown: FIN, retransmitted on timeout like any other
/// segment, until FIN|ACK arrives (spec §4.3).
fn close_as_sender(socket: &UdpSocket, tag: &str) -> Result<()> {
    use crate::config::MAX_SYN_RETRIES;

    for attempt in 0..MAX_SYN_RETRIES {
        socket.send(&packet::encode(&Packet::fin()))?;

        match recv_packet(socket)? {
            Some(packet) if packet.is_fin() && packet.is_ack() => {
                info!("{tag}: teardown complete");
                return Ok(());
            }
            _ => {
                trace!("{tag}: FIN attempt {attempt} unanswered, retrying");
            }
        }
    }

    Err(Error::PeerGone(socket.peer_addr()?))
}

/// Receiver-side teardown: finalize the file, reply FIN|ACK, then linger
/// briefly to re-answer a retransmitted FIN in case our FIN|ACK was lost
/// (spec §4.3's half-close — the sender's FIN retransmission is what
/// recovers a lost FIN|ACK, mirroring how a lost handshake final-ACK is
/// recovered by the server's SYN|ACK retransmission, spec §4.4).
fn close_as_receiver(socket: &UdpSocket, sink: Box<dyn FileSink>, tag: &str) -> Result<()> {
    sink.finalize()?;
    socket.send(&packet::encode(&Packet::fin_ack()))?;

    match recv_packet(socket)? {
        Some(packet) if packet.is_fin() => {
            warn!("{tag}: peer retransmitted FIN, re-sending FIN|ACK");
            socket.send(&packet::encode(&Packet::fin_ack()))?;
        }
        _ => {}
    }

    info!("{tag}: teardown complete");
    Ok(())
}
