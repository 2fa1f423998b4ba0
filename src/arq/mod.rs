//! ARQ Engine — common contract (spec §4.2).
//!
//! Both [`stop_and_wait::StopAndWait`] and
//! [`selective_repeat::SelectiveRepeat`] implement [`ArqEngine`], the
//! "tagged variant or interface" §9 Design Notes calls for. An engine is a
//! pure state machine: it never touches a socket or the filesystem. Every
//! method that can cause outbound traffic returns the packets the caller
//! (the [`crate::session`] driving loop) must actually send —
//! mirroring the teacher's `TCB::on_segment` returning an `Action` for its
//! caller to execute rather than performing I/O itself.

pub mod selective_repeat;
pub mod stop_and_wait;

use std::time::Instant;

use crate::packet::Packet;

pub use selective_repeat::SelectiveRepeat;
pub use stop_and_wait::StopAndWait;

/// Result of [`ArqEngine::offer_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAdmission {
    /// The chunk was admitted; the caller should transmit the packets
    /// returned alongside this value.
    Admitted,
    /// The window is full. The caller must suspend (condvar wait) and
    /// retry the same chunk later.
    WindowFull,
}

/// Result of [`ArqEngine::on_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOutcome {
    /// One or more chunks are now deliverable, in order.
    Delivered(Vec<Vec<u8>>),
    /// Segment stored out of order; nothing deliverable yet (SR only).
    Buffered,
    /// Already-delivered segment seen again; an ACK was re-sent to
    /// recover a lost prior ACK.
    Duplicate,
    /// Segment outside the receive window; dropped silently.
    Dropped,
}

/// The capability set [`crate::session`] drives both ARQ strategies
/// through (spec §4.2).
pub trait ArqEngine: std::fmt::Debug + Send {
    /// Admit `chunk` into the send pipeline. Returns the admission
    /// decision plus any packets to transmit immediately (empty when
    /// [`SendAdmission::WindowFull`]).
    fn offer_send(&mut self, chunk: Vec<u8>) -> (SendAdmission, Vec<Packet>);

    /// Consume an incoming ACK, advancing the send window and canceling
    /// the relevant retransmit timer(s).
    fn on_ack(&mut self, packet: &Packet);

    /// Consume an incoming DATA packet. Returns what became deliverable
    /// plus any ACK packet(s) to send back.
    fn on_data(&mut self, packet: &Packet) -> (DataOutcome, Vec<Packet>);

    /// Fire any timers expired as of `now`; returns packets to
    /// retransmit.
    fn tick(&mut self, now: Instant) -> Vec<Packet>;

    /// Signal that no more local sends are coming. The engine remains
    /// live until [`ArqEngine::fully_acked`] is true.
    fn drain(&mut self);

    /// True once `drain` has been called and every outstanding segment
    /// has been acknowledged (spec §4.3: only then may the sender move
    /// to `FIN_SENT`).
    fn fully_acked(&self) -> bool;
}

/// One segment awaiting acknowledgment, shared by both engines'
/// retransmission bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub packet: Packet,
    pub sent_at: Instant,
}

/// Construct the engine negotiated during the handshake (spec §9:
/// "Model as a tagged variant or an interface").
pub fn engine_for(protocol: crate::handshake::Protocol) -> Box<dyn ArqEngine> {
    match protocol {
        crate::handshake::Protocol::StopAndWait => Box::new(StopAndWait::new()),
        crate::handshake::Protocol::SelectiveRepeat => Box::new(SelectiveRepeat::new()),
    }
}
