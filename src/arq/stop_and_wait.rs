//! Stop-and-Wait ARQ (spec §4.2.1). Window size 1: a segment must be
//! acknowledged before the next one is admitted.

use std::time::Instant;

use super::{ArqEngine, DataOutcome, InFlight, SendAdmission};
use crate::config::SOCKET_TIMEOUT;
use crate::packet::Packet;

#[derive(Debug)]
pub struct StopAndWait {
    // Sender side.
    next_seq: u32,
    outstanding: Option<InFlight>,
    drained: bool,

    // Receiver side.
    expected: u32,
}

impl StopAndWait {
    pub fn new() -> Self {
        StopAndWait {
            next_seq: 0,
            outstanding: None,
            drained: false,
            expected: 0,
        }
    }
}

impl Default for StopAndWait {
    fn default() -> Self {
        Self::new()
    }
}

impl ArqEngine for StopAndWait {
    fn offer_send(&mut self, chunk: Vec<u8>) -> (SendAdmission, Vec<Packet>) {
        if self.outstanding.is_some() {
            return (SendAdmission::WindowFull, Vec::new());
        }

        let packet = Packet::data(self.next_seq, chunk);
        self.outstanding = Some(InFlight {
            packet: packet.clone(),
            sent_at: Instant::now(),
        });
        (SendAdmission::Admitted, vec![packet])
    }

    fn on_ack(&mut self, packet: &Packet) {
        if let Some(in_flight) = &self.outstanding {
            if packet.ack_number == in_flight.packet.sequence_number + 1 {
                self.outstanding = None;
                self.next_seq = self.next_seq.wrapping_add(1);
            }
        }
    }

    fn on_data(&mut self, packet: &Packet) -> (DataOutcome, Vec<Packet>) {
        let seq = packet.sequence_number;

        if seq == self.expected {
            self.expected = self.expected.wrapping_add(1);
            let ack = Packet::ack(self.expected);
            (DataOutcome::Delivered(vec![packet.payload.clone()]), vec![ack])
        } else if seq < self.expected {
            // Duplicate of an already-acknowledged packet: the sender's
            // ACK must have been lost. Re-send it (spec §4.2.1).
            let ack = Packet::ack(self.expected);
            (DataOutcome::Duplicate, vec![ack])
        } else {
            // Out of order; the sender will retransmit on timeout.
            (DataOutcome::Dropped, Vec::new())
        }
    }

    fn tick(&mut self, now: Instant) -> Vec<Packet> {
        match &mut self.outstanding {
            Some(in_flight) if now.duration_since(in_flight.sent_at) >= SOCKET_TIMEOUT => {
                in_flight.sent_at = now;
                vec![in_flight.packet.clone()]
            }
            _ => Vec::new(),
        }
    }

    fn drain(&mut self) {
        self.drained = true;
    }

    fn fully_acked(&self) -> bool {
        self.drained && self.outstanding.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn window_is_one() {
        let mut sw = StopAndWait::new();
        let (adm, pkts) = sw.offer_send(vec![1, 2, 3]);
        assert_eq!(adm, SendAdmission::Admitted);
        assert_eq!(pkts.len(), 1);

        let (adm, pkts) = sw.offer_send(vec![4, 5, 6]);
        assert_eq!(adm, SendAdmission::WindowFull);
        assert!(pkts.is_empty());
    }

    #[test]
    fn ack_unblocks_next_send() {
        let mut sw = StopAndWait::new();
        let (_, pkts) = sw.offer_send(vec![1]);
        let seq = pkts[0].sequence_number;
        sw.on_ack(&Packet::ack(seq + 1));

        let (adm, pkts) = sw.offer_send(vec![2]);
        assert_eq!(adm, SendAdmission::Admitted);
        assert_eq!(pkts[0].sequence_number, seq + 1);
    }

    #[test]
    fn retransmit_after_timeout() {
        let mut sw = StopAndWait::new();
        sw.offer_send(vec![1]);

        let soon = Instant::now();
        assert!(sw.tick(soon).is_empty());

        let later = soon + SOCKET_TIMEOUT + Duration::from_millis(1);
        let retransmitted = sw.tick(later);
        assert_eq!(retransmitted.len(), 1);
        assert_eq!(retransmitted[0].sequence_number, 0);
    }

    #[test]
    fn receiver_delivers_in_order_and_dedupes() {
        let mut sw = StopAndWait::new();

        let (outcome, acks) = sw.on_data(&Packet::data(0, vec![1]));
        assert_eq!(outcome, DataOutcome::Delivered(vec![vec![1]]));
        assert_eq!(acks[0].ack_number, 1);

        // Duplicate of packet 0 (sender didn't see our ACK).
        let (outcome, acks) = sw.on_data(&Packet::data(0, vec![1]));
        assert_eq!(outcome, DataOutcome::Duplicate);
        assert_eq!(acks[0].ack_number, 1);

        // Out-of-order packet 2 before packet 1: dropped silently.
        let (outcome, acks) = sw.on_data(&Packet::data(2, vec![3]));
        assert_eq!(outcome, DataOutcome::Dropped);
        assert!(acks.is_empty());
    }

    #[test]
    fn fully_acked_requires_drain_and_empty_outstanding() {
        let mut sw = StopAndWait::new();
        sw.offer_send(vec![1]);
        assert!(!sw.fully_acked());

        sw.on_ack(&Packet::ack(1));
        assert!(!sw.fully_acked()); // not drained yet

        sw.drain();
        assert!(sw.fully_acked());
    }
}
