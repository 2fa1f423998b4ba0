//! Selective Repeat ARQ (spec §4.2.2). Window size N with one independent
//! retransmit timer per in-flight segment; receiver buffers out-of-order
//! segments but only ever delivers the in-order prefix.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use super::{ArqEngine, DataOutcome, InFlight, SendAdmission};
use crate::config::{SOCKET_TIMEOUT, SR_WINDOW};
use crate::packet::Packet;

#[derive(Debug)]
pub struct SelectiveRepeat {
    window: u32,

    // Sender side.
    base: u32,
    next_seq: u32,
    in_flight: BTreeMap<u32, InFlight>,
    acked: HashSet<u32>,
    drained: bool,

    // Receiver side.
    expected: u32,
    recv_buffer: HashMap<u32, Vec<u8>>,
}

impl SelectiveRepeat {
    pub fn new() -> Self {
        Self::with_window(SR_WINDOW)
    }

    pub fn with_window(window: u32) -> Self {
        SelectiveRepeat {
            window,
            base: 0,
            next_seq: 0,
            in_flight: BTreeMap::new(),
            acked: HashSet::new(),
            drained: false,
            expected: 0,
            recv_buffer: HashMap::new(),
        }
    }

    fn slide_base(&mut self) {
        while self.acked.remove(&self.base) {
            self.base = self.base.wrapping_add(1);
        }
    }
}

impl Default for SelectiveRepeat {
    fn default() -> Self {
        Self::new()
    }
}

impl ArqEngine for SelectiveRepeat {
    fn offer_send(&mut self, chunk: Vec<u8>) -> (SendAdmission, Vec<Packet>) {
        if self.next_seq.wrapping_sub(self.base) >= self.window {
            return (SendAdmission::WindowFull, Vec::new());
        }

        let packet = Packet::data(self.next_seq, chunk);
        self.in_flight.insert(
            self.next_seq,
            InFlight {
                packet: packet.clone(),
                sent_at: Instant::now(),
            },
        );
        self.next_seq = self.next_seq.wrapping_add(1);
        (SendAdmission::Admitted, vec![packet])
    }

    fn on_ack(&mut self, packet: &Packet) {
        let k = packet.ack_number;
        if self.in_flight.remove(&k).is_some() {
            self.acked.insert(k);
            if k == self.base {
                self.slide_base();
            }
        }
    }

    fn on_data(&mut self, packet: &Packet) -> (DataOutcome, Vec<Packet>) {
        let seq = packet.sequence_number;

        if seq < self.expected {
            // Already delivered; the sender's view of our ACK must be
            // stale. Re-ACK this exact segment (spec §4.2.2).
            return (DataOutcome::Duplicate, vec![Packet::ack(seq)]);
        }

        if seq >= self.expected.wrapping_add(self.window) {
            return (DataOutcome::Dropped, Vec::new());
        }

        if seq == self.expected {
            self.recv_buffer.insert(seq, packet.payload.clone());
            let mut delivered = Vec::new();
            while let Some(data) = self.recv_buffer.remove(&self.expected) {
                delivered.push(data);
                self.expected = self.expected.wrapping_add(1);
            }
            (DataOutcome::Delivered(delivered), vec![Packet::ack(seq)])
        } else {
            self.recv_buffer.entry(seq).or_insert_with(|| packet.payload.clone());
            (DataOutcome::Buffered, vec![Packet::ack(seq)])
        }
    }

    fn tick(&mut self, now: Instant) -> Vec<Packet> {
        let mut out = Vec::new();
        for in_flight in self.in_flight.values_mut() {
            if now.duration_since(in_flight.sent_at) >= SOCKET_TIMEOUT {
                in_flight.sent_at = now;
                out.push(in_flight.packet.clone());
            }
        }
        out
    }

    fn drain(&mut self) {
        self.drained = true;
    }

    fn fully_acked(&self) -> bool {
        self.drained && self.in_flight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn admits_up_to_window_concurrently() {
        let mut sr = SelectiveRepeat::with_window(4);
        for i in 0..4 {
            let (adm, pkts) = sr.offer_send(vec![i]);
            assert_eq!(adm, SendAdmission::Admitted);
            assert_eq!(pkts[0].sequence_number, i as u32);
        }
        let (adm, pkts) = sr.offer_send(vec![99]);
        assert_eq!(adm, SendAdmission::WindowFull);
        assert!(pkts.is_empty());
    }

    #[test]
    fn out_of_order_acks_slide_base_once_contiguous() {
        let mut sr = SelectiveRepeat::with_window(4);
        for i in 0..4u8 {
            sr.offer_send(vec![i]);
        }
        // ACKs 0, 1, 3 arrive; 2 is still missing.
        sr.on_ack(&Packet::ack(0));
        sr.on_ack(&Packet::ack(1));
        sr.on_ack(&Packet::ack(3));
        assert!(!sr.fully_acked());
        assert!(sr.in_flight.contains_key(&2));

        sr.on_ack(&Packet::ack(2));
        assert!(sr.in_flight.is_empty());
        sr.drain();
        assert!(sr.fully_acked());
    }

    #[test]
    fn only_timed_out_segment_is_retransmitted() {
        let mut sr = SelectiveRepeat::with_window(4);
        sr.offer_send(vec![0]);
        let early = Instant::now();
        sr.offer_send(vec![1]);

        let later = early + SOCKET_TIMEOUT + Duration::from_millis(1);
        let retransmitted = sr.tick(later);
        // Both are "in-flight" long enough here; assert each has its own
        // independent packet rather than a shared global timer.
        let seqs: Vec<u32> = retransmitted.iter().map(|p| p.sequence_number).collect();
        assert!(seqs.contains(&0));
    }

    #[test]
    fn receiver_buffers_out_of_order_and_delivers_in_order_prefix() {
        let mut sr = SelectiveRepeat::with_window(4);

        let (outcome, _) = sr.on_data(&Packet::data(2, vec![2]));
        assert_eq!(outcome, DataOutcome::Buffered);

        let (outcome, _) = sr.on_data(&Packet::data(1, vec![1]));
        assert_eq!(outcome, DataOutcome::Buffered);

        // Delivering 0 unlocks the contiguous run 0, 1, 2.
        let (outcome, _) = sr.on_data(&Packet::data(0, vec![0]));
        assert_eq!(
            outcome,
            DataOutcome::Delivered(vec![vec![0], vec![1], vec![2]])
        );
    }

    #[test]
    fn receiver_drops_beyond_window_and_dedupes_below_base() {
        let mut sr = SelectiveRepeat::with_window(2);

        let (outcome, acks) = sr.on_data(&Packet::data(5, vec![9]));
        assert_eq!(outcome, DataOutcome::Dropped);
        assert!(acks.is_empty());

        sr.on_data(&Packet::data(0, vec![0]));
        let (outcome, acks) = sr.on_data(&Packet::data(0, vec![0]));
        assert_eq!(outcome, DataOutcome::Duplicate);
        assert_eq!(acks[0].ack_number, 0);
    }
}
