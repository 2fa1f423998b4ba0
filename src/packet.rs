//! Wire Packet Codec (spec §4.1).
//!
//! A 16-byte header followed by up to [`crate::config::MAX_PAYLOAD`] bytes
//! of payload. Stateless and pure: `encode`/`decode` never touch a socket
//! or the clock.

use crate::config::{HEADER_LEN, MAX_PAYLOAD};
use crate::err::DecodeError;

bitflags::bitflags! {
    /// Flag bits of the `flags` header field (spec §3). Flags may combine
    /// (e.g. `SYN | ACK`); [`decode`] rejects combinations no state of the
    /// protocol ever produces.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        const SYN = 0x01;
        const ACK = 0x02;
        const FIN = 0x04;
        const DATA = 0x08;
        const ERR = 0x10;
    }
}

/// A decoded packet. Never constructed with an inconsistent
/// `payload.len() != payload_length` — [`decode`] rejects those,
/// and [`encode`] derives `payload_length` from `payload` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence_number: u32,
    pub ack_number: u32,
    pub flags: Flags,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn syn(sequence_number: u32, payload: Vec<u8>) -> Self {
        Packet {
            sequence_number,
            ack_number: 0,
            flags: flag_set(Flags::SYN, !payload.is_empty()),
            payload,
        }
    }

    pub fn syn_ack(sequence_number: u32, ack_number: u32, payload: Vec<u8>) -> Self {
        Packet {
            sequence_number,
            ack_number,
            flags: flag_set(Flags::SYN | Flags::ACK, !payload.is_empty()),
            payload,
        }
    }

    pub fn ack(ack_number: u32) -> Self {
        Packet {
            sequence_number: 0,
            ack_number,
            flags: Flags::ACK,
            payload: Vec::new(),
        }
    }

    pub fn data(sequence_number: u32, payload: Vec<u8>) -> Self {
        Packet {
            sequence_number,
            ack_number: 0,
            flags: Flags::DATA,
            payload,
        }
    }

    pub fn fin() -> Self {
        Packet {
            sequence_number: 0,
            ack_number: 0,
            flags: Flags::FIN,
            payload: Vec::new(),
        }
    }

    pub fn fin_ack() -> Self {
        Packet {
            sequence_number: 0,
            ack_number: 0,
            flags: Flags::FIN | Flags::ACK,
            payload: Vec::new(),
        }
    }

    pub fn err(reason: &str) -> Self {
        Packet {
            sequence_number: 0,
            ack_number: 0,
            flags: Flags::ERR,
            payload: reason.as_bytes().to_vec(),
        }
    }

    pub fn err_reason(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    pub fn is_syn(&self) -> bool {
        self.flags.contains(Flags::SYN)
    }
    pub fn is_ack(&self) -> bool {
        self.flags.contains(Flags::ACK)
    }
    pub fn is_fin(&self) -> bool {
        self.flags.contains(Flags::FIN)
    }
    pub fn is_data(&self) -> bool {
        self.flags.contains(Flags::DATA)
    }
    pub fn is_err(&self) -> bool {
        self.flags.contains(Flags::ERR)
    }
}

fn flag_set(base: Flags, cond: bool) -> Flags {
    if cond {
        base | Flags::DATA
    } else {
        base
    }
}

/// Every flag combination any state of the protocol ever emits. Anything
/// else decodes to [`DecodeError::UnknownFlagCombination`] (e.g.
/// `SYN | FIN`).
fn is_known_combination(flags: Flags) -> bool {
    let known: &[Flags] = &[
        Flags::SYN,
        Flags::SYN | Flags::DATA,
        Flags::SYN | Flags::ACK,
        Flags::SYN | Flags::ACK | Flags::DATA,
        Flags::ACK,
        Flags::DATA,
        Flags::DATA | Flags::ACK,
        Flags::FIN,
        Flags::FIN | Flags::ACK,
        Flags::ERR,
    ];
    known.iter().any(|k| *k == flags)
}

fn checksum(header_with_zeroed_checksum: &[u8; HEADER_LEN], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_with_zeroed_checksum);
    hasher.update(payload);
    hasher.finalize()
}

/// Serialize `packet` to its wire representation, computing the checksum
/// with the checksum field zeroed first (spec §4.1).
pub fn encode(packet: &Packet) -> Vec<u8> {
    let payload_length = packet.payload.len() as u16;

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(&packet.sequence_number.to_be_bytes());
    header[4..8].copy_from_slice(&packet.ack_number.to_be_bytes());
    header[8..10].copy_from_slice(&packet.flags.bits().to_be_bytes());
    // header[10..14] checksum left zeroed for the checksum computation
    header[14..16].copy_from_slice(&payload_length.to_be_bytes());

    let sum = checksum(&header, &packet.payload);
    header[10..14].copy_from_slice(&sum.to_be_bytes());

    let mut out = Vec::with_capacity(HEADER_LEN + packet.payload.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&packet.payload);
    out
}

/// Parse a received datagram into a [`Packet`], rejecting malformed
/// headers, checksum mismatches, length mismatches, and impossible flag
/// combinations (spec §4.1). Never panics on attacker-controlled input.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::TooShort);
    }

    let sequence_number = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let ack_number = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
    let flags_bits = u16::from_be_bytes(bytes[8..10].try_into().unwrap());
    let declared_checksum = u32::from_be_bytes(bytes[10..14].try_into().unwrap());
    let payload_length = u16::from_be_bytes(bytes[14..16].try_into().unwrap()) as usize;

    if payload_length > MAX_PAYLOAD || HEADER_LEN + payload_length != bytes.len() {
        return Err(DecodeError::BadLength);
    }

    let flags = Flags::from_bits_truncate(flags_bits);
    if flags.bits() != flags_bits || !is_known_combination(flags) {
        return Err(DecodeError::UnknownFlagCombination(flags_bits));
    }

    let payload = &bytes[HEADER_LEN..];

    let mut zeroed_header = [0u8; HEADER_LEN];
    zeroed_header.copy_from_slice(&bytes[0..HEADER_LEN]);
    zeroed_header[10..14].fill(0);
    let expected = checksum(&zeroed_header, payload);
    if expected != declared_checksum {
        return Err(DecodeError::BadChecksum);
    }

    if payload_length > 0 && !flags.contains(Flags::DATA) && !flags.contains(Flags::ERR) {
        return Err(DecodeError::BadLength);
    }

    Ok(Packet {
        sequence_number,
        ack_number,
        flags,
        payload: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_data() {
        let p = Packet::data(7, vec![1, 2, 3, 4, 5]);
        let bytes = encode(&p);
        assert_eq!(decode(&bytes).unwrap(), p);
    }

    #[test]
    fn round_trip_every_kind() {
        let packets = vec![
            Packet::syn(0, vec![9, 9]),
            Packet::syn_ack(0, 1, vec![1]),
            Packet::ack(5),
            Packet::data(2, vec![]),
            Packet::fin(),
            Packet::fin_ack(),
            Packet::err("server busy"),
        ];
        for p in packets {
            assert_eq!(decode(&encode(&p)).unwrap(), p);
        }
    }

    #[test]
    fn too_short_is_rejected() {
        assert_eq!(decode(&[0u8; 4]), Err(DecodeError::TooShort));
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let p = Packet::data(1, vec![1, 2, 3]);
        let mut bytes = encode(&p);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert_eq!(decode(&bytes), Err(DecodeError::BadChecksum));
    }

    #[test]
    fn bad_length_is_rejected() {
        let p = Packet::data(1, vec![1, 2, 3]);
        let mut bytes = encode(&p);
        bytes.push(0); // datagram longer than declared payload_length
        assert_eq!(decode(&bytes), Err(DecodeError::BadLength));
    }

    #[test]
    fn unknown_flag_combination_is_rejected() {
        let mut bytes = encode(&Packet::fin());
        // SYN | FIN: impossible combination (spec §4.1 example).
        let bits = (Flags::SYN | Flags::FIN).bits();
        bytes[8..10].copy_from_slice(&bits.to_be_bytes());
        // fix checksum so the flag check, not the checksum check, fires
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[0..HEADER_LEN]);
        header[10..14].fill(0);
        let sum = checksum(&header, &[]);
        bytes[10..14].copy_from_slice(&sum.to_be_bytes());

        assert_eq!(
            decode(&bytes),
            Err(DecodeError::UnknownFlagCombination(bits))
        );
    }

    #[test]
    fn payload_without_data_flag_is_rejected() {
        // Hand-build a packet: ACK flag but a non-zero payload_length.
        let mut header = [0u8; HEADER_LEN];
        header[8..10].copy_from_slice(&Flags::ACK.bits().to_be_bytes());
        header[14..16].copy_from_slice(&3u16.to_be_bytes());
        let sum = checksum(&header, &[1, 2, 3]);
        header[10..14].copy_from_slice(&sum.to_be_bytes());

        let mut bytes = header.to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);

        assert_eq!(decode(&bytes), Err(DecodeError::BadLength));
    }
}
