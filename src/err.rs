use std::net::SocketAddr;

/// Errors produced while decoding a datagram into a [`crate::packet::Packet`].
///
/// `DecodeError`s are never surfaced to a peer: a malformed or corrupt
/// datagram is dropped silently by whoever received it (see spec §3 and
/// §7 — corruption is recovered by the sender's retransmit timer, not by
/// an error reply).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram shorter than the 16-byte header")]
    TooShort,
    #[error("checksum mismatch")]
    BadChecksum,
    #[error("declared payload_length does not match datagram size")]
    BadLength,
    #[error("flag combination {0:#06x} is not a valid packet")]
    UnknownFlagCombination(u16),
}

/// Top-level error type for the RDT core.
///
/// Every variant maps to one of the error kinds named in spec §7; the CLI
/// binaries turn these into process exit codes via [`Error::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A packet failed to decode. Callers at the session boundary catch
    /// and drop this rather than letting it propagate — kept here only so
    /// the codec can return a typed `Result`.
    #[error("codec error: {0}")]
    Codec(#[from] DecodeError),

    #[error("handshake failed: SYN retries exhausted")]
    HandshakeFailed,

    #[error("peer reported an error: {0}")]
    Peer(String),

    #[error("peer {0} has been silent for longer than the idle timeout")]
    PeerGone(SocketAddr),

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("request rejected: {0}")]
    RequestRejected(String),
}

impl Error {
    /// Exit code for the `upload`/`download` CLIs (spec §6).
    ///
    /// `LocalIO` maps to different codes depending on direction (source
    /// unreadable vs. destination unwritable); callers that know their
    /// direction should prefer a direct match over this generic mapping
    /// when that distinction matters.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::HandshakeFailed => 1,
            Error::Io(_) => 1,
            Error::Peer(_) | Error::RequestRejected(_) => 4,
            Error::PeerGone(_) => 1,
            Error::Codec(_) => 1,
            Error::ProtocolViolation(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
