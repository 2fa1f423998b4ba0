//! Process-level configuration constants (spec §9 "Global state" — there is
//! none beyond these, and they are immutable after startup).

use std::time::Duration;

/// Maximum payload bytes per DATA packet (spec §3).
pub const MAX_PAYLOAD: usize = 1024;

/// Fixed header length in bytes (spec §3).
pub const HEADER_LEN: usize = 16;

/// Maximum datagram size on the wire: 16-byte header + [`MAX_PAYLOAD`].
pub const MAX_PACKET: usize = HEADER_LEN + MAX_PAYLOAD;

/// Base retransmission timeout, shared by both ARQ engines and the
/// handshake (spec §4.2).
pub const SOCKET_TIMEOUT: Duration = Duration::from_millis(80);

/// Selective Repeat window size (spec §4.2.2 default).
pub const SR_WINDOW: u32 = 32;

/// Bound on SYN retransmission before a client gives up (spec §4.3).
pub const MAX_SYN_RETRIES: u32 = 10;

/// Inactivity bound after which a session/demux entry is declared dead
/// (spec §4.6, §7).
pub const MAX_IDLE: Duration = Duration::from_secs(30);

/// Default well-known listener port (spec §6).
pub const DEFAULT_PORT: u16 = 12000;

/// Default bind address (spec §6).
pub const DEFAULT_ADDR: &str = "127.0.0.1";

/// Default server storage directory (spec §6).
pub const DEFAULT_STORAGE_DIR: &str = "./server_files";

/// Default bounded worker pool size (spec §4.6).
pub const DEFAULT_POOL_SIZE: usize = 3;

/// How often the demultiplexer wakes up to drain termination signals and
/// prune idle entries, independent of any single session's activity.
pub const DEMUX_POLL_INTERVAL: Duration = Duration::from_millis(100);
