//! A reliable-data-transfer protocol over UDP: fixed-header packets, a
//! choice of Stop-and-Wait or Selective Repeat ARQ, and a threaded
//! handshake/demultiplexer modeled on the teacher's split between a pure
//! connection state machine and the thread that actually owns a socket.

pub mod arq;
pub mod client;
pub mod config;
pub mod demux;
pub mod err;
pub mod handshake;
pub mod packet;
pub mod session;
pub mod storage;

pub use err::{Error, Result};
