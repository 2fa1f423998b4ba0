//! Connection establishment payloads (spec §4.4).
//!
//! Pure (de)serialization of the negotiation carried inside the SYN and
//! SYN|ACK packets. The actual handshake *driving* logic — who retries,
//! who migrates address, who validates the request — lives in
//! [`crate::client`] (client side) and [`crate::demux`] (server side);
//! this module only knows how to turn those decisions into/from bytes,
//! mirroring the codec/session split of §4.1 vs §4.3.

use std::convert::TryInto;

use crate::err::DecodeError;

/// The requested file operation, carried in the SYN payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Download,
}

/// Which ARQ engine the transfer negotiates (spec §2, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    StopAndWait,
    SelectiveRepeat,
}

/// Negotiation payload of a SYN packet: `operation, protocol, filename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynPayload {
    pub operation: Operation,
    pub protocol: Protocol,
    pub filename: String,
}

impl SynPayload {
    pub fn encode(&self) -> Vec<u8> {
        let name = self.filename.as_bytes();
        let mut out = Vec::with_capacity(4 + name.len());
        out.push(match self.operation {
            Operation::Upload => 0,
            Operation::Download => 1,
        });
        out.push(match self.protocol {
            Protocol::StopAndWait => 0,
            Protocol::SelectiveRepeat => 1,
        });
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < 4 {
            return Err(DecodeError::TooShort);
        }
        let operation = match bytes[0] {
            0 => Operation::Upload,
            1 => Operation::Download,
            _ => return Err(DecodeError::BadLength),
        };
        let protocol = match bytes[1] {
            0 => Protocol::StopAndWait,
            1 => Protocol::SelectiveRepeat,
            _ => return Err(DecodeError::BadLength),
        };
        let name_len = u16::from_be_bytes(bytes[2..4].try_into().unwrap()) as usize;
        if bytes.len() != 4 + name_len {
            return Err(DecodeError::BadLength);
        }
        let filename = String::from_utf8(bytes[4..].to_vec()).map_err(|_| DecodeError::BadLength)?;
        Ok(SynPayload {
            operation,
            protocol,
            filename,
        })
    }
}

/// Negotiation payload of a SYN|ACK: empty for UPLOAD, an 8-byte file size
/// for DOWNLOAD (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynAckPayload {
    UploadAck,
    DownloadAck { file_size: u64 },
}

impl SynAckPayload {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            SynAckPayload::UploadAck => Vec::new(),
            SynAckPayload::DownloadAck { file_size } => file_size.to_be_bytes().to_vec(),
        }
    }

    pub fn decode(operation: Operation, bytes: &[u8]) -> Result<Self, DecodeError> {
        match operation {
            Operation::Upload => Ok(SynAckPayload::UploadAck),
            Operation::Download => {
                if bytes.len() != 8 {
                    return Err(DecodeError::BadLength);
                }
                let file_size = u64::from_be_bytes(bytes.try_into().unwrap());
                Ok(SynAckPayload::DownloadAck { file_size })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syn_round_trip() {
        let syn = SynPayload {
            operation: Operation::Upload,
            protocol: Protocol::SelectiveRepeat,
            filename: "empty.bin".to_string(),
        };
        let bytes = syn.encode();
        assert_eq!(SynPayload::decode(&bytes).unwrap(), syn);
    }

    #[test]
    fn synack_download_round_trip() {
        let ack = SynAckPayload::DownloadAck { file_size: 102_400 };
        let bytes = ack.encode();
        assert_eq!(
            SynAckPayload::decode(Operation::Download, &bytes).unwrap(),
            ack
        );
    }

    #[test]
    fn synack_upload_is_empty() {
        let bytes = SynAckPayload::UploadAck.encode();
        assert!(bytes.is_empty());
        assert_eq!(
            SynAckPayload::decode(Operation::Upload, &bytes).unwrap(),
            SynAckPayload::UploadAck
        );
    }
}
