//! Sans-IO frame codec.
//!
//! Every frame is
//!
//! ```text
//! total_len:u32  seq_no:u32  payload  crc32:u32
//! ```
//!
//! where `total_len` counts the whole frame, `seq_no` is a per-direction
//! frame counter and the CRC-32 (IEEE) covers everything before it. Bring
//! your own byte stream: feed received bytes into a buffer and call
//! [`FrameCodec::decode_frame`] until it yields a payload.

use std::fmt;

/// Large enough for a 1 MiB download chunk plus envelope overhead.
pub const DEFAULT_MAX_FRAME_LEN: usize = 2 * 1024 * 1024;

const HEADER_LEN: usize = 8;
const TRAILER_LEN: usize = 4;

/// Framing failures. All of them mean the peer is not speaking the
/// protocol correctly, except [`Error::ServerCode`].
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    TooShort { len: usize },
    TooLarge { len: usize, max: usize },
    Misaligned { len: usize },
    BadChecksum { expected: u32, got: u32 },
    BadSequence { expected: u32, got: u32 },
    MalformedPacket { reason: &'static str },
    /// Transport-level error code (a bare negative int32 payload, e.g. -404).
    ServerCode { code: i32 },
}

impl Error {
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, Self::ServerCode { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "frame of {len} bytes is shorter than its header"),
            Self::TooLarge { len, max } => write!(f, "frame of {len} bytes exceeds limit {max}"),
            Self::Misaligned { len } => write!(f, "payload of {len} bytes is not 4-byte aligned"),
            Self::BadChecksum { expected, got } => {
                write!(f, "crc mismatch: frame says {expected:#010x}, computed {got:#010x}")
            }
            Self::BadSequence { expected, got } => {
                write!(f, "frame seq_no {got} out of order (expected {expected})")
            }
            Self::MalformedPacket { reason } => write!(f, "malformed packet: {reason}"),
            Self::ServerCode { code } => write!(f, "server transport error {code}"),
        }
    }
}

impl std::error::Error for Error {}

/// Encoder and decoder for one direction pair of a connection.
#[derive(Clone, Debug)]
pub struct FrameCodec {
    max_frame_len: usize,
    send_seq: u32,
    recv_seq: u32,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len, send_seq: 0, recv_seq: 0 }
    }

    pub fn max_frame_len(&self) -> usize { self.max_frame_len }

    /// Frame `payload` for sending.
    pub fn encode_frame(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        if payload.len() % 4 != 0 {
            return Err(Error::Misaligned { len: payload.len() });
        }
        let total = HEADER_LEN + payload.len() + TRAILER_LEN;
        if total > self.max_frame_len {
            return Err(Error::TooLarge { len: total, max: self.max_frame_len });
        }

        let mut frame = Vec::with_capacity(total);
        frame.extend((total as u32).to_le_bytes());
        frame.extend(self.send_seq.to_le_bytes());
        frame.extend_from_slice(payload);
        let crc = crc32_ieee(&frame);
        frame.extend(crc.to_le_bytes());

        self.send_seq = self.send_seq.wrapping_add(1);
        Ok(frame)
    }

    /// Number of bytes the frame at the head of `buf` occupies, once its
    /// length prefix has arrived. Oversized lengths are rejected here so a
    /// caller never buffers them.
    pub fn frame_len(&self, buf: &[u8]) -> Result<Option<usize>, Error> {
        let Some(head) = buf.get(..4) else { return Ok(None) };
        let total = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
        if total < HEADER_LEN + TRAILER_LEN + 4 {
            return Err(Error::TooShort { len: total });
        }
        if total > self.max_frame_len {
            return Err(Error::TooLarge { len: total, max: self.max_frame_len });
        }
        Ok(Some(total))
    }

    /// Take one complete frame off the front of `buf`, returning its payload.
    /// `Ok(None)` means more bytes are needed.
    pub fn decode_frame(&mut self, buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        let Some(total) = self.frame_len(buf)? else { return Ok(None) };
        if buf.len() < total {
            return Ok(None);
        }

        let frame: Vec<u8> = buf.drain(..total).collect();
        let (body, crc) = frame.split_at(total - TRAILER_LEN);
        let expected = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let got = crc32_ieee(body);
        if expected != got {
            return Err(Error::BadChecksum { expected, got });
        }

        let seq = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
        if seq != self.recv_seq {
            return Err(Error::BadSequence { expected: self.recv_seq, got: seq });
        }
        self.recv_seq = self.recv_seq.wrapping_add(1);

        let payload = &body[HEADER_LEN..];
        if payload.len() == 4 {
            return Err(Error::ServerCode {
                code: i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            });
        }
        if payload.len() % 4 != 0 {
            return Err(Error::Misaligned { len: payload.len() });
        }
        Ok(Some(payload.to_vec()))
    }
}

impl Default for FrameCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LEN) }
}

/// CRC-32 with the IEEE 802.3 polynomial.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    const POLY: u32 = 0xedb88320;
    let mut crc: u32 = 0xffffffff;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }
    !crc
}
