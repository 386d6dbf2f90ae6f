//! Inbound wire formats.
//!
//! Announcement (JSON):
//! ```text
//! { "version": "1.2.3", "size": 1048576, "crc32": 3735928559 }
//! ```
//!
//! Chunk (binary, little-endian header):
//! ```text
//! ┌────────────┬────────────────┬──────────────────────────┐
//! │ index: u32 │ declared: u32  │ payload (declared bytes) │
//! └────────────┴────────────────┴──────────────────────────┘
//! ```
//!
//! The decoder does not check `declared` against the payload length; that
//! is a session-level abort, not a framing error.

use serde::Deserialize;

use crate::error::DecodeError;

/// Size of the fixed chunk header.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Largest chunk payload the sender emits.
pub const MAX_CHUNK_PAYLOAD: usize = 4096;

/// Largest frame buffered between the MQTT task and the control loop.
pub const MAX_FRAME_LEN: usize = CHUNK_HEADER_LEN + MAX_CHUNK_PAYLOAD;

pub type VersionString = heapless::String<32>;

// ── Raw frame ─────────────────────────────────────────────────

/// A received message, copied out of the transport's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub topic: heapless::String<96>,
    pub payload: heapless::Vec<u8, MAX_FRAME_LEN>,
}

impl InboundFrame {
    /// Copy `topic` and `payload`.  Returns `None` if either exceeds its
    /// fixed capacity.
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        let mut t = heapless::String::new();
        t.push_str(topic).ok()?;
        let p = heapless::Vec::from_slice(payload).ok()?;
        Some(Self { topic: t, payload: p })
    }
}

// ── Announcement ──────────────────────────────────────────────

/// Describes an update before any bytes arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateAnnouncement {
    pub version: VersionString,
    pub total_size: u32,
    pub expected_crc32: u32,
}

#[derive(Deserialize)]
struct RawAnnouncement {
    version: String,
    size: u32,
    crc32: u32,
}

impl UpdateAnnouncement {
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawAnnouncement =
            serde_json::from_slice(raw).map_err(|_| DecodeError::InvalidJson)?;
        let mut version = VersionString::new();
        version
            .push_str(&raw.version)
            .map_err(|_| DecodeError::VersionTooLong)?;
        Ok(Self {
            version,
            total_size: raw.size,
            expected_crc32: raw.crc32,
        })
    }
}

// ── Chunk ─────────────────────────────────────────────────────

/// One fragment of the image, borrowed from the frame it arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEnvelope<'a> {
    pub index: u32,
    pub declared_size: u32,
    pub payload: &'a [u8],
}

impl<'a> ChunkEnvelope<'a> {
    pub fn decode(frame: &'a [u8]) -> Result<Self, DecodeError> {
        if frame.len() < CHUNK_HEADER_LEN {
            return Err(DecodeError::Truncated);
        }
        let (header, payload) = frame.split_at(CHUNK_HEADER_LEN);
        let index = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let declared_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        Ok(Self {
            index,
            declared_size,
            payload,
        })
    }
}

/// Build a chunk frame the way the update server does.
pub fn encode_chunk(index: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(CHUNK_HEADER_LEN + payload.len());
    frame.extend_from_slice(&index.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

// ── Decoded message ───────────────────────────────────────────

/// Everything the control loop can receive, decoded once at the
/// transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage<'a> {
    Announcement(UpdateAnnouncement),
    Chunk(ChunkEnvelope<'a>),
    DiagnosticsRequest,
    Other,
}
