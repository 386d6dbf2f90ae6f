//! Control-channel plumbing: topic naming, inbound decoding, routing.
//!
//! ```text
//!  MQTT frame ──▶ MessageRouter::route ──▶ InboundMessage
//!                        │                  ├─ Announcement ─▶ OtaManager::start_update
//!                        │                  ├─ Chunk        ─▶ OtaManager::process_chunk
//!                      Topics               ├─ DiagnosticsRequest
//!                                           └─ Other
//! ```

pub mod message;
pub mod router;
pub mod topics;

pub use message::{ChunkEnvelope, InboundFrame, InboundMessage, UpdateAnnouncement};
pub use router::MessageRouter;
pub use topics::Topics;
