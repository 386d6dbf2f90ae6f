//! Topic → message routing.

use log::{info, warn};

use super::message::{ChunkEnvelope, InboundMessage, UpdateAnnouncement};
use super::topics::Topics;
use crate::error::DecodeError;

/// Every message is logged up to this count, then only every
/// [`LOG_EVERY`]th one (chunk floods would drown the console).
const LOG_FIRST: u32 = 10;
const LOG_EVERY: u32 = 50;

pub struct MessageRouter {
    topics: Topics,
    message_count: u32,
}

impl MessageRouter {
    pub fn new(topics: Topics) -> Self {
        Self {
            topics,
            message_count: 0,
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    /// Decode `payload` according to the topic it arrived on.
    pub fn route<'a>(
        &mut self,
        topic: &str,
        payload: &'a [u8],
    ) -> Result<InboundMessage<'a>, DecodeError> {
        self.message_count = self.message_count.wrapping_add(1);
        if self.message_count <= LOG_FIRST || self.message_count % LOG_EVERY == 0 {
            info!(
                "mqtt: message #{} topic={} len={}",
                self.message_count,
                topic,
                payload.len()
            );
        }

        let decoded = if topic == self.topics.ota_chunk.as_str() {
            ChunkEnvelope::decode(payload).map(InboundMessage::Chunk)
        } else if topic == self.topics.ota_start.as_str() {
            UpdateAnnouncement::decode(payload).map(InboundMessage::Announcement)
        } else if topic == self.topics.diagnostics_request.as_str() {
            Ok(InboundMessage::DiagnosticsRequest)
        } else {
            Ok(InboundMessage::Other)
        };

        if let Err(e) = decoded {
            warn!("mqtt: dropping frame on {}: {}", topic, e);
        }
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::message::encode_chunk;

    fn router() -> MessageRouter {
        MessageRouter::new(Topics::new("BB-AABBCC"))
    }

    #[test]
    fn routes_chunk_topic() {
        let mut r = router();
        let frame = encode_chunk(3, b"abcd");
        match r.route("analyzer/BB-AABBCC/ota/chunk", &frame).unwrap() {
            InboundMessage::Chunk(c) => {
                assert_eq!(c.index, 3);
                assert_eq!(c.payload, b"abcd");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn routes_announcement_topic() {
        let mut r = router();
        let msg = r
            .route(
                "analyzer/BB-AABBCC/ota/start",
                br#"{"version":"1.0.1","size":10,"crc32":7}"#,
            )
            .unwrap();
        assert!(matches!(msg, InboundMessage::Announcement(a) if a.total_size == 10));
    }

    #[test]
    fn routes_diagnostics_request_regardless_of_payload() {
        let mut r = router();
        let msg = r.route("analyzer/BB-AABBCC/diagnostics/request", b"").unwrap();
        assert_eq!(msg, InboundMessage::DiagnosticsRequest);
    }

    #[test]
    fn foreign_topic_is_other() {
        let mut r = router();
        assert_eq!(
            r.route("analyzer/BB-000000/ota/chunk", &[0; 12]).unwrap(),
            InboundMessage::Other
        );
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let mut r = router();
        assert_eq!(
            r.route("analyzer/BB-AABBCC/ota/chunk", &[1, 2]),
            Err(DecodeError::Truncated)
        );
        assert_eq!(
            r.route("analyzer/BB-AABBCC/ota/start", b"nope"),
            Err(DecodeError::InvalidJson)
        );
        assert_eq!(r.message_count(), 2);
    }
}
