//! Fuzz target: `MessageRouter::route` + `OtaManager::process_chunk`
//!
//! The first byte picks the topic; the rest is the payload.  Decoding must
//! never panic, and whatever reaches the OTA manager must leave it holding
//! a partition only while a transfer is active.
//!
//! cargo fuzz run fuzz_inbound_router

#![no_main]

use brodbuddy::adapters::flash::SimFlash;
use brodbuddy::app::ports::PowerPort;
use brodbuddy::net::{InboundMessage, MessageRouter, Topics};
use brodbuddy::ota::{OtaManager, OtaNotice, OtaTiming};
use libfuzzer_sys::fuzz_target;

struct Mains;

impl PowerPort for Mains {
    fn is_safe_to_flash(&self) -> bool {
        true
    }
    fn battery_percent(&self) -> u8 {
        100
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let topics = Topics::new("BB-F022ED");
    let topic = match selector % 4 {
        0 => topics.ota_start.clone(),
        1 => topics.ota_chunk.clone(),
        2 => topics.diagnostics_request.clone(),
        _ => topics.telemetry.clone(),
    };

    let start = topics.ota_start.clone();
    let mut router = MessageRouter::new(topics);
    let mut ota = OtaManager::new(SimFlash::new(8 * 1024), OtaTiming::default());
    let mut notices: Vec<OtaNotice> = Vec::new();

    // Open a session first so chunk frames exercise the write path.
    if let Ok(InboundMessage::Announcement(ann)) =
        router.route(start.as_str(), br#"{"version":"0.0.0","size":4096,"crc32":0}"#)
    {
        let _ = ota.start_update(&ann, &Mains, 0, &mut notices);
    }

    match router.route(topic.as_str(), rest) {
        Ok(InboundMessage::Announcement(ann)) => {
            let _ = ota.start_update(&ann, &Mains, 1, &mut notices);
        }
        Ok(InboundMessage::Chunk(chunk)) => {
            assert!(chunk.payload.len() <= rest.len());
            let _ = ota.process_chunk(&chunk, 1, &mut notices);
        }
        Ok(_) | Err(_) => {}
    }

    assert_eq!(ota.has_partition_handle(), ota.status().holds_partition());
    assert_eq!(
        ota.store().live_writers(),
        u32::from(ota.status().holds_partition())
    );
});

