//! End-to-end OTA flows: announcement → chunks → verification → reboot,
//! driven through the controller exactly as the broker would.

use brodbuddy::fsm::Phase;
use brodbuddy::ota::{OtaStatus, crc32};

use crate::mock_hw::*;

const CHUNK: usize = 256;

/// Awake rig idling in `Sleeping` with the channel up.
fn idle_rig() -> Rig {
    let mut rig = Rig::awake();
    rig.run_until(Phase::Sleeping, 20);
    rig
}

/// `status:progress` for every notice, in publish order.
fn statuses(rig: &Rig) -> Vec<String> {
    rig.notices()
        .iter()
        .map(|n| {
            format!(
                "{}:{}",
                n["status"].as_str().unwrap(),
                n["progress"].as_u64().unwrap()
            )
        })
        .collect()
}

fn send_image(rig: &mut Rig, img: &[u8]) {
    for (i, part) in img.chunks(CHUNK).enumerate() {
        rig.send_chunk(i as u32, part);
    }
    rig.tick();
}

#[test]
fn full_update_reboots_into_new_image() {
    let mut rig = idle_rig();
    let img = image(4 * CHUNK);

    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();
    assert_eq!(rig.controller.ota().status(), OtaStatus::Downloading);
    assert_eq!(rig.phase(), Phase::ApplyingUpdate);

    send_image(&mut rig, &img);
    assert_eq!(rig.controller.ota().status(), OtaStatus::Complete);
    assert_eq!(
        statuses(&rig),
        [
            "started:0",
            "downloading:25",
            "downloading:50",
            "downloading:75",
            "downloading:100",
            "applying:100",
            "complete:100",
        ]
    );
    assert_eq!(
        rig.controller.ota().store().next_boot_image(),
        Some(&img[..])
    );

    // Restart only after the reboot delay, and only once.
    assert_eq!(rig.ports.system.restarts, 0);
    rig.ticks(40);
    assert_eq!(rig.ports.system.restarts, 1);
    assert_eq!(rig.controller.ota().status(), OtaStatus::Rebooting);
    rig.ticks(20);
    assert_eq!(rig.ports.system.restarts, 1);
    assert_eq!(rig.phase(), Phase::ApplyingUpdate);
}

#[test]
fn reconnect_resubscribes_and_resumes() {
    let mut rig = idle_rig();
    let img = image(4 * CHUNK);
    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();
    rig.send_chunk(0, &img[..CHUNK]);
    rig.send_chunk(1, &img[CHUNK..2 * CHUNK]);
    rig.tick();

    rig.ports.channel.connected = false;
    rig.tick();
    rig.ports.channel.subscriptions.clear();
    rig.ports.channel.connected = true;
    rig.tick();

    let topics = rig.controller.topics().clone();
    assert_eq!(rig.ports.channel.subscriptions.len(), 3);
    assert!(rig.ports.channel.subscriptions.contains(&topics.ota_chunk.to_string()));
    let last = rig.last_notice();
    assert_eq!(last["status"], "downloading");
    assert_eq!(last["progress"], 50);
    assert_eq!(last["resumed"], true);

    rig.send_chunk(2, &img[2 * CHUNK..3 * CHUNK]);
    rig.send_chunk(3, &img[3 * CHUNK..]);
    rig.tick();
    assert_eq!(rig.controller.ota().status(), OtaStatus::Complete);
}

#[test]
fn checksum_mismatch_keeps_boot_selection() {
    let mut rig = idle_rig();
    let img = image(4 * CHUNK);
    rig.announce(img.len() as u32, crc32(&img) ^ 1);
    rig.tick();
    send_image(&mut rig, &img);

    let ota = rig.controller.ota();
    assert_eq!(ota.status(), OtaStatus::Error);
    assert!(!ota.has_partition_handle());
    assert_eq!(ota.store().boot_switches(), 0);
    assert_eq!(ota.store().live_writers(), 0);
    assert_eq!(rig.last_notice()["message"], "checksum mismatch");
    assert!(statuses(&rig).iter().all(|s| !s.starts_with("applying")));
    assert_eq!(statuses(&rig).first().map(String::as_str), Some("started:0"));
    assert_eq!(rig.phase(), Phase::Sensing);

    rig.ticks(40);
    assert_eq!(rig.ports.system.restarts, 0);
}

#[test]
fn size_mismatch_aborts_and_a_new_announcement_recovers() {
    let mut rig = idle_rig();
    let img = image(4 * CHUNK);
    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();

    // Header claims more bytes than the frame carries.
    let mut frame = Vec::new();
    frame.extend_from_slice(&0u32.to_le_bytes());
    frame.extend_from_slice(&300u32.to_le_bytes());
    frame.extend_from_slice(&img[..CHUNK]);
    let topic = rig.controller.topics().ota_chunk.to_string();
    rig.deliver(&topic, &frame);
    rig.tick();

    assert_eq!(rig.controller.ota().status(), OtaStatus::Error);
    assert_eq!(rig.last_notice()["message"], "size mismatch");
    assert_eq!(rig.controller.ota().store().live_writers(), 0);

    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();
    send_image(&mut rig, &img);
    assert_eq!(rig.controller.ota().status(), OtaStatus::Complete);
    assert_eq!(rig.controller.ota().store().times_opened(), 2);
}

#[test]
fn oversized_image_is_rejected_before_opening_flash() {
    let mut rig = idle_rig();
    rig.announce(FLASH_CAPACITY + 1, 0);
    rig.tick();

    assert_eq!(rig.controller.ota().status(), OtaStatus::Idle);
    assert_eq!(rig.controller.ota().store().times_opened(), 0);
    let last = rig.last_notice();
    assert_eq!(last["status"], "error");
    assert_eq!(last["message"], "image too large");
    assert_eq!(rig.phase(), Phase::Sleeping);
}

#[test]
fn low_battery_refuses_update() {
    let mut rig = idle_rig();
    rig.ports.power.percent = 10;
    let img = image(CHUNK);
    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();

    assert_eq!(rig.controller.ota().status(), OtaStatus::Idle);
    assert_eq!(rig.last_notice()["message"], "battery too low");
}

#[test]
fn silent_server_times_out() {
    let mut rig = idle_rig();
    rig.announce(1024, 0);
    rig.tick();
    assert!(rig.controller.ota().has_partition_handle());

    rig.advance(60_001);
    rig.tick();

    assert_eq!(rig.controller.ota().status(), OtaStatus::Error);
    assert!(!rig.controller.ota().has_partition_handle());
    assert_eq!(rig.last_notice()["message"], "no chunks received");
    assert_eq!(rig.phase(), Phase::Sensing);
}

#[test]
fn second_announcement_during_download_is_ignored() {
    let mut rig = idle_rig();
    let img = image(2 * CHUNK);
    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();
    rig.send_chunk(0, &img[..CHUNK]);
    rig.tick();
    let sent = rig.notices().len();

    rig.announce(4096, 1);
    rig.tick();
    assert_eq!(rig.notices().len(), sent);
    assert_eq!(rig.controller.ota().total_bytes(), img.len() as u32);
    assert_eq!(rig.controller.ota().received_bytes(), CHUNK as u32);
}

#[test]
fn truncated_chunk_frame_is_dropped() {
    let mut rig = idle_rig();
    let img = image(CHUNK);
    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();

    let topic = rig.controller.topics().ota_chunk.to_string();
    rig.deliver(&topic, &[0, 0, 0, 0]);
    rig.tick();
    assert_eq!(rig.controller.ota().status(), OtaStatus::Downloading);
    assert_eq!(rig.controller.ota().received_bytes(), 0);

    rig.send_chunk(0, &img);
    rig.tick();
    assert_eq!(rig.controller.ota().status(), OtaStatus::Complete);
}

#[test]
fn diagnostics_request_reports_current_phase() {
    let mut rig = idle_rig();
    let topic = rig.controller.topics().diagnostics_request.to_string();
    rig.deliver(&topic, b"");
    rig.tick();

    let resp = rig.controller.topics().diagnostics_response.to_string();
    let reports = rig.ports.channel.on_topic(&resp);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["analyzerId"], DEVICE_ID);
    assert_eq!(reports[0]["state"], "SLEEPING");
    assert_eq!(reports[0]["wifi"]["connected"], true);
    assert_eq!(reports[0]["sensors"]["humidity"], 68.0);
}

#[test]
fn malformed_announcement_is_dropped_quietly() {
    let mut rig = idle_rig();
    let topic = rig.controller.topics().ota_start.to_string();
    rig.deliver(&topic, b"{\"version\":\"1.0\"}");
    rig.deliver(&topic, b"not json");
    rig.tick();

    assert!(rig.notices().is_empty());
    assert_eq!(rig.controller.ota().status(), OtaStatus::Idle);
    assert_eq!(rig.phase(), Phase::Sleeping);

    // The queue keeps draining after a bad frame.
    let img = image(CHUNK);
    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();
    assert_eq!(rig.controller.ota().status(), OtaStatus::Downloading);
}
