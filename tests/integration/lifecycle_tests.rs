//! Lifecycle phase sequencing against mock adapters.

use std::time::Duration;

use brodbuddy::app::events::AppEvent;
use brodbuddy::config::SystemConfig;
use brodbuddy::fsm::Phase;
use brodbuddy::ota::crc32;

use crate::mock_hw::*;

#[test]
fn boot_runs_one_full_cycle_then_sleeps() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.run_until(Phase::Sleeping, 20);

    assert_eq!(rig.events.0[0], AppEvent::Started(Phase::Boot));
    assert_eq!(
        rig.phases_entered(),
        vec![
            Phase::ConnectingNetwork,
            Phase::ConnectingControlChannel,
            Phase::Sensing,
            Phase::UpdatingDisplay,
            Phase::PublishingData,
            Phase::Sleeping,
        ]
    );
    assert_eq!(rig.ports.display.frames, vec![(READING, 80)]);
    assert!(rig.events.0.contains(&AppEvent::TelemetryPublished { ok: true }));
    assert_eq!(rig.controller.last_reading(), Some(READING));
}

#[test]
fn telemetry_uses_broker_schema() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.run_until(Phase::Sleeping, 20);

    let topic = rig.controller.topics().telemetry.to_string();
    assert_eq!(topic, format!("analyzer/{DEVICE_ID}/telemetry"));
    let reports = rig.ports.channel.on_topic(&topic);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["analyzerId"], DEVICE_ID);
    assert_eq!(reports[0]["temperature"], 24.0);
    assert_eq!(reports[0]["rise"], 40.0);
}

#[test]
fn low_power_sleep_suspends_radio_and_reconnects() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.run_until(Phase::Sleeping, 20);
    let before = rig.now();
    rig.tick();

    assert_eq!(rig.ports.system.sleeps, vec![Duration::from_secs(300)]);
    assert_eq!(rig.ports.network.suspends, 1);
    assert_eq!(rig.ports.network.resumes, 1);
    assert_eq!(rig.phase(), Phase::ConnectingNetwork);
    assert!(rig.now() >= before + 300_000);

    // The sleep window does not count against the connect timeout.
    rig.tick();
    assert_eq!(rig.phase(), Phase::ConnectingControlChannel);
    rig.run_until(Phase::Sleeping, 20);
    assert_eq!(rig.ports.sensors.collected, 2);
}

#[test]
fn awake_mode_resamples_after_interval() {
    let mut rig = Rig::awake();
    rig.run_until(Phase::Sleeping, 20);
    rig.ticks(10);
    assert_eq!(rig.phase(), Phase::Sleeping);
    assert!(rig.ports.system.sleeps.is_empty());

    rig.advance(300_000);
    rig.tick();
    assert_eq!(rig.phase(), Phase::Sensing);
    rig.run_until(Phase::Sleeping, 20);
    assert_eq!(rig.ports.sensors.collected, 2);
}

#[test]
fn update_in_flight_prevents_sleep() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.run_until(Phase::PublishingData, 20);

    let img = image(512);
    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();
    assert_eq!(rig.phase(), Phase::ApplyingUpdate);

    rig.ticks(10);
    assert!(rig.ports.system.sleeps.is_empty());
    assert_eq!(rig.ports.network.suspends, 0);
    assert_eq!(rig.phase(), Phase::ApplyingUpdate);
}

#[test]
fn awake_download_outlasts_sensing_interval() {
    let mut rig = Rig::awake();
    rig.run_until(Phase::Sleeping, 20);
    let img = image(20 * 64);
    rig.announce(img.len() as u32, crc32(&img));
    rig.tick();
    assert_eq!(rig.phase(), Phase::ApplyingUpdate);
    let entered = rig.phases_entered().len();

    // One chunk every 20 s stays inside the per-chunk timeout while the
    // whole transfer runs past the sensing interval.
    let interval = u64::from(rig.controller.config().sensing_interval_ms);
    for (i, part) in img.chunks(64).enumerate() {
        rig.advance(19_900);
        rig.send_chunk(i as u32, part);
        rig.tick();
        assert_eq!(rig.phase(), Phase::ApplyingUpdate);
    }

    assert!(rig.now() > interval + 1);
    assert_eq!(rig.controller.ota().received_bytes(), img.len() as u32);
    assert!(rig.ports.system.sleeps.is_empty());
    assert_eq!(rig.ports.network.suspends, 0);
    assert!(rig.phases_entered()[entered..].is_empty());
}

#[test]
fn sensor_failure_stays_in_sensing() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.ports.sensors.fail = true;
    rig.run_until(Phase::Sensing, 20);
    rig.ticks(5);

    assert_eq!(rig.phase(), Phase::Sensing);
    assert!(rig.controller.last_reading().is_none());
    let topic = rig.controller.topics().telemetry.to_string();
    assert!(rig.ports.channel.on_topic(&topic).is_empty());
}

#[test]
fn fatal_network_error_restarts_after_delay() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.ports.network.connected = false;
    rig.ports.network.fatal = true;
    rig.run_until(Phase::Error, 5);

    rig.ticks(45);
    assert_eq!(rig.ports.system.restarts, 0);
    rig.ticks(10);
    assert_eq!(rig.ports.system.restarts, 1);
    rig.ticks(60);
    assert_eq!(rig.ports.system.restarts, 1);
}

#[test]
fn network_connect_times_out() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.ports.network.connected = false;
    rig.run_until(Phase::Error, 320);
    assert!(rig.now() >= 30_000);
}

#[test]
fn channel_failure_is_fatal() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.ports.channel.connected = false;
    rig.ports.channel.fatal = true;
    rig.run_until(Phase::Error, 5);
    assert!(
        rig.phases_entered()
            .contains(&Phase::ConnectingControlChannel)
    );
}

#[test]
fn link_loss_while_waiting_for_channel_goes_back_to_network() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.ports.channel.connected = false;
    rig.run_until(Phase::ConnectingControlChannel, 5);

    rig.ports.network.connected = false;
    rig.tick();
    assert_eq!(rig.phase(), Phase::ConnectingNetwork);
}

#[test]
fn pending_image_is_confirmed_once() {
    let mut rig = Rig::with_boot_pending(SystemConfig::default(), true);
    assert!(rig.controller.boot_pending());
    rig.run_until(Phase::Sensing, 10);

    assert!(!rig.controller.boot_pending());
    assert_eq!(rig.ports.system.mark_valid_calls, 1);

    // Next cycle passes through the channel phase again.
    rig.run_until(Phase::Sleeping, 20);
    rig.tick();
    rig.run_until(Phase::Sleeping, 20);
    assert_eq!(rig.ports.system.mark_valid_calls, 1);
    let confirmed = rig
        .events
        .0
        .iter()
        .filter(|e| **e == AppEvent::FirmwareConfirmed)
        .count();
    assert_eq!(confirmed, 1);
}

#[test]
fn verified_image_is_never_marked() {
    let mut rig = Rig::new(SystemConfig::default());
    rig.run_until(Phase::Sleeping, 20);
    assert_eq!(rig.ports.system.mark_valid_calls, 0);
    assert!(!rig.events.0.contains(&AppEvent::FirmwareConfirmed));
}

#[test]
fn failed_confirmation_is_retried_next_cycle() {
    let mut rig = Rig::with_boot_pending(SystemConfig::default(), true);
    rig.ports.system.fail_mark_valid = true;
    rig.run_until(Phase::Sleeping, 20);
    assert_eq!(rig.ports.system.mark_valid_calls, 1);
    assert!(rig.controller.boot_pending());

    rig.ports.system.fail_mark_valid = false;
    rig.tick();
    rig.run_until(Phase::Sensing, 10);
    assert_eq!(rig.ports.system.mark_valid_calls, 2);
    assert!(!rig.controller.boot_pending());
    assert!(rig.events.0.contains(&AppEvent::FirmwareConfirmed));
}
