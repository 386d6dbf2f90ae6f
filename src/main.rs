//! BrodBuddy firmware - main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiAdapter   MqttChannel   SensorHub   LogDisplay            │
//! │  (Network)     (Control)     (Sensor)    (Display)             │
//! │  BatteryGauge  EspPlatform   EspFirmwareStore  LogEventSink    │
//! │  (Power)       (System)      (FirmwareStore)   (EventSink)     │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Controller (pure logic)                   │    │
//! │  │  Lifecycle · OtaManager · MessageRouter                │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::info;

use brodbuddy::adapters::battery::{AdcVoltage, BatteryGauge};
use brodbuddy::adapters::device_id;
use brodbuddy::adapters::display::LogDisplay;
use brodbuddy::adapters::flash::EspFirmwareStore;
use brodbuddy::adapters::log_sink::LogEventSink;
use brodbuddy::adapters::mqtt::{MQTT_SHARED, MqttChannel};
use brodbuddy::adapters::platform::EspPlatform;
use brodbuddy::adapters::sensors::SensorHub;
#[cfg(feature = "synthetic-sensors")]
use brodbuddy::adapters::sensors::SyntheticSource;
#[cfg(not(feature = "synthetic-sensors"))]
use brodbuddy::adapters::sensors::UnfittedSource;
use brodbuddy::adapters::time::MonotonicClock;
use brodbuddy::adapters::wifi::{self, Link, WifiAdapter};
use brodbuddy::app::controller::{Controller, Ports};
use brodbuddy::app::ports::NetworkPort;
use brodbuddy::config::{ConnectionConfig, SystemConfig};
use brodbuddy::diagnostics::{self, HEALTH_LOG_INTERVAL_MS, RuntimeMetrics};
use brodbuddy::error::Error as FirmwareError;
use brodbuddy::ota::BootValidation;

/// ADC1 channel wired to the battery divider (GPIO1 on the S3).
const BATTERY_ADC_CHANNEL: u32 = 0;

/// Minimum spacing between two sensor passes.
const SENSOR_INTERVAL_MS: u64 = 15_000;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_sys::link_patches();
    esp_idf_logger::init()?;
    diagnostics::install_panic_handler();

    info!("╔══════════════════════════════════════╗");
    info!("║  BrodBuddy v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = SystemConfig::default();
    config.validate().map_err(FirmwareError::from)?;
    let conn = ConnectionConfig::from_build_env();
    wifi::validate_ssid(conn.wifi_ssid).map_err(|e| anyhow::anyhow!("{}", e))?;
    wifi::validate_password(conn.wifi_password).map_err(|e| anyhow::anyhow!("{}", e))?;

    let id = device_id::resolve(conn.analyzer_id, &device_id::read_mac());
    info!("analyzer id {}", id);

    // ── 2. Platform + boot verdict ────────────────────────────
    let platform = EspPlatform::new();
    let boot = BootValidation::read(&platform);

    // ── 3. Adapters ───────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let link = Link::new(peripherals.modem, sys_loop, Some(nvs), conn.wifi_ssid, conn.wifi_password)?;
    let network = WifiAdapter::new(link, wifi::DEFAULT_MAX_ATTEMPTS);
    let channel = MqttChannel::start(&conn, id.as_str(), &MQTT_SHARED)?;

    let adc = AdcVoltage::new(BATTERY_ADC_CHANNEL)
        .map_err(|rc| anyhow::anyhow!("battery ADC init failed (rc={})", rc))?;
    let mut power = BatteryGauge::new(adc, config.min_battery_percent);
    power.refresh();

    #[cfg(feature = "synthetic-sensors")]
    let source = {
        log::warn!("sensors: synthetic source, telemetry is simulated");
        SyntheticSource::new()
    };
    #[cfg(not(feature = "synthetic-sensors"))]
    let source = UnfittedSource;
    let sensors = SensorHub::new(source, SENSOR_INTERVAL_MS);

    let clock = MonotonicClock::new();
    let mut ports = Ports {
        clock,
        network,
        channel,
        sensors,
        display: LogDisplay::new(),
        power,
        system: platform,
    };

    // ── 4. Controller ─────────────────────────────────────────
    let tick = config.tick_interval();
    let mut controller = Controller::new(
        config,
        EspFirmwareStore::new(),
        id.clone(),
        boot,
        ports.clock.now_ms(),
    );
    let mut sink = LogEventSink::new();

    info!("entering control loop (tick {} ms)", tick.as_millis());
    let mut cycles: u64 = 0;
    let mut last_health_ms = 0u64;
    loop {
        let now = ports.clock.now_ms();
        ports.power.poll(now);
        controller.tick(&mut ports, &mut sink);
        cycles += 1;

        if now.saturating_sub(last_health_ms) >= HEALTH_LOG_INTERVAL_MS {
            last_health_ms = now;
            let ota = controller.ota();
            RuntimeMetrics::collect(
                now / 1_000,
                cycles,
                ports.network.rssi(),
                ota.status(),
                ota.progress(),
            )
            .log();
        }

        std::thread::sleep(tick);
    }
}
