//! Mock adapters for integration tests.
//!
//! Every port records what the controller did with it so tests can assert
//! on the full history without touching a radio, a broker or flash.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use brodbuddy::adapters::device_id::DeviceIdString;
use brodbuddy::adapters::flash::SimFlash;
use brodbuddy::app::controller::{Controller, Ports};
use brodbuddy::app::events::AppEvent;
use brodbuddy::app::ports::{
    ClockPort, ControlChannel, DisplayPort, EventSink, NetworkPort, PowerPort, SensorPort,
    SystemPort,
};
use brodbuddy::config::SystemConfig;
use brodbuddy::error::{CommsError, PlatformError, SensorError};
use brodbuddy::fsm::Phase;
use brodbuddy::net::InboundFrame;
use brodbuddy::ota::BootValidation;
use brodbuddy::telemetry::SampleBatch;

pub const DEVICE_ID: &str = "BB-AABBCC";
pub const FLASH_CAPACITY: u32 = 64 * 1024;

// ── Clock ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct SharedClock(Rc<Cell<u64>>);

impl SharedClock {
    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl ClockPort for SharedClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

// ── Network ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNetwork {
    pub connected: bool,
    pub fatal: bool,
    pub suspends: u32,
    pub resumes: u32,
}

impl NetworkPort for MockNetwork {
    fn is_connected(&self) -> bool {
        self.connected
    }
    fn has_fatal_error(&self) -> bool {
        self.fatal
    }
    fn rssi(&self) -> Option<i8> {
        self.connected.then_some(-58)
    }
    fn poll(&mut self, _now_ms: u64) {}
    fn suspend(&mut self) {
        self.suspends += 1;
    }
    fn resume(&mut self) {
        self.resumes += 1;
    }
}

// ── Control channel ───────────────────────────────────────────

#[derive(Default)]
pub struct MockChannel {
    pub connected: bool,
    pub fatal: bool,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    pub inbox: VecDeque<InboundFrame>,
}

impl MockChannel {
    pub fn on_topic(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| serde_json::from_slice(p).expect("published JSON"))
            .collect()
    }
}

impl ControlChannel for MockChannel {
    fn is_connected(&self) -> bool {
        self.connected
    }
    fn has_fatal_error(&self) -> bool {
        self.fatal
    }
    fn subscribe(&mut self, topic: &str) -> Result<(), CommsError> {
        if !self.connected {
            return Err(CommsError::MqttSubscribeFailed);
        }
        self.subscriptions.push(topic.to_string());
        Ok(())
    }
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), CommsError> {
        if !self.connected {
            return Err(CommsError::MqttPublishFailed);
        }
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
    fn next_message(&mut self) -> Option<InboundFrame> {
        self.inbox.pop_front()
    }
}

// ── Sensors / display / power ─────────────────────────────────

pub const READING: SampleBatch = SampleBatch {
    temperature: 24.0,
    humidity: 68.0,
    rise: 40.0,
};

pub struct MockSensors {
    pub ready: bool,
    pub fail: bool,
    pub collected: u32,
}

impl SensorPort for MockSensors {
    fn should_sample(&self, _now_ms: u64) -> bool {
        self.ready
    }
    fn collect_samples(&mut self, _now_ms: u64) -> Result<SampleBatch, SensorError> {
        if self.fail {
            return Err(SensorError::ReadFailed);
        }
        self.collected += 1;
        Ok(READING)
    }
}

#[derive(Default)]
pub struct MockDisplay {
    pub frames: Vec<(SampleBatch, u8)>,
}

impl DisplayPort for MockDisplay {
    fn render(&mut self, batch: &SampleBatch, battery_percent: u8) {
        self.frames.push((*batch, battery_percent));
    }
}

pub struct MockPower {
    pub percent: u8,
}

impl PowerPort for MockPower {
    fn is_safe_to_flash(&self) -> bool {
        self.percent >= 20
    }
    fn battery_percent(&self) -> u8 {
        self.percent
    }
}

// ── System ────────────────────────────────────────────────────

pub struct MockSystem {
    pub clock: SharedClock,
    pub pending: bool,
    pub fail_mark_valid: bool,
    pub mark_valid_calls: u32,
    pub restarts: u32,
    pub sleeps: Vec<Duration>,
}

impl SystemPort for MockSystem {
    fn restart(&mut self) {
        self.restarts += 1;
    }
    fn boot_pending_verification(&self) -> bool {
        self.pending
    }
    fn mark_running_valid(&mut self) -> Result<(), PlatformError> {
        self.mark_valid_calls += 1;
        if self.fail_mark_valid {
            return Err(PlatformError::MarkValidFailed);
        }
        self.pending = false;
        Ok(())
    }
    fn free_heap_bytes(&self) -> u32 {
        150_000
    }
    /// The clock keeps running while the loop is suspended.
    fn sleep_for(&mut self, duration: Duration) -> Result<(), PlatformError> {
        self.sleeps.push(duration);
        self.clock.advance(duration.as_millis() as u64);
        Ok(())
    }
}

// ── Event log ─────────────────────────────────────────────────

#[derive(Default)]
pub struct EventLog(pub Vec<AppEvent>);

impl EventSink for EventLog {
    fn emit(&mut self, event: &AppEvent) {
        self.0.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type MockPorts =
    Ports<SharedClock, MockNetwork, MockChannel, MockSensors, MockDisplay, MockPower, MockSystem>;

/// Controller plus mock ports, advanced one tick at a time.
pub struct Rig {
    pub controller: Controller<SimFlash>,
    pub ports: MockPorts,
    pub events: EventLog,
    clock: SharedClock,
    tick_ms: u64,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(config: SystemConfig) -> Self {
        Self::with_boot_pending(config, false)
    }

    pub fn with_boot_pending(config: SystemConfig, pending: bool) -> Self {
        let clock = SharedClock::default();
        let system = MockSystem {
            clock: clock.clone(),
            pending,
            fail_mark_valid: false,
            mark_valid_calls: 0,
            restarts: 0,
            sleeps: Vec::new(),
        };
        let boot = BootValidation::read(&system);
        let mut id = DeviceIdString::new();
        id.push_str(DEVICE_ID).unwrap();
        let tick_ms = u64::from(config.tick_interval_ms);
        let controller = Controller::new(config, SimFlash::new(FLASH_CAPACITY), id, boot, 0);
        let ports = Ports {
            clock: clock.clone(),
            network: MockNetwork {
                connected: true,
                ..MockNetwork::default()
            },
            channel: MockChannel {
                connected: true,
                ..MockChannel::default()
            },
            sensors: MockSensors {
                ready: true,
                fail: false,
                collected: 0,
            },
            display: MockDisplay::default(),
            power: MockPower { percent: 80 },
            system,
        };
        Self {
            controller,
            ports,
            events: EventLog::default(),
            clock,
            tick_ms,
        }
    }

    /// Awake configuration: the device idles in `Sleeping` without
    /// suspending, so OTA traffic can flow at any time.
    pub fn awake() -> Self {
        Self::new(SystemConfig {
            low_power_mode: false,
            ..SystemConfig::default()
        })
    }

    pub fn phase(&self) -> Phase {
        self.controller.phase()
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn advance(&self, ms: u64) {
        self.clock.advance(ms);
    }

    /// One controller tick, then one tick interval passes.
    pub fn tick(&mut self) {
        self.controller.tick(&mut self.ports, &mut self.events);
        self.clock.advance(self.tick_ms);
    }

    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Tick until `phase` is current; panics after `max` ticks.
    pub fn run_until(&mut self, phase: Phase, max: usize) {
        for _ in 0..max {
            if self.phase() == phase {
                return;
            }
            self.tick();
        }
        assert_eq!(self.phase(), phase, "phase not reached in {max} ticks");
    }

    pub fn deliver(&mut self, topic: &str, payload: &[u8]) {
        let frame = InboundFrame::new(topic, payload).expect("frame fits");
        self.ports.channel.inbox.push_back(frame);
    }

    pub fn announce(&mut self, size: u32, crc: u32) {
        let json = format!(r#"{{"version":"1.2.3","size":{size},"crc32":{crc}}}"#);
        let topic = self.controller.topics().ota_start.to_string();
        self.deliver(&topic, json.as_bytes());
    }

    pub fn send_chunk(&mut self, index: u32, data: &[u8]) {
        let frame = brodbuddy::net::message::encode_chunk(index, data);
        let topic = self.controller.topics().ota_chunk.to_string();
        self.deliver(&topic, &frame);
    }

    /// Status-topic notices published so far.
    pub fn notices(&self) -> Vec<serde_json::Value> {
        self.ports
            .channel
            .on_topic(self.controller.topics().ota_status.as_str())
    }

    pub fn last_notice(&self) -> serde_json::Value {
        self.notices().pop().expect("at least one notice")
    }

    pub fn phases_entered(&self) -> Vec<Phase> {
        self.events
            .0
            .iter()
            .filter_map(|e| match e {
                AppEvent::PhaseChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }
}

/// Deterministic test image.
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
