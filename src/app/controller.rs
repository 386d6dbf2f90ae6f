//! Orchestration loop - the hexagonal core.
//!
//! [`Controller`] owns the lifecycle tracker, the OTA manager and the
//! message router.  Every collaborator arrives through [`Ports`], so the
//! whole loop runs against mock adapters in tests.
//!
//! ```text
//!  ControlChannel ──▶ ┌─────────────────────────────┐ ──▶ EventSink
//!   NetworkPort   ──▶ │         Controller           │
//!   SensorPort    ──▶ │  Lifecycle · OtaManager ·    │ ──▶ DisplayPort
//!   PowerPort     ──▶ │  MessageRouter · Boot check  │ ──▶ SystemPort
//!                     └─────────────────────────────┘
//! ```
//!
//! One [`Controller::tick`] is:
//!
//! 1. control-channel edge handling (resubscribe, resume OTA)
//! 2. drain inbound messages into the OTA manager
//! 3. OTA timers (stall, initial timeout, reboot)
//! 4. network upkeep
//! 5. the handler for the current [`Phase`]

use log::{debug, info, warn};

use crate::adapters::device_id::DeviceIdString;
use crate::config::SystemConfig;
use crate::error::{Error, Result};
use crate::fsm::{Lifecycle, Phase};
use crate::net::{InboundFrame, InboundMessage, MessageRouter, Topics};
use crate::ota::{BootValidation, OtaManager, OtaNotice, OtaPoll, OtaTiming};
use crate::telemetry::{self, DiagnosticsReport, SampleBatch, TelemetryReport};

use super::events::AppEvent;
use super::ports::{
    ClockPort, ControlChannel, DisplayPort, EventSink, FirmwareStore, NetworkPort, NoticeSink,
    PowerPort, SensorPort, SystemPort,
};

/// Upper bound on messages handled in one tick.
const MAX_MESSAGES_PER_TICK: usize = 16;

// ───────────────────────────────────────────────────────────────
// Ports bundle
// ───────────────────────────────────────────────────────────────

/// Every driven adapter the controller talks to.
pub struct Ports<T, N, C, S, D, P, Y> {
    pub clock: T,
    pub network: N,
    pub channel: C,
    pub sensors: S,
    pub display: D,
    pub power: P,
    pub system: Y,
}

// ───────────────────────────────────────────────────────────────
// Status publisher
// ───────────────────────────────────────────────────────────────

/// Forwards OTA notices to the status topic.
struct StatusPublisher<'a, C: ControlChannel> {
    channel: &'a mut C,
    topic: &'a str,
}

impl<C: ControlChannel> NoticeSink for StatusPublisher<'_, C> {
    fn notify(&mut self, notice: &OtaNotice) {
        let payload = match notice.to_json() {
            Ok(p) => p,
            Err(e) => {
                warn!("OTA: cannot encode status notice: {}", e);
                return;
            }
        };
        if let Err(e) = self.channel.publish(self.topic, &payload) {
            warn!("OTA: status notice not sent: {}", e);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

pub struct Controller<F: FirmwareStore> {
    config: SystemConfig,
    lifecycle: Lifecycle,
    ota: OtaManager<F>,
    router: MessageRouter,
    boot: BootValidation,
    device_id: DeviceIdString,
    last_reading: Option<SampleBatch>,
    channel_up: bool,
    started: bool,
    restart_requested: bool,
}

impl<F: FirmwareStore> Controller<F> {
    /// `boot` is the bootloader verdict read once at process start.
    pub fn new(
        config: SystemConfig,
        store: F,
        device_id: DeviceIdString,
        boot: BootValidation,
        now_ms: u64,
    ) -> Self {
        let ota = OtaManager::new(store, OtaTiming::from(&config));
        let router = MessageRouter::new(Topics::new(device_id.as_str()));
        Self {
            config,
            lifecycle: Lifecycle::new(now_ms),
            ota,
            router,
            boot,
            device_id,
            last_reading: None,
            channel_up: false,
            started: false,
            restart_requested: false,
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    pub fn tick<T, N, C, S, D, P, Y>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        sink: &mut impl EventSink,
    ) where
        T: ClockPort,
        N: NetworkPort,
        C: ControlChannel,
        S: SensorPort,
        D: DisplayPort,
        P: PowerPort,
        Y: SystemPort,
    {
        let now = ports.clock.now_ms();
        if !self.started {
            self.started = true;
            info!("controller: started as {}", self.device_id);
            sink.emit(&AppEvent::Started(self.lifecycle.current()));
        }
        let phase_before = self.lifecycle.current();
        let ota_before = self.ota.status();

        // 1. Control-channel edges
        self.track_channel(ports, now);

        // 2. Inbound messages
        self.drain_messages(ports, now);

        // 3. OTA timers
        let topic = self.router.topics().ota_status.as_str();
        let mut status = StatusPublisher {
            channel: &mut ports.channel,
            topic,
        };
        if self.ota.poll(now, &mut status) == OtaPoll::RebootNow {
            info!("controller: restarting into new firmware");
            ports.system.restart();
        }

        // 4. Network upkeep
        ports.network.poll(now);

        // 5. Phase handler
        match self.lifecycle.current() {
            Phase::Boot => self.go(Phase::ConnectingNetwork, now),
            Phase::ConnectingNetwork => self.on_connecting_network(ports, now),
            Phase::ConnectingControlChannel => self.on_connecting_channel(ports, now, sink),
            Phase::Sensing => {
                if let Err(e) = self.on_sensing(ports, now) {
                    warn!("controller: sampling failed: {}", e);
                }
            }
            Phase::UpdatingDisplay => self.on_updating_display(ports, now),
            Phase::PublishingData => self.on_publishing(ports, now, sink),
            Phase::Sleeping => self.on_sleeping(ports, now),
            Phase::ApplyingUpdate => self.on_applying_update(now),
            Phase::Error => self.on_error(ports, now),
        }

        let phase_after = self.lifecycle.current();
        if phase_after != phase_before {
            sink.emit(&AppEvent::PhaseChanged {
                from: phase_before,
                to: phase_after,
            });
        }
        let ota_after = self.ota.status();
        if ota_after != ota_before {
            sink.emit(&AppEvent::OtaStatusChanged {
                from: ota_before,
                to: ota_after,
            });
        }
    }

    fn go(&mut self, next: Phase, now_ms: u64) {
        self.lifecycle.transition_to(next, now_ms);
    }

    // ── Control channel ───────────────────────────────────────

    fn track_channel<T, N, C: ControlChannel, S, D, P, Y>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
    ) {
        let connected = ports.channel.is_connected();
        if connected == self.channel_up {
            return;
        }
        if !connected {
            warn!("controller: control channel lost");
            self.channel_up = false;
            return;
        }

        // Subscriptions do not survive a reconnect.
        for t in self.router.topics().subscriptions() {
            if let Err(e) = ports.channel.subscribe(t) {
                warn!("controller: subscribe {} failed: {}, retrying next tick", t, e);
                return;
            }
        }
        self.channel_up = true;
        info!("controller: control channel up, subscriptions restored");

        let topic = self.router.topics().ota_status.as_str();
        let mut status = StatusPublisher {
            channel: &mut ports.channel,
            topic,
        };
        self.ota.on_reconnect(now, &mut status);
    }

    fn drain_messages<T, N: NetworkPort, C: ControlChannel, S, D, P: PowerPort, Y: SystemPort>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
    ) {
        for _ in 0..MAX_MESSAGES_PER_TICK {
            let Some(frame) = ports.channel.next_message() else {
                return;
            };
            match self.dispatch(ports, &frame, now) {
                Ok(()) => {}
                Err(e @ Error::Comms(_)) => {
                    warn!("controller: reply to {} failed: {}", frame.topic, e);
                }
                // Decode and OTA failures are already logged and reported
                // on the status topic.
                Err(e) => debug!("controller: message on {} dropped: {}", frame.topic, e),
            }
        }
    }

    fn dispatch<T, N: NetworkPort, C: ControlChannel, S, D, P: PowerPort, Y: SystemPort>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        frame: &InboundFrame,
        now: u64,
    ) -> Result<()> {
        let msg = self.router.route(frame.topic.as_str(), &frame.payload)?;
        let topic = self.router.topics().ota_status.as_str();
        let mut status = StatusPublisher {
            channel: &mut ports.channel,
            topic,
        };
        match msg {
            InboundMessage::Announcement(ann) => {
                self.ota.start_update(&ann, &ports.power, now, &mut status)?;
            }
            InboundMessage::Chunk(chunk) => {
                self.ota.process_chunk(&chunk, now, &mut status)?;
            }
            InboundMessage::DiagnosticsRequest => self.publish_diagnostics(ports, now)?,
            InboundMessage::Other => {}
        }
        Ok(())
    }

    fn publish_diagnostics<T, N: NetworkPort, C: ControlChannel, S, D, P, Y: SystemPort>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
    ) -> Result<()> {
        let report = DiagnosticsReport::new(
            &self.device_id,
            now,
            ports.system.free_heap_bytes(),
            self.lifecycle.current(),
            ports.network.rssi(),
            self.last_reading,
        );
        let payload = telemetry::to_json(&report)?;
        ports
            .channel
            .publish(self.router.topics().diagnostics_response.as_str(), &payload)?;
        info!("controller: diagnostics sent");
        Ok(())
    }

    // ── Phase handlers ────────────────────────────────────────

    fn on_connecting_network<T, N: NetworkPort, C, S, D, P, Y>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
    ) {
        if ports.network.is_connected() {
            self.go(Phase::ConnectingControlChannel, now);
        } else if ports.network.has_fatal_error() {
            warn!("controller: network failed permanently");
            self.go(Phase::Error, now);
        } else if self
            .lifecycle
            .should_transition(self.config.network_connect_timeout(), now)
        {
            warn!("controller: network not up after {:?}", self.config.network_connect_timeout());
            self.go(Phase::Error, now);
        }
    }

    fn on_connecting_channel<T, N: NetworkPort, C: ControlChannel, S, D, P, Y: SystemPort>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
        sink: &mut impl EventSink,
    ) {
        if ports.channel.is_connected() {
            match self.boot.confirm(&mut ports.system) {
                Ok(true) => sink.emit(&AppEvent::FirmwareConfirmed),
                // On failure it stays pending and is retried on the next
                // pass through here.
                Ok(false) | Err(_) => {}
            }
            self.go(Phase::Sensing, now);
        } else if ports.channel.has_fatal_error() {
            warn!("controller: control channel failed permanently");
            self.go(Phase::Error, now);
        } else if !ports.network.is_connected() {
            self.go(Phase::ConnectingNetwork, now);
        } else if self
            .lifecycle
            .should_transition(self.config.network_connect_timeout(), now)
        {
            warn!("controller: control channel not up after {:?}", self.config.network_connect_timeout());
            self.go(Phase::Error, now);
        }
    }

    fn on_sensing<T, N, C, S: SensorPort, D, P, Y>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
    ) -> Result<()> {
        if !ports.sensors.should_sample(now) {
            return Ok(());
        }
        let batch = ports.sensors.collect_samples(now)?;
        self.last_reading = Some(batch);
        self.go(Phase::UpdatingDisplay, now);
        Ok(())
    }

    fn on_updating_display<T, N, C, S, D: DisplayPort, P: PowerPort, Y>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
    ) {
        if let Some(batch) = self.last_reading {
            ports.display.render(&batch, ports.power.battery_percent());
        }
        self.go(Phase::PublishingData, now);
    }

    fn on_publishing<T, N, C: ControlChannel, S, D, P, Y>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
        sink: &mut impl EventSink,
    ) {
        if let Some(batch) = self.last_reading {
            let report = TelemetryReport::new(&self.device_id, now, &batch);
            let sent = telemetry::to_json(&report).and_then(|payload| {
                ports
                    .channel
                    .publish(self.router.topics().telemetry.as_str(), &payload)
            });
            if let Err(e) = sent {
                warn!("controller: telemetry not sent: {}", e);
            }
            sink.emit(&AppEvent::TelemetryPublished { ok: sent.is_ok() });
        }

        // Sleeping would drop the connection still delivering chunks.
        if self.update_active() {
            self.go(Phase::ApplyingUpdate, now);
        } else {
            self.go(Phase::Sleeping, now);
        }
    }

    fn on_sleeping<T: ClockPort, N: NetworkPort, C, S, D, P, Y: SystemPort>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
    ) {
        if self.update_active() {
            info!("controller: update running, sleep cancelled");
            self.go(Phase::ApplyingUpdate, now);
            return;
        }
        if !self.config.low_power_mode {
            if self.lifecycle.should_transition(self.config.sensing_interval(), now) {
                self.go(Phase::Sensing, now);
            }
            return;
        }

        ports.network.suspend();
        if let Err(e) = ports.system.sleep_for(self.config.sleep_window()) {
            warn!("controller: sleep failed: {}", e);
        }
        ports.network.resume();
        // The clock moved while the loop was suspended.
        let woke = ports.clock.now_ms();
        self.go(Phase::ConnectingNetwork, woke);
    }

    fn on_applying_update(&mut self, now: u64) {
        if !self.update_active() {
            info!("controller: update finished with {:?}, back to sensing", self.ota.status());
            self.go(Phase::Sensing, now);
        }
    }

    fn on_error<T, N, C, S, D, P, Y: SystemPort>(
        &mut self,
        ports: &mut Ports<T, N, C, S, D, P, Y>,
        now: u64,
    ) {
        if self.restart_requested {
            return;
        }
        if self
            .lifecycle
            .should_transition(self.config.error_restart_delay(), now)
        {
            warn!("controller: restarting after error");
            self.restart_requested = true;
            ports.system.restart();
        }
    }

    /// A session holds the partition or a reboot into the new image is due.
    fn update_active(&self) -> bool {
        self.ota.is_in_progress() || self.ota.is_reboot_pending()
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.lifecycle.current()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn ota(&self) -> &OtaManager<F> {
        &self.ota
    }

    pub fn topics(&self) -> &Topics {
        self.router.topics()
    }

    pub fn boot_pending(&self) -> bool {
        self.boot.is_pending()
    }

    pub fn last_reading(&self) -> Option<SampleBatch> {
        self.last_reading
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }
}
