//! MQTT control channel.
//!
//! The broker connection is serviced by its own thread (the ESP-IDF MQTT
//! event loop).  That thread never touches OTA state: it copies every
//! received message into a bounded `embassy-sync` channel which the control
//! loop drains through [`ControlChannel::next_message`].
//!
//! ```text
//! ┌──────────────┐  InboundFrame  ┌──────────────┐
//! │  mqtt-poll   │──────────────▶│ Control Loop │
//! │  (thread)    │  connected?    │  (tick)      │
//! └──────────────┘──────────────▶└──────────────┘
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::net::message::InboundFrame;

/// Frames buffered between the MQTT thread and the control loop.
pub const INBOX_DEPTH: usize = 4;

/// State shared between the MQTT event thread and the control loop.
pub struct MqttShared {
    inbox: Channel<CriticalSectionRawMutex, InboundFrame, INBOX_DEPTH>,
    connected: AtomicBool,
    fatal: AtomicBool,
}

impl MqttShared {
    pub const fn new() -> Self {
        Self {
            inbox: Channel::new(),
            connected: AtomicBool::new(false),
            fatal: AtomicBool::new(false),
        }
    }

    pub fn set_connected(&self, up: bool) {
        self.connected.store(up, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_fatal(&self) {
        self.fatal.store(true, Ordering::Release);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    /// Queue a received message.  Returns `false` (and drops it) if the
    /// message does not fit a frame or the inbox stayed full.
    pub fn push(&self, topic: &str, payload: &[u8]) -> bool {
        let Some(frame) = InboundFrame::new(topic, payload) else {
            warn!("mqtt: dropping oversized message on {} ({} bytes)", topic, payload.len());
            return false;
        };
        let mut frame = frame;
        for _ in 0..PUSH_RETRIES {
            match self.inbox.try_send(frame) {
                Ok(()) => return true,
                Err(embassy_sync::channel::TrySendError::Full(f)) => {
                    frame = f;
                    backoff();
                }
            }
        }
        warn!("mqtt: inbox full, dropping message on {}", topic);
        false
    }

    pub fn pop(&self) -> Option<InboundFrame> {
        self.inbox.try_receive().ok()
    }

    pub fn pending(&self) -> usize {
        self.inbox.len()
    }
}

impl Default for MqttShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Push attempts before a frame is dropped.  The MQTT thread waits between
/// attempts so a busy control loop throttles the broker through TCP.
#[cfg(target_os = "espidf")]
const PUSH_RETRIES: u32 = 50;
#[cfg(not(target_os = "espidf"))]
const PUSH_RETRIES: u32 = 1;

#[cfg(target_os = "espidf")]
fn backoff() {
    std::thread::sleep(core::time::Duration::from_millis(10));
}

#[cfg(not(target_os = "espidf"))]
fn backoff() {}

/// The single instance used by the firmware binary.
pub static MQTT_SHARED: MqttShared = MqttShared::new();

// ───────────────────────────────────────────────────────────────
// ESP-IDF client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::MqttChannel;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::mqtt::client::{
        Details, EspMqttClient, EventPayload, MqttClientConfiguration, QoS,
    };
    use esp_idf_sys::EspError;
    use log::{info, warn};

    use super::MqttShared;
    use crate::app::ports::ControlChannel;
    use crate::config::ConnectionConfig;
    use crate::error::CommsError;
    use crate::net::message::{InboundFrame, MAX_FRAME_LEN};

    pub struct MqttChannel {
        client: EspMqttClient<'static>,
        shared: &'static MqttShared,
    }

    impl MqttChannel {
        /// Connect to the broker and start the event thread.
        pub fn start(
            conn_cfg: &ConnectionConfig,
            client_id: &str,
            shared: &'static MqttShared,
        ) -> Result<Self, EspError> {
            let conf = MqttClientConfiguration {
                client_id: Some(client_id),
                username: conn_cfg.mqtt_username,
                password: conn_cfg.mqtt_password,
                buffer_size: MAX_FRAME_LEN + 256,
                ..Default::default()
            };
            let (client, mut conn) = EspMqttClient::new(conn_cfg.mqtt_url, &conf)?;

            let spawned = std::thread::Builder::new()
                .name("mqtt-poll".into())
                .stack_size(8192)
                .spawn(move || {
                    while let Ok(event) = conn.next() {
                        match event.payload() {
                            EventPayload::Connected(_) => {
                                info!("mqtt: connected");
                                shared.set_connected(true);
                            }
                            EventPayload::Disconnected => {
                                warn!("mqtt: disconnected");
                                shared.set_connected(false);
                            }
                            EventPayload::Received {
                                topic: Some(topic),
                                data,
                                details: Details::Complete,
                                ..
                            } => {
                                shared.push(topic, data);
                            }
                            EventPayload::Received { details, .. } => {
                                warn!("mqtt: fragmented message ignored ({:?})", details);
                            }
                            EventPayload::Error(e) => {
                                warn!("mqtt: {:?}", e);
                            }
                            _ => {}
                        }
                    }
                    warn!("mqtt: connection closed");
                    shared.set_connected(false);
                    shared.set_fatal();
                });
            if let Err(e) = spawned {
                warn!("mqtt: cannot spawn event thread: {}", e);
                shared.set_fatal();
            }

            Ok(Self { client, shared })
        }
    }

    impl ControlChannel for MqttChannel {
        fn is_connected(&self) -> bool {
            self.shared.is_connected()
        }

        fn has_fatal_error(&self) -> bool {
            self.shared.is_fatal()
        }

        fn subscribe(&mut self, topic: &str) -> Result<(), CommsError> {
            self.client
                .subscribe(topic, QoS::AtLeastOnce)
                .map(|_| ())
                .map_err(|e| {
                    warn!("mqtt: subscribe {} failed: {:?}", topic, e);
                    CommsError::MqttSubscribeFailed
                })
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), CommsError> {
            self.client
                .enqueue(topic, QoS::AtMostOnce, false, payload)
                .map(|_| ())
                .map_err(|e| {
                    warn!("mqtt: publish {} failed: {:?}", topic, e);
                    CommsError::MqttPublishFailed
                })
        }

        fn next_message(&mut self) -> Option<InboundFrame> {
            self.shared.pop()
        }
    }
}
