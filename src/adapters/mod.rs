//! Adapters - concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements       | Connects to                      |
//! |-------------|------------------|----------------------------------|
//! | `battery`   | PowerPort        | ADC1 oneshot (battery divider)   |
//! | `device_id` | -                | provisioned GUID or eFuse MAC    |
//! | `display`   | DisplayPort      | Serial log (panel stand-in)      |
//! | `flash`     | FirmwareStore    | `esp-ota` A/B slots / in-memory  |
//! | `log_sink`  | EventSink        | Serial log output                |
//! | `mqtt`      | ControlChannel   | ESP-IDF MQTT client              |
//! | `platform`  | SystemPort       | Restart, rollback, light sleep   |
//! | `sensors`   | SensorPort       | Climate + time-of-flight sensors |
//! | `time`      | -                | ESP32 high-resolution timer      |
//! | `wifi`      | NetworkPort      | ESP-IDF WiFi STA                 |

pub mod battery;
pub mod device_id;
pub mod display;
pub mod flash;
pub mod log_sink;
pub mod mqtt;
pub mod platform;
pub mod sensors;
pub mod time;
pub mod wifi;
