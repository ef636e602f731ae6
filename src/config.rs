use crate::display::DisplayKind;
use crate::geo::{FrameModel, LocalFrame};
use crate::link::Credentials;
use crate::mqtt::BrokerSettings;
use crate::node::Guards;
use crate::payload::{Encoder, KeyStyle};
use crate::probe::ProbeSettings;
use crate::record::Layout;
use crate::retry::RetryPolicy;
use crate::topic::{self, TopicName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Consumer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Plain,
    Tls,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Device ID (used as DHCP hostname and carried in the telemetry payload)
    pub device_id: &'static str,

    // Whether this node publishes telemetry or subscribes to it
    pub role: Role,

    // Wi-Fi SSID to connect to
    pub wifi_ssid: &'static str,

    // Wi-Fi pre-shared key (password)
    pub wifi_psk: &'static str,

    // MQTT broker hostname or IP address
    pub mqtt_hostname: &'static str,

    // MQTT port (usually 1883 or 8883 for TLS)
    pub mqtt_port: u16,

    // MQTT client identifier, ThingSpeak hands one out per device
    pub mqtt_client_id: &'static str,

    // MQTT username for authentication (optional)
    pub mqtt_username: Option<&'static str>,

    // MQTT password for authentication (optional)
    pub mqtt_password: Option<&'static str>,

    // Plain TCP or TLS towards the broker
    pub security: Security,

    // TLS CA certificate (required with Security::Tls)
    pub tls_ca: Option<&'static str>,

    // Channel shared by publisher and consumer, topic is channels/<id>/publish
    pub channel_id: &'static str,

    // Field order of the payload
    pub layout: Layout,

    // ThingSpeak `fieldN=` keys or tagged keys
    pub key_style: KeyStyle,

    // Attached display
    pub display: DisplayKind,

    // Publish interval in seconds
    pub publish_interval_seconds: u16,

    // Delay between Wi-Fi association checks
    pub wifi_retry_ms: u32,

    // Delay between broker connection attempts
    pub mqtt_retry_ms: u32,

    // Delay between GPS polls while there is no fix
    pub gps_retry_ms: u32,

    // Give up after this many attempts, retry forever when unset
    pub retry_limit: Option<u32>,

    // Read the GPS over UART, otherwise report the reference point
    pub gps_enabled: bool,

    // Reference point of the local metric frame
    pub reference_latitude: f64,
    pub reference_longitude: f64,

    // Meters-per-degree model of the local frame
    pub frame: FrameModel,

    // Offset applied to GPS UTC time for the timestamp field and the display clock
    pub utc_offset_hours: i8,

    // Throughput probe HTTP server (optional)
    pub probe_hostname: Option<&'static str>,
    pub probe_port: u16,
    pub download_path: &'static str,
    pub upload_path: &'static str,
}

impl Config {
    pub fn credentials(&self) -> Credentials<'static> {
        Credentials {
            ssid: self.wifi_ssid,
            psk: self.wifi_psk,
        }
    }

    pub fn wifi_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.wifi_retry_ms, self.retry_limit)
    }

    pub fn mqtt_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.mqtt_retry_ms, self.retry_limit)
    }

    pub fn gps_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.gps_retry_ms, self.retry_limit)
    }

    pub fn broker_settings(&self) -> BrokerSettings<'static> {
        BrokerSettings {
            hostname: self.mqtt_hostname,
            port: self.mqtt_port,
            client_id: if self.mqtt_client_id.is_empty() {
                self.device_id
            } else {
                self.mqtt_client_id
            },
            username: self.mqtt_username,
            password: self.mqtt_password,
        }
    }

    pub fn guards(&self) -> Guards<'static> {
        Guards {
            credentials: self.credentials(),
            link_retry: self.wifi_retry(),
            broker_retry: self.mqtt_retry(),
        }
    }

    pub fn probe_settings(&self) -> ProbeSettings<'static> {
        ProbeSettings {
            hostname: self.probe_hostname,
            port: self.probe_port,
            download_path: self.download_path,
            upload_path: self.upload_path,
        }
    }

    pub fn publish_interval_ms(&self) -> u32 {
        u32::from(self.publish_interval_seconds) * 1000
    }

    pub fn topic(&self) -> Result<TopicName, topic::Error> {
        topic::publish_topic(self.channel_id)
    }

    pub fn encoder(&self) -> Encoder {
        Encoder::new(self.key_style)
    }

    pub fn local_frame(&self) -> LocalFrame {
        LocalFrame::new(
            self.frame,
            self.reference_latitude,
            self.reference_longitude,
        )
    }
}

// config values are generated at compile time
include!(concat!(env!("OUT_DIR"), "/config.rs"));
