//! Fakes shared by the unit tests.

#![allow(async_fn_in_trait)]

use core::net::Ipv4Addr;
use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;

use crate::broker::{Connector, Inbound, Session};
use crate::config::{Config, Role, Security};
use crate::display::{DisplayKind, Line, Screen};
use crate::geo::FrameModel;
use crate::link::{Credentials, Link};
use crate::metrics::LinkProbe;
use crate::payload::KeyStyle;
use crate::record::Layout;

/// Publisher on a ThingSpeak channel, link-quality layout, no display.
pub fn test_config() -> Config {
    Config {
        device_id: "ESP32_01",
        role: Role::Publisher,
        wifi_ssid: "Tec-IoT",
        wifi_psk: "secret",
        mqtt_hostname: "mqtt3.thingspeak.com",
        mqtt_port: 1883,
        mqtt_client_id: "client-id",
        mqtt_username: Some("user"),
        mqtt_password: Some("password"),
        security: Security::Plain,
        tls_ca: None,
        channel_id: "3150959",
        layout: Layout::LinkQuality,
        key_style: KeyStyle::Positional,
        display: DisplayKind::None,
        publish_interval_seconds: 20,
        wifi_retry_ms: 500,
        mqtt_retry_ms: 2000,
        gps_retry_ms: 3000,
        retry_limit: None,
        gps_enabled: false,
        reference_latitude: 19.01620,
        reference_longitude: -98.24581,
        frame: FrameModel::Spherical,
        utc_offset_hours: -6,
        probe_hostname: None,
        probe_port: 80,
        download_path: "/test.bin",
        upload_path: "/upload",
    }
}

/// Delay that returns at once and remembers every requested sleep.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    sleeps: Vec<u32>,
    stall_after: Option<usize>,
}

impl RecordingDelay {
    /// Sleeps normally `n` times, then never completes again.
    pub fn stalling_after(n: usize) -> Self {
        Self {
            sleeps: Vec::new(),
            stall_after: Some(n),
        }
    }

    pub fn sleeps(&self) -> &[u32] {
        &self.sleeps
    }

    async fn record(&mut self, ms: u32) {
        if let Some(limit) = self.stall_after {
            if self.sleeps.len() >= limit {
                core::future::pending::<()>().await;
            }
        }
        self.sleeps.push(ms);
    }
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.record(ns / 1_000_000).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.record(ms).await;
    }
}

#[derive(Debug)]
pub struct BeginFailed;

/// Link that comes up on the n-th `begin`.
#[derive(Debug, Default)]
pub struct FakeLink {
    up_after: Option<u32>,
    failing_begins: u32,
    pub begins: u32,
    pub last_ssid: Option<String>,
    pub dropped: bool,
}

impl FakeLink {
    pub fn up_after(begins: u32) -> Self {
        Self {
            up_after: Some(begins),
            ..Default::default()
        }
    }

    pub fn never_up() -> Self {
        Self::default()
    }

    pub fn failing_begins(mut self, n: u32) -> Self {
        self.failing_begins = n;
        self
    }
}

impl Link for FakeLink {
    type Error = BeginFailed;

    async fn begin(&mut self, credentials: &Credentials<'_>) -> Result<(), BeginFailed> {
        self.begins += 1;
        self.dropped = false;
        self.last_ssid = Some(credentials.ssid.to_string());
        if self.begins <= self.failing_begins {
            return Err(BeginFailed);
        }
        Ok(())
    }

    fn is_up(&self) -> bool {
        !self.dropped && matches!(self.up_after, Some(n) if self.begins >= n)
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        self.is_up().then(|| Ipv4Addr::new(10, 50, 77, 20))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BrokerError {
    Refused,
    Closed,
}

/// In-memory broker: scripted connect failures, recorded traffic.
///
/// Once `inbound` is empty, `receive` closes the session, or waits forever
/// with `hold_receive`.
#[derive(Debug, Default)]
pub struct FakeBroker {
    pub refuse_connects: u32,
    pub connect_limit: Option<u32>,
    pub fail_publishes: u32,
    pub connects: u32,
    pub published: Vec<(String, String)>,
    pub subscriptions: Vec<String>,
    pub inbound: VecDeque<Inbound>,
    pub hold_receive: bool,
    pub pings: u32,
}

impl FakeBroker {
    pub fn queue(&mut self, topic: &str, payload: &str) {
        self.inbound.push_back(Inbound::new(topic, payload.as_bytes()).unwrap());
    }
}

pub struct FakeSession<'s> {
    broker: &'s mut FakeBroker,
}

impl Session for FakeSession<'_> {
    type Error = BrokerError;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if self.broker.fail_publishes > 0 {
            self.broker.fail_publishes -= 1;
            return Err(BrokerError::Closed);
        }
        self.broker.published.push((
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.broker.subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn receive(&mut self) -> Result<Inbound, BrokerError> {
        match self.broker.inbound.pop_front() {
            Some(message) => Ok(message),
            None if self.broker.hold_receive => core::future::pending().await,
            None => Err(BrokerError::Closed),
        }
    }

    async fn ping(&mut self) -> Result<(), BrokerError> {
        self.broker.pings += 1;
        Ok(())
    }
}

impl Connector for FakeBroker {
    type Error = BrokerError;
    type Session<'s> = FakeSession<'s>;

    async fn connect(&mut self) -> Result<FakeSession<'_>, BrokerError> {
        if self.refuse_connects > 0 {
            self.refuse_connects -= 1;
            return Err(BrokerError::Refused);
        }
        if matches!(self.connect_limit, Some(limit) if self.connects >= limit) {
            return Err(BrokerError::Refused);
        }
        self.connects += 1;
        Ok(FakeSession { broker: self })
    }

    fn endpoint(&self) -> (&str, u16) {
        ("fake-broker", 1883)
    }
}

#[derive(Debug)]
pub struct ProbeFailed;

/// Probe returning canned values, or failing every measurement.
#[derive(Debug)]
pub struct FakeProbe {
    pub rssi: f32,
    pub down: f32,
    pub up: f32,
    pub failing: bool,
}

impl FakeProbe {
    pub fn new(rssi: f32, down: f32, up: f32) -> Self {
        Self {
            rssi,
            down,
            up,
            failing: false,
        }
    }
}

impl LinkProbe for FakeProbe {
    type Error = ProbeFailed;

    async fn rssi(&mut self) -> Result<f32, ProbeFailed> {
        if self.failing {
            return Err(ProbeFailed);
        }
        Ok(self.rssi)
    }

    async fn downlink_mbps(&mut self) -> Result<f32, ProbeFailed> {
        if self.failing {
            return Err(ProbeFailed);
        }
        Ok(self.down)
    }

    async fn uplink_mbps(&mut self) -> Result<f32, ProbeFailed> {
        if self.failing {
            return Err(ProbeFailed);
        }
        Ok(self.up)
    }
}

/// Screen that keeps every rendered frame.
#[derive(Debug, Default)]
pub struct RecordingScreen {
    pub frames: Vec<Vec<String>>,
}

impl RecordingScreen {
    pub fn last(&self) -> Option<&[String]> {
        self.frames.last().map(Vec::as_slice)
    }
}

impl Screen for RecordingScreen {
    type Error = core::convert::Infallible;

    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn show(&mut self, lines: &[Line]) {
        self.frames
            .push(lines.iter().map(|line| line.as_str().to_string()).collect());
    }
}
