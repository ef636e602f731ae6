#![allow(async_fn_in_trait)]

use core::fmt::Debug;
use core::marker::PhantomData;

use embedded_io_async::{Read, Write};
use rust_mqtt::{
    client::{
        client::MqttClient,
        client_config::{ClientConfig, MqttVersion},
    },
    packet::v5::{publish_packet::QualityOfService, reason_codes::ReasonCode},
    utils::rng_generator::CountingRng,
};

use crate::broker::{self, Connector, Inbound, Session};
use crate::constants::{MQTT_BUFFER_SIZE, MQTT_KEEP_ALIVE_SECS, MQTT_MAX_PROPERTIES};

#[derive(Debug)]
pub enum Error<E> {
    Dial(E),
    Broker(ReasonCode),
    Inbound(broker::Error),
}

/// Opens the byte stream the MQTT client runs over (plain TCP or TLS).
pub trait Dial {
    type Error: Debug;
    type Transport<'d>: Read + Write
    where
        Self: 'd;

    async fn dial(
        &mut self,
        hostname: &str,
        port: u16,
    ) -> Result<Self::Transport<'_>, Self::Error>;
}

/// Broker address and client identity.
#[derive(Debug, Clone, Copy)]
pub struct BrokerSettings<'a> {
    pub hostname: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
}

/// rust-mqtt (MQTT v5) sessions over a dialer. Owns the client buffers, one
/// session at a time.
pub struct MqttConnector<'a, D> {
    dialer: D,
    settings: BrokerSettings<'a>,
    write_buffer: [u8; MQTT_BUFFER_SIZE],
    recv_buffer: [u8; MQTT_BUFFER_SIZE],
    seed: u64,
}

impl<'a, D: Dial> MqttConnector<'a, D> {
    pub fn new(dialer: D, settings: BrokerSettings<'a>, seed: u64) -> Self {
        Self {
            dialer,
            settings,
            write_buffer: [0; MQTT_BUFFER_SIZE],
            recv_buffer: [0; MQTT_BUFFER_SIZE],
            seed,
        }
    }
}

impl<'a, D: Dial> Connector for MqttConnector<'a, D> {
    type Error = Error<D::Error>;
    type Session<'s> = MqttSession<'s, D::Transport<'s>, D::Error>
    where
        Self: 's;

    async fn connect(&mut self) -> Result<Self::Session<'_>, Self::Error> {
        let settings = self.settings;
        let transport = self
            .dialer
            .dial(settings.hostname, settings.port)
            .await
            .map_err(Error::Dial)?;

        // Packet identifiers only need to be unique per session
        self.seed = self.seed.wrapping_add(1);

        let mut config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(self.seed));
        config.add_max_subscribe_qos(QualityOfService::QoS0);
        config.add_client_id(settings.client_id);
        if let Some(username) = settings.username {
            config.add_username(username);
        }
        if let Some(password) = settings.password {
            config.add_password(password);
        }
        config.max_packet_size = MQTT_BUFFER_SIZE as u32;
        config.keep_alive = MQTT_KEEP_ALIVE_SECS;

        let mut client = MqttClient::<_, MQTT_MAX_PROPERTIES, _>::new(
            transport,
            &mut self.write_buffer,
            MQTT_BUFFER_SIZE,
            &mut self.recv_buffer,
            MQTT_BUFFER_SIZE,
            config,
        );

        match client.connect_to_broker().await {
            Ok(()) => {
                log::info!("MQTT connected to broker successfully");
            }
            Err(e) => {
                log::error!("MQTT connect_to_broker failed: {:?}", e);
                return Err(Error::Broker(e));
            }
        }

        Ok(MqttSession {
            client,
            _error: PhantomData,
        })
    }

    fn endpoint(&self) -> (&str, u16) {
        (self.settings.hostname, self.settings.port)
    }
}

pub struct MqttSession<'s, T, E>
where
    T: Read + Write,
{
    client: MqttClient<'s, T, MQTT_MAX_PROPERTIES, CountingRng>,
    _error: PhantomData<E>,
}

impl<T, E> Session for MqttSession<'_, T, E>
where
    T: Read + Write,
    E: Debug,
{
    type Error = Error<E>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        self.client
            .send_message(topic, payload, QualityOfService::QoS0, false)
            .await
            .map_err(Error::Broker)
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.client
            .subscribe_to_topic(topic)
            .await
            .map_err(Error::Broker)
    }

    async fn receive(&mut self) -> Result<Inbound, Self::Error> {
        let (topic, payload) = self.client.receive_message().await.map_err(Error::Broker)?;
        Inbound::new(topic, payload).map_err(Error::Inbound)
    }

    async fn ping(&mut self) -> Result<(), Self::Error> {
        self.client.send_ping().await.map_err(Error::Broker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    struct NullStream;

    impl embedded_io_async::ErrorType for NullStream {
        type Error = Infallible;
    }

    impl Read for NullStream {
        async fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Infallible> {
            Ok(0)
        }
    }

    impl Write for NullStream {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            Ok(buf.len())
        }
    }

    #[derive(Default)]
    struct Unreachable {
        dials: u32,
    }

    impl Dial for Unreachable {
        type Error = &'static str;
        type Transport<'d> = NullStream;

        async fn dial(&mut self, _hostname: &str, _port: u16) -> Result<NullStream, Self::Error> {
            self.dials += 1;
            Err("DNS lookup failed")
        }
    }

    const SETTINGS: BrokerSettings<'static> = BrokerSettings {
        hostname: "10.50.77.144",
        port: 1883,
        client_id: "ESP32_01",
        username: None,
        password: None,
    };

    #[tokio::test]
    async fn dial_failure_is_reported_as_such() {
        let mut connector = MqttConnector::new(Unreachable::default(), SETTINGS, 7);

        assert!(matches!(
            connector.connect().await,
            Err(Error::Dial("DNS lookup failed"))
        ));
        assert_eq!(connector.dialer.dials, 1);
        assert_eq!(connector.seed, 7);
    }

    #[test]
    fn endpoint_is_the_configured_broker() {
        let connector = MqttConnector::new(Unreachable::default(), SETTINGS, 0);
        assert_eq!(connector.endpoint(), ("10.50.77.144", 1883));
    }
}
