#![allow(async_fn_in_trait)]

use core::fmt::Debug;

use embedded_hal_async::delay::DelayNs;
use futures_util::future::{select, Either};
use futures_util::pin_mut;
use heapless::{String, Vec};
use log::{error, info, warn};

use crate::constants::PAYLOAD_CAPACITY;
use crate::topic::TopicName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    TopicTooLong,
    PayloadTooLarge,
}

/// Message delivered on a subscribed topic, copied out of the client buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: TopicName,
    pub payload: Vec<u8, PAYLOAD_CAPACITY>,
}

impl Inbound {
    pub fn new(topic: &str, payload: &[u8]) -> Result<Self, Error> {
        let mut name = String::new();
        name.push_str(topic).map_err(|_| Error::TopicTooLong)?;

        Ok(Self {
            topic: name,
            payload: Vec::from_slice(payload).map_err(|_| Error::PayloadTooLarge)?,
        })
    }

    /// Payload as text, `None` when it is not valid UTF-8
    pub fn text(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}

/// An established broker session.
pub trait Session {
    type Error: Debug;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Waits for the next message on any subscribed topic.
    async fn receive(&mut self) -> Result<Inbound, Self::Error>;

    async fn ping(&mut self) -> Result<(), Self::Error>;
}

/// Opens broker sessions (client id and credentials are the connector's business).
pub trait Connector {
    type Error: Debug;
    type Session<'s>: Session<Error = Self::Error>
    where
        Self: 's;

    async fn connect(&mut self) -> Result<Self::Session<'_>, Self::Error>;

    /// Broker host and port, for logging
    fn endpoint(&self) -> (&str, u16);
}

/// Connects once and (re)issues the subscription, if any.
///
/// The caller owns the retry loop so the session can borrow the connector.
pub async fn open_session<'c, C>(
    connector: &'c mut C,
    subscription: Option<&str>,
) -> Result<C::Session<'c>, C::Error>
where
    C: Connector,
{
    let (host, port) = connector.endpoint();
    info!("Connecting to MQTT broker {}:{}", host, port);

    let mut session = connector.connect().await?;
    info!("MQTT connected");

    if let Some(topic) = subscription {
        session.subscribe(topic).await?;
        info!("Subscribed to {}", topic);
    }

    Ok(session)
}

/// Fire-and-forget publish; `false` means the data point is lost and the
/// session should be considered gone.
pub async fn publish<S: Session>(session: &mut S, topic: &str, payload: &str) -> bool {
    match session.publish(topic, payload.as_bytes()).await {
        Ok(()) => {
            info!("Published to {}: {}", topic, payload);
            true
        }
        Err(e) => {
            error!("Failed to publish to {}: {:?}", topic, e);
            false
        }
    }
}

/// Receives the next message and returns its text, skipping non UTF-8 payloads.
pub async fn receive_text<S: Session>(session: &mut S) -> Result<Inbound, S::Error> {
    loop {
        let message = session.receive().await?;
        if message.text().is_some() {
            return Ok(message);
        }
        warn!(
            "Dropping {} byte message on {}: payload is not UTF-8",
            message.payload.len(),
            message.topic
        );
    }
}

/// Like [`receive_text`], but gives up with `None` once the channel has been
/// quiet for `idle_ms`.
pub async fn receive_within<S, D>(
    session: &mut S,
    delay: &mut D,
    idle_ms: u32,
) -> Option<Result<Inbound, S::Error>>
where
    S: Session,
    D: DelayNs,
{
    let received = receive_text(session);
    let idle = delay.delay_ms(idle_ms);
    pin_mut!(received);
    pin_mut!(idle);

    match select(received, idle).await {
        Either::Left((received, _)) => Some(received),
        Either::Right(((), _)) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BrokerError, FakeBroker, RecordingDelay};

    #[tokio::test]
    async fn open_session_subscribes_when_asked() {
        let mut broker = FakeBroker::default();

        {
            let _session = open_session(&mut broker, Some("channels/42/publish"))
                .await
                .unwrap();
        }

        assert_eq!(broker.connects, 1);
        assert_eq!(broker.subscriptions, ["channels/42/publish"]);
    }

    #[tokio::test]
    async fn open_session_without_subscription() {
        let mut broker = FakeBroker::default();

        assert!(open_session(&mut broker, None).await.is_ok());
        assert!(broker.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn refused_connect_is_reported() {
        let mut broker = FakeBroker {
            refuse_connects: 1,
            ..Default::default()
        };

        let result = open_session(&mut broker, None).await.err();
        assert_eq!(result, Some(BrokerError::Refused));
        assert_eq!(broker.connects, 0);
    }

    #[tokio::test]
    async fn publish_reports_failure_as_false() {
        let mut broker = FakeBroker {
            fail_publishes: 1,
            ..Default::default()
        };

        {
            let mut session = open_session(&mut broker, None).await.unwrap();
            assert!(!publish(&mut session, "t", "field1=1").await);
            assert!(publish(&mut session, "t", "field1=2").await);
        }

        assert_eq!(broker.published.len(), 1);
        assert_eq!(broker.published[0].1, "field1=2");
    }

    #[tokio::test]
    async fn receive_text_skips_binary_payloads() {
        let mut broker = FakeBroker::default();
        broker
            .inbound
            .push_back(Inbound::new("t", &[0xff, 0xfe]).unwrap());
        broker.queue("t", "field1=7");

        let mut session = open_session(&mut broker, None).await.unwrap();
        let message = receive_text(&mut session).await.unwrap();

        assert_eq!(message.text(), Some("field1=7"));
    }

    #[tokio::test]
    async fn quiet_channel_times_out() {
        let mut broker = FakeBroker {
            hold_receive: true,
            ..Default::default()
        };
        let mut delay = RecordingDelay::default();

        {
            let mut session = open_session(&mut broker, None).await.unwrap();
            assert!(receive_within(&mut session, &mut delay, 30_000).await.is_none());
        }

        assert_eq!(delay.sleeps(), &[30_000]);
    }

    #[tokio::test]
    async fn waiting_message_wins_over_the_timer() {
        let mut broker = FakeBroker::default();
        broker.queue("t", "field1=7");
        let mut delay = RecordingDelay::default();

        let mut session = open_session(&mut broker, None).await.unwrap();
        let message = receive_within(&mut session, &mut delay, 30_000).await;

        assert_eq!(message.unwrap().unwrap().text(), Some("field1=7"));
        assert!(delay.sleeps().is_empty());
    }

    #[test]
    fn inbound_rejects_oversized_parts() {
        let topic = "t".repeat(100);
        assert_eq!(Inbound::new(&topic, b"x"), Err(Error::TopicTooLong));

        let payload = std::vec![b'x'; PAYLOAD_CAPACITY + 1];
        assert_eq!(Inbound::new("t", &payload), Err(Error::PayloadTooLarge));
    }
}
