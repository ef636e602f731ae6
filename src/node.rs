#![allow(async_fn_in_trait)]

use core::convert::Infallible;

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::broker::{self, Connector, Session};
use crate::config::Config;
use crate::constants::MQTT_PING_INTERVAL_MS;
use crate::display::{self, consumer_panel, publisher_panel, DisplayKind, PublisherView, Screen};
use crate::geo::LocalFrame;
use crate::gps::{self, Gps};
use crate::link::{self, Credentials, Link};
use crate::metrics::{self, LinkProbe};
use crate::payload::{self, Encoder, KeyStyle};
use crate::readings::LastReceived;
use crate::record::{Layout, TelemetryRecord};
use crate::retry::{Backoff, Exhausted, RetryPolicy};
use crate::topic::{self, TopicName};

#[derive(Debug)]
pub enum CycleError<E> {
    Session(E),
    PublishFailed,
    NoFix(Exhausted),
    Encode(payload::Error),
}

impl<E> CycleError<E> {
    /// The broker session is gone and must be re-established.
    pub fn drops_session(&self) -> bool {
        matches!(self, CycleError::Session(_) | CycleError::PublishFailed)
    }
}

/// One role of the node: what it subscribes to and what it does per cycle.
pub trait Node {
    fn subscription(&self) -> Option<&str>;

    async fn cycle<S, D>(
        &mut self,
        session: &mut S,
        delay: &mut D,
    ) -> Result<(), CycleError<S::Error>>
    where
        S: Session,
        D: DelayNs;
}

/// Retry settings of the connectivity guards.
#[derive(Debug, Clone, Copy)]
pub struct Guards<'a> {
    pub credentials: Credentials<'a>,
    pub link_retry: RetryPolicy,
    pub broker_retry: RetryPolicy,
}

/// Main loop: link guard, broker guard, then cycles while both hold.
///
/// Only returns when a capped retry policy runs out, be it the link guard,
/// the broker guard or the publisher's GPS wait.
pub async fn run<L, C, D, N>(
    link: &mut L,
    connector: &mut C,
    delay: &mut D,
    node: &mut N,
    guards: &Guards<'_>,
) -> Result<Infallible, Exhausted>
where
    L: Link,
    C: Connector,
    D: DelayNs,
    N: Node,
{
    let mut broker_backoff = Backoff::new(guards.broker_retry);

    loop {
        link::ensure_link(link, &guards.credentials, guards.link_retry, delay).await?;

        let mut session = match broker::open_session(connector, node.subscription()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    "MQTT connection failed: {:?}, retrying in {} ms",
                    e,
                    broker_backoff.interval_ms()
                );
                broker_backoff.wait(delay).await?;
                continue;
            }
        };
        broker_backoff.reset();

        loop {
            if !link.is_up() {
                warn!("WiFi connection lost");
                break;
            }

            match node.cycle(&mut session, delay).await {
                Ok(()) => {}
                Err(CycleError::NoFix(exhausted)) => {
                    error!("GPS never got a fix, giving up");
                    return Err(exhausted);
                }
                Err(e) if e.drops_session() => {
                    warn!("MQTT session lost: {:?}", e);
                    break;
                }
                Err(e) => warn!("Cycle skipped: {:?}", e),
            }
        }
    }
}

/// Measures the link, locates itself and publishes one record per interval.
pub struct Publisher<G, P, Sc> {
    gps: G,
    probe: P,
    screen: Sc,
    topic: TopicName,
    device_id: &'static str,
    layout: Layout,
    encoder: Encoder,
    frame: LocalFrame,
    display: DisplayKind,
    interval_ms: u32,
    gps_retry: RetryPolicy,
    utc_offset_hours: i8,
    published: u32,
}

impl<G, P, Sc> Publisher<G, P, Sc>
where
    G: Gps,
    P: LinkProbe,
    Sc: Screen,
{
    pub fn new(config: &Config, gps: G, probe: P, screen: Sc) -> Result<Self, topic::Error> {
        Ok(Self {
            gps,
            probe,
            screen,
            topic: config.topic()?,
            device_id: config.device_id,
            layout: config.layout,
            encoder: config.encoder(),
            frame: config.local_frame(),
            display: config.display,
            interval_ms: config.publish_interval_ms(),
            gps_retry: config.gps_retry(),
            utc_offset_hours: config.utc_offset_hours,
            published: 0,
        })
    }

    /// Records published so far
    pub fn published(&self) -> u32 {
        self.published
    }
}

impl<G, P, Sc> Node for Publisher<G, P, Sc>
where
    G: Gps,
    P: LinkProbe,
    Sc: Screen,
{
    fn subscription(&self) -> Option<&str> {
        None
    }

    async fn cycle<S, D>(
        &mut self,
        session: &mut S,
        delay: &mut D,
    ) -> Result<(), CycleError<S::Error>>
    where
        S: Session,
        D: DelayNs,
    {
        delay.delay_ms(self.interval_ms).await;

        let link = metrics::measure(&mut self.probe).await;
        let fix = gps::wait_for_fix(&mut self.gps, self.gps_retry, delay)
            .await
            .map_err(CycleError::NoFix)?;

        let offset = self.frame.to_meters(fix.latitude, fix.longitude);
        let (latitude, longitude) = if self.layout.uses_degrees() {
            (fix.latitude, fix.longitude)
        } else {
            (offset.north_m, offset.east_m)
        };
        let timestamp = fix.timestamp(self.utc_offset_hours).unwrap_or_else(|| {
            debug!("No GPS date yet, sending timestamp 0");
            0
        });

        let record = TelemetryRecord {
            rssi: link.rssi,
            downlink_mbps: link.downlink_mbps,
            uplink_mbps: link.uplink_mbps,
            latitude: latitude as f32,
            longitude: longitude as f32,
            timestamp,
            device_id: self.device_id,
        };
        let payload = self
            .encoder
            .encode(&record.fields(self.layout))
            .map_err(CycleError::Encode)?;

        let published = broker::publish(session, &self.topic, &payload).await;

        if self.display != DisplayKind::None {
            let view = PublisherView {
                offset,
                clock: fix
                    .time
                    .map(|t| display::local_time(t, self.utc_offset_hours)),
                metrics: link,
                device_id: self.device_id,
            };
            self.screen.show(&publisher_panel(self.display, &view));
        }

        if !published {
            return Err(CycleError::PublishFailed);
        }
        self.published = self.published.wrapping_add(1);
        Ok(())
    }
}

/// Keeps the last value of every field seen on the channel and displays it.
pub struct Consumer<Sc> {
    screen: Sc,
    topic: TopicName,
    layout: Layout,
    keys: KeyStyle,
    display: DisplayKind,
    last: LastReceived,
}

impl<Sc: Screen> Consumer<Sc> {
    pub fn new(config: &Config, screen: Sc) -> Result<Self, topic::Error> {
        Ok(Self {
            screen,
            topic: config.topic()?,
            layout: config.layout,
            keys: config.key_style,
            display: config.display,
            last: LastReceived::new(),
        })
    }

    pub fn last_received(&self) -> &LastReceived {
        &self.last
    }
}

impl<Sc: Screen> Node for Consumer<Sc> {
    fn subscription(&self) -> Option<&str> {
        Some(&self.topic)
    }

    async fn cycle<S, D>(
        &mut self,
        session: &mut S,
        delay: &mut D,
    ) -> Result<(), CycleError<S::Error>>
    where
        S: Session,
        D: DelayNs,
    {
        let message = loop {
            let received = broker::receive_within(session, delay, MQTT_PING_INTERVAL_MS).await;
            match received {
                Some(received) => break received.map_err(CycleError::Session)?,
                None => {
                    debug!("Channel quiet, pinging the broker");
                    session.ping().await.map_err(CycleError::Session)?;
                }
            }
        };

        if message.topic != self.topic {
            debug!("Ignoring message on {}", message.topic);
            return Ok(());
        }

        let text = message.text().unwrap_or_default();
        info!("Message arrived [{}] {}", message.topic, text);

        if self.last.apply(text, self.layout, self.keys) == 0 {
            warn!("Message carried no usable field");
        }

        if self.display != DisplayKind::None {
            self.screen.show(&consumer_panel(self.display, &self.last));
        }

        // Incoming publishes do not count as client activity for the keep alive
        session.ping().await.map_err(CycleError::Session)
    }
}
