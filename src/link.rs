#![allow(async_fn_in_trait)]

use core::fmt::Debug;
use core::net::Ipv4Addr;

use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

use crate::retry::{Backoff, Exhausted, RetryPolicy};

#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub ssid: &'a str,
    pub psk: &'a str,
}

/// Network association API of the radio (begin / status / local address).
pub trait Link {
    type Error: Debug;

    /// Starts (or restarts) association with the given network.
    async fn begin(&mut self, credentials: &Credentials<'_>) -> Result<(), Self::Error>;

    /// Associated and holding an address
    fn is_up(&self) -> bool;

    fn local_address(&self) -> Option<Ipv4Addr>;
}

/// Blocks until the link is up.
///
/// Every failed check is logged and followed by the policy interval. With an
/// uncapped policy this only returns once the association holds.
pub async fn ensure_link<L, D>(
    link: &mut L,
    credentials: &Credentials<'_>,
    policy: RetryPolicy,
    delay: &mut D,
) -> Result<(), Exhausted>
where
    L: Link,
    D: DelayNs,
{
    if link.is_up() {
        return Ok(());
    }

    info!("Connecting to WiFi with SSID: {:?}", credentials.ssid);
    let mut backoff = Backoff::new(policy);

    loop {
        match link.begin(credentials).await {
            Ok(()) if link.is_up() => break,
            Ok(()) => info!(
                "WiFi not associated yet (attempt {}), retrying in {} ms",
                backoff.attempts() + 1,
                backoff.interval_ms()
            ),
            Err(e) => warn!(
                "WiFi association attempt {} failed: {:?}. Retrying...",
                backoff.attempts() + 1,
                e
            ),
        }
        backoff.wait(delay).await?;
    }

    match link.local_address() {
        Some(address) => info!("WiFi connected, got IP: {}", address),
        None => info!("WiFi connected"),
    }

    Ok(())
}
