#![allow(async_fn_in_trait)]

use core::fmt::Debug;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Read;
use futures_util::future::{select, Either};
use futures_util::pin_mut;
use log::{debug, info, warn};

use crate::constants::{GPS_READ_TIMEOUT_MS, UART_READ_BUFFER_SIZE};
use crate::nmea::{Fix, NmeaParser};
use crate::retry::{Backoff, Exhausted, RetryPolicy};

/// Source of position fixes.
pub trait Gps {
    type Error: Debug;

    /// Processes whatever the receiver has sent and returns the current fix.
    async fn poll_fix(&mut self) -> Result<Fix, Self::Error>;
}

#[derive(Debug)]
pub enum Error<E> {
    Read(E),
    // Nothing arrived within GPS_READ_TIMEOUT_MS
    Silent,
}

/// GPS module on a serial port speaking NMEA 0183.
///
/// Every read is bounded by [`GPS_READ_TIMEOUT_MS`] on `delay`, so an unplugged
/// module shows up as an error instead of a hang.
pub struct NmeaGps<R, D> {
    port: R,
    delay: D,
    parser: NmeaParser,
}

impl<R: Read, D: DelayNs> NmeaGps<R, D> {
    pub fn new(port: R, delay: D) -> Self {
        Self {
            port,
            delay,
            parser: NmeaParser::new(),
        }
    }

    async fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize, Error<R::Error>> {
        let read = self.port.read(buffer);
        let timeout = self.delay.delay_ms(GPS_READ_TIMEOUT_MS);
        pin_mut!(read);
        pin_mut!(timeout);

        match select(read, timeout).await {
            Either::Left((read, _)) => read.map_err(Error::Read),
            Either::Right(((), _)) => Err(Error::Silent),
        }
    }
}

impl<R: Read, D: DelayNs> Gps for NmeaGps<R, D> {
    type Error = Error<R::Error>;

    /// Reads until one sentence completes or the port has nothing more to give.
    async fn poll_fix(&mut self) -> Result<Fix, Self::Error> {
        let mut buffer = [0u8; UART_READ_BUFFER_SIZE];

        loop {
            let read = self.read_chunk(&mut buffer).await?;
            if read == 0 {
                break;
            }

            let mut completed = false;
            for byte in &buffer[..read] {
                if let Some(sentence) = self.parser.feed(*byte) {
                    debug!("NMEA {:?} sentence parsed", sentence);
                    completed = true;
                }
            }
            if completed {
                break;
            }
        }

        Ok(*self.parser.fix())
    }
}

/// Reports a fixed point, for nodes without a GPS module.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl Gps for FixedPosition {
    type Error = core::convert::Infallible;

    async fn poll_fix(&mut self) -> Result<Fix, Self::Error> {
        Ok(Fix {
            valid: true,
            latitude: self.latitude,
            longitude: self.longitude,
            ..Fix::default()
        })
    }
}

/// Polls until the fix is valid, waiting the policy interval between polls.
pub async fn wait_for_fix<G, D>(
    gps: &mut G,
    policy: RetryPolicy,
    delay: &mut D,
) -> Result<Fix, Exhausted>
where
    G: Gps,
    D: DelayNs,
{
    let mut backoff = Backoff::new(policy);

    loop {
        match gps.poll_fix().await {
            Ok(fix) if fix.valid => return Ok(fix),
            Ok(_) => info!("GPS has no signal"),
            Err(e) => warn!("GPS has no signal: {:?}", e),
        }
        backoff.wait(delay).await?;
    }
}
