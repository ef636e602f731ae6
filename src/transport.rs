use embassy_net::{
    dns::{DnsQueryType, Error as DNSError},
    tcp::{ConnectError, TcpSocket},
    IpAddress, Stack,
};
use embassy_time::Duration;

use wifi_telemetry::mqtt::Dial;

use crate::constants::{RX_BUFFER_SIZE, SOCKET_TIMEOUT_SECS, TX_BUFFER_SIZE};

#[derive(Debug)]
pub enum Error {
    #[allow(dead_code)]
    DNSQueryFailed(DNSError),
    DNSLookupFailed,
    #[allow(dead_code)]
    SocketConnectionError(ConnectError),
    #[cfg(feature = "tls")]
    CACertificateMissing,
    #[cfg(feature = "tls")]
    PEMParseError,
    #[cfg(feature = "tls")]
    TLSHandshakeFailed,
}

pub async fn resolve(stack: Stack<'static>, hostname: &str) -> Result<IpAddress, Error> {
    if let Ok(address) = hostname.parse() {
        return Ok(IpAddress::Ipv4(address));
    }

    stack
        .dns_query(hostname, DnsQueryType::A)
        .await
        .map_err(Error::DNSQueryFailed)?
        .first()
        .copied()
        .ok_or(Error::DNSLookupFailed)
}

/// Plain TCP connections over the WiFi stack, one at a time.
pub struct TcpDialer {
    stack: Stack<'static>,
    rx_buffer: &'static mut [u8; RX_BUFFER_SIZE],
    tx_buffer: &'static mut [u8; TX_BUFFER_SIZE],
}

impl TcpDialer {
    pub fn new(
        stack: Stack<'static>,
        rx_buffer: &'static mut [u8; RX_BUFFER_SIZE],
        tx_buffer: &'static mut [u8; TX_BUFFER_SIZE],
    ) -> Self {
        Self {
            stack,
            rx_buffer,
            tx_buffer,
        }
    }
}

impl Dial for TcpDialer {
    type Error = Error;
    type Transport<'d> = TcpSocket<'d>;

    async fn dial(&mut self, hostname: &str, port: u16) -> Result<TcpSocket<'_>, Error> {
        let addr = resolve(self.stack, hostname).await?;

        let mut socket = TcpSocket::new(self.stack, &mut self.rx_buffer[..], &mut self.tx_buffer[..]);
        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

        log::info!("Connecting TCP socket to {}:{}", hostname, port);
        socket
            .connect((addr, port))
            .await
            .map_err(Error::SocketConnectionError)?;
        log::info!("TCP connected");

        Ok(socket)
    }
}

#[cfg(feature = "tls")]
pub use secure::{HardwareRng, TlsDialer};

#[cfg(feature = "tls")]
mod secure {
    use alloc::string::String;
    use alloc::vec::Vec;

    use embassy_net::tcp::TcpSocket;
    use embedded_io_async::{ErrorType, Read, Write};
    use embedded_tls::{Aes128GcmSha256, TlsConfig, TlsConnection, TlsContext, UnsecureProvider};
    use esp_hal::rng::Rng;
    use rand_core::{CryptoRng, RngCore};

    use wifi_telemetry::mqtt::Dial;

    use super::{Error, TcpDialer};
    use crate::constants::TLS_BUFFER_MAX;

    /// Hardware RNG of the ESP32, random while the radio is running.
    pub struct HardwareRng(pub Rng);

    impl RngCore for HardwareRng {
        fn next_u32(&mut self) -> u32 {
            self.0.random()
        }

        fn next_u64(&mut self) -> u64 {
            (u64::from(self.0.random()) << 32) | u64::from(self.0.random())
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.0.read(dest);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.0.read(dest);
            Ok(())
        }
    }

    impl CryptoRng for HardwareRng {}

    /// TLS 1.3 (AES-128-GCM-SHA256) on top of a TCP dialer.
    pub struct TlsDialer {
        tcp: TcpDialer,
        rng: HardwareRng,
        ca_der: Vec<u8>,
        read_buffer: &'static mut [u8; TLS_BUFFER_MAX],
        write_buffer: &'static mut [u8; TLS_BUFFER_MAX],
    }

    impl TlsDialer {
        pub fn new(
            tcp: TcpDialer,
            rng: HardwareRng,
            ca_pem: Option<&str>,
            read_buffer: &'static mut [u8; TLS_BUFFER_MAX],
            write_buffer: &'static mut [u8; TLS_BUFFER_MAX],
        ) -> Result<Self, Error> {
            let ca_der = decode_pem(ca_pem.ok_or(Error::CACertificateMissing)?)?;
            log::info!("CA certificate loaded: {} bytes", ca_der.len());

            Ok(Self {
                tcp,
                rng,
                ca_der,
                read_buffer,
                write_buffer,
            })
        }
    }

    impl Dial for TlsDialer {
        type Error = Error;
        type Transport<'d> = AutoFlush<TlsConnection<'d, TcpSocket<'d>, Aes128GcmSha256>>;

        async fn dial(&mut self, hostname: &str, port: u16) -> Result<Self::Transport<'_>, Error> {
            let socket = self.tcp.dial(hostname, port).await?;

            let config = TlsConfig::new()
                .with_server_name(hostname)
                .with_ca(embedded_tls::Certificate::X509(&self.ca_der));

            let mut tls: TlsConnection<TcpSocket, Aes128GcmSha256> =
                TlsConnection::new(socket, &mut self.read_buffer[..], &mut self.write_buffer[..]);

            log::info!("Starting TLS handshake with {}", hostname);
            let crypto_provider = UnsecureProvider::new::<Aes128GcmSha256>(&mut self.rng);
            tls.open(TlsContext::new(&config, crypto_provider))
                .await
                .map_err(|e| {
                    log::error!("TLS handshake failed: {:?}", e);
                    Error::TLSHandshakeFailed
                })?;
            log::info!("TLS handshake complete");

            Ok(AutoFlush(tls))
        }
    }

    /// Flushes after every write: the MQTT client never calls `flush()`, and
    /// embedded-tls holds records back until it does.
    pub struct AutoFlush<S>(S);

    impl<S: ErrorType> ErrorType for AutoFlush<S> {
        type Error = S::Error;
    }

    impl<S: Read> Read for AutoFlush<S> {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, S::Error> {
            self.0.read(buf).await
        }
    }

    impl<S: Write> Write for AutoFlush<S> {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, S::Error> {
            let n = self.0.write(buf).await?;
            self.0.flush().await?;
            Ok(n)
        }

        async fn flush(&mut self) -> Result<(), S::Error> {
            self.0.flush().await
        }
    }

    fn decode_pem(pem: &str) -> Result<Vec<u8>, Error> {
        use base64::Engine;
        let start = pem.find("-----BEGIN").ok_or(Error::PEMParseError)?;
        let body_start = pem[start..].find('\n').ok_or(Error::PEMParseError)? + start + 1;
        let end = pem.find("-----END").ok_or(Error::PEMParseError)?;

        let content: String = pem
            .get(body_start..end)
            .ok_or(Error::PEMParseError)?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|_| Error::PEMParseError)
    }
}
