use core::fmt::{Debug, Write as _};

use embedded_io_async::{Read, Write};
use heapless::String;
use log::{debug, info, warn};

use crate::constants::{PROBE_CHUNK_SIZE, UPLOAD_PROBE_BYTES};
use crate::metrics::{mbps, LinkProbe};
use crate::mqtt::Dial;

/// Monotonic milliseconds.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// HTTP server used for throughput tests.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings<'a> {
    pub hostname: Option<&'a str>,
    pub port: u16,
    pub download_path: &'a str,
    pub upload_path: &'a str,
}

#[derive(Debug)]
pub enum Error<E> {
    NotConfigured,
    NoSignal,
    Dial(E),
    Io,
    RequestTooLong,
    MalformedResponse,
    Status(u16),
}

/// Measures throughput with a plain HTTP GET of a test file and a POST of
/// zeros, one connection per measurement.
pub struct HttpProbe<'a, D, C> {
    dialer: D,
    clock: C,
    settings: ProbeSettings<'a>,
    rssi: fn() -> Option<i32>,
}

impl<'a, D, C> HttpProbe<'a, D, C>
where
    D: Dial,
    C: Clock,
{
    pub fn new(dialer: D, clock: C, settings: ProbeSettings<'a>, rssi: fn() -> Option<i32>) -> Self {
        Self {
            dialer,
            clock,
            settings,
            rssi,
        }
    }

    fn hostname(&self) -> Result<&'a str, Error<D::Error>> {
        self.settings.hostname.ok_or(Error::NotConfigured)
    }
}

impl<D, C> LinkProbe for HttpProbe<'_, D, C>
where
    D: Dial,
    C: Clock,
{
    type Error = Error<D::Error>;

    async fn rssi(&mut self) -> Result<f32, Self::Error> {
        (self.rssi)().map(|dbm| dbm as f32).ok_or(Error::NoSignal)
    }

    async fn downlink_mbps(&mut self) -> Result<f32, Self::Error> {
        let hostname = self.hostname()?;
        let path = self.settings.download_path;
        let mut socket = self
            .dialer
            .dial(hostname, self.settings.port)
            .await
            .map_err(Error::Dial)?;

        let start = self.clock.now_ms();
        send_head(&mut socket, "GET", path, hostname, None).await?;

        let mut buf = [0u8; PROBE_CHUNK_SIZE];
        let (status, mut total) = read_head(&mut socket, &mut buf).await?;
        if status != 200 {
            return Err(Error::Status(status));
        }

        loop {
            let n = socket.read(&mut buf).await.map_err(io_error)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        let elapsed = self.clock.now_ms().saturating_sub(start);

        debug!("Downloaded {} bytes in {} ms", total, elapsed);
        Ok(mbps(total, elapsed))
    }

    async fn uplink_mbps(&mut self) -> Result<f32, Self::Error> {
        let hostname = self.hostname()?;
        let path = self.settings.upload_path;
        let mut socket = self
            .dialer
            .dial(hostname, self.settings.port)
            .await
            .map_err(Error::Dial)?;

        let start = self.clock.now_ms();
        send_head(&mut socket, "POST", path, hostname, Some(UPLOAD_PROBE_BYTES)).await?;

        let zeros = [0u8; PROBE_CHUNK_SIZE];
        let mut sent = 0;
        while sent < UPLOAD_PROBE_BYTES {
            let len = (UPLOAD_PROBE_BYTES - sent).min(zeros.len());
            socket.write_all(&zeros[..len]).await.map_err(io_error)?;
            sent += len;
        }
        socket.flush().await.map_err(io_error)?;

        let mut buf = [0u8; PROBE_CHUNK_SIZE];
        let (status, _) = read_head(&mut socket, &mut buf).await?;
        let elapsed = self.clock.now_ms().saturating_sub(start);
        if status != 200 {
            return Err(Error::Status(status));
        }

        info!("Uploaded {} bytes in {} ms", sent, elapsed);
        Ok(mbps(sent, elapsed))
    }
}

fn io_error<E, T: Debug>(e: T) -> Error<E> {
    warn!("Probe connection failed: {:?}", e);
    Error::Io
}

async fn send_head<S, E>(
    socket: &mut S,
    method: &str,
    path: &str,
    hostname: &str,
    content_length: Option<usize>,
) -> Result<(), Error<E>>
where
    S: Write,
{
    let mut head: String<256> = String::new();
    write!(head, "{} {} HTTP/1.1\r\nHost: {}\r\n", method, path, hostname)
        .map_err(|_| Error::RequestTooLong)?;
    if let Some(length) = content_length {
        write!(
            head,
            "Content-Type: application/octet-stream\r\nContent-Length: {}\r\n",
            length
        )
        .map_err(|_| Error::RequestTooLong)?;
    }
    head.push_str("Connection: close\r\n\r\n")
        .map_err(|_| Error::RequestTooLong)?;

    socket.write_all(head.as_bytes()).await.map_err(io_error)?;
    socket.flush().await.map_err(io_error)
}

/// Reads the response head into `buf` and returns the status code together
/// with the number of body bytes that arrived with it.
async fn read_head<S, E>(socket: &mut S, buf: &mut [u8]) -> Result<(u16, usize), Error<E>>
where
    S: Read,
{
    let mut total_read = 0;

    loop {
        let n = socket
            .read(&mut buf[total_read..])
            .await
            .map_err(io_error)?;
        if n == 0 {
            return Err(Error::MalformedResponse);
        }

        total_read += n;
        if let Some(body_start) = find_header_end(&buf[..total_read]) {
            let status = parse_status(&buf[..body_start]).ok_or(Error::MalformedResponse)?;
            return Ok((status, total_read - body_start));
        }

        if total_read == buf.len() {
            return Err(Error::MalformedResponse);
        }
    }
}

fn parse_status(head: &[u8]) -> Option<u16> {
    let line = head.split(|&b| b == b'\r').next()?;
    let line = core::str::from_utf8(line).ok()?;
    let mut parts = line.split(' ');

    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use core::convert::Infallible;
    use std::vec::Vec;

    /// Server side of one HTTP exchange: canned response, recorded request.
    #[derive(Default)]
    struct FakeServer {
        response: Vec<u8>,
        request: Vec<u8>,
        connections: u32,
        refuse: bool,
    }

    impl FakeServer {
        fn responding(response: &[u8]) -> Self {
            Self {
                response: response.to_vec(),
                ..Default::default()
            }
        }
    }

    struct FakeStream<'d> {
        server: &'d mut FakeServer,
        position: usize,
    }

    impl embedded_io_async::ErrorType for FakeStream<'_> {
        type Error = Infallible;
    }

    impl Read for FakeStream<'_> {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
            // Short reads, like a real socket
            let remaining = &self.server.response[self.position..];
            let n = remaining.len().min(buf.len()).min(100);
            buf[..n].copy_from_slice(&remaining[..n]);
            self.position += n;
            Ok(n)
        }
    }

    impl Write for FakeStream<'_> {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            self.server.request.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    impl Dial for FakeServer {
        type Error = &'static str;
        type Transport<'d> = FakeStream<'d>;

        async fn dial(&mut self, _hostname: &str, _port: u16) -> Result<FakeStream<'_>, Self::Error> {
            if self.refuse {
                return Err("connection refused");
            }
            self.connections += 1;
            Ok(FakeStream {
                server: self,
                position: 0,
            })
        }
    }

    /// Advances by `step_ms` every time it is read.
    struct SteppingClock {
        now: Cell<u64>,
        step_ms: u64,
    }

    impl Clock for SteppingClock {
        fn now_ms(&self) -> u64 {
            let now = self.now.get();
            self.now.set(now + self.step_ms);
            now
        }
    }

    const SETTINGS: ProbeSettings<'static> = ProbeSettings {
        hostname: Some("10.50.77.144"),
        port: 8080,
        download_path: "/testfile.bin",
        upload_path: "/upload",
    };

    fn probe(server: FakeServer, step_ms: u64) -> HttpProbe<'static, FakeServer, SteppingClock> {
        HttpProbe::new(
            server,
            SteppingClock {
                now: Cell::new(0),
                step_ms,
            },
            SETTINGS,
            || Some(-61),
        )
    }

    #[tokio::test]
    async fn download_counts_body_bytes() {
        let mut response = b"HTTP/1.1 200 OK\r\nContent-Length: 125000\r\n\r\n".to_vec();
        response.extend(std::iter::repeat(7u8).take(125_000));
        let mut probe = probe(FakeServer::responding(&response), 500);

        let rate = probe.downlink_mbps().await.unwrap();

        assert_eq!(rate, 2.0);
        let request = std::string::String::from_utf8(probe.dialer.request.clone()).unwrap();
        assert!(request.starts_with("GET /testfile.bin HTTP/1.1\r\nHost: 10.50.77.144\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn upload_posts_the_whole_buffer() {
        let mut probe = probe(FakeServer::responding(b"HTTP/1.1 200 OK\r\n\r\n"), 400);

        let rate = probe.uplink_mbps().await.unwrap();

        assert!((rate - 2.048).abs() < 1e-4);
        let request = &probe.dialer.request;
        let head_end = find_header_end(request).unwrap();
        assert_eq!(request.len() - head_end, UPLOAD_PROBE_BYTES);
        let head = core::str::from_utf8(&request[..head_end]).unwrap();
        assert!(head.starts_with("POST /upload HTTP/1.1\r\n"));
        assert!(head.contains("Content-Length: 102400\r\n"));
    }

    #[tokio::test]
    async fn non_200_status_is_an_error() {
        let mut probe = probe(FakeServer::responding(b"HTTP/1.1 404 Not Found\r\n\r\n"), 10);

        assert!(matches!(probe.downlink_mbps().await, Err(Error::Status(404))));
    }

    #[tokio::test]
    async fn truncated_response_is_malformed() {
        let mut probe = probe(FakeServer::responding(b"HTTP/1.1 200 OK\r\n"), 10);

        assert!(matches!(
            probe.downlink_mbps().await,
            Err(Error::MalformedResponse)
        ));
    }

    #[tokio::test]
    async fn missing_server_is_not_configured() {
        let mut probe = HttpProbe::new(
            FakeServer::default(),
            SteppingClock {
                now: Cell::new(0),
                step_ms: 1,
            },
            ProbeSettings {
                hostname: None,
                ..SETTINGS
            },
            || None,
        );

        assert!(matches!(probe.uplink_mbps().await, Err(Error::NotConfigured)));
        assert!(matches!(probe.rssi().await, Err(Error::NoSignal)));
        assert_eq!(probe.dialer.connections, 0);
    }

    #[tokio::test]
    async fn failed_measurements_read_zero() {
        let server = FakeServer {
            refuse: true,
            ..Default::default()
        };
        let mut probe = probe(server, 10);

        let link = crate::metrics::measure(&mut probe).await;

        assert_eq!(link.rssi, -61.0);
        assert_eq!(link.downlink_mbps, 0.0);
        assert_eq!(link.uplink_mbps, 0.0);
    }

    #[test]
    fn status_line_parsing() {
        assert_eq!(parse_status(b"HTTP/1.0 200 OK\r\n\r\n"), Some(200));
        assert_eq!(parse_status(b"HTTP/1.1 503 Busy\r\n"), Some(503));
        assert_eq!(parse_status(b"SSH-2.0-OpenSSH\r\n"), None);
    }
}
