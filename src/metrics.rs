#![allow(async_fn_in_trait)]

use core::fmt::Debug;

use log::{info, warn};

/// Radio and throughput measurements of the current link.
pub trait LinkProbe {
    type Error: Debug;

    /// Received signal strength in dBm
    async fn rssi(&mut self) -> Result<f32, Self::Error>;

    async fn downlink_mbps(&mut self) -> Result<f32, Self::Error>;

    async fn uplink_mbps(&mut self) -> Result<f32, Self::Error>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkMetrics {
    pub rssi: f32,
    pub downlink_mbps: f32,
    pub uplink_mbps: f32,
}

/// Throughput in megabits per second. Zero elapsed time reports zero.
pub fn mbps(bytes: usize, elapsed_ms: u64) -> f32 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    let seconds = elapsed_ms as f64 / 1000.0;
    (bytes as f64 * 8.0 / seconds / 1_000_000.0) as f32
}

/// Takes every measurement once; a failed one is logged and reported as 0.0.
pub async fn measure<P: LinkProbe>(probe: &mut P) -> LinkMetrics {
    let rssi = probe.rssi().await.unwrap_or_else(|e| {
        warn!("RSSI unavailable: {:?}", e);
        0.0
    });
    let downlink_mbps = probe.downlink_mbps().await.unwrap_or_else(|e| {
        warn!("Download test failed: {:?}", e);
        0.0
    });
    let uplink_mbps = probe.uplink_mbps().await.unwrap_or_else(|e| {
        warn!("Upload test failed: {:?}", e);
        0.0
    });

    info!(
        "RSSI: {:.0} dBm, download: {:.2} Mbps, upload: {:.2} Mbps",
        rssi, downlink_mbps, uplink_mbps
    );

    LinkMetrics {
        rssi,
        downlink_mbps,
        uplink_mbps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::UPLOAD_PROBE_BYTES;
    use crate::testing::FakeProbe;

    #[test]
    fn megabits_per_second() {
        assert_eq!(mbps(1_000_000, 1000), 8.0);
        assert_eq!(mbps(125_000, 500), 2.0);
        assert_eq!(mbps(4096, 0), 0.0);
    }

    #[test]
    fn upload_probe_size() {
        // 100 KiB in 0.4 s
        let rate = mbps(UPLOAD_PROBE_BYTES, 400);
        assert!((rate - 2.048).abs() < 1e-4);
    }

    #[tokio::test]
    async fn measurements_pass_through() {
        let mut probe = FakeProbe::new(-61.0, 12.5, 3.25);

        assert_eq!(
            measure(&mut probe).await,
            LinkMetrics {
                rssi: -61.0,
                downlink_mbps: 12.5,
                uplink_mbps: 3.25,
            }
        );
    }

    #[tokio::test]
    async fn failed_measurements_read_zero() {
        let mut probe = FakeProbe {
            failing: true,
            ..FakeProbe::new(-61.0, 12.5, 3.25)
        };

        assert_eq!(measure(&mut probe).await, LinkMetrics::default());
    }
}
