use core::net::Ipv4Addr;
use core::str::FromStr;
use core::sync::atomic::{AtomicI32, Ordering};

use embassy_executor::Spawner;
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::{with_timeout, Duration, Timer};
use esp_hal::rng::Rng;
use esp_wifi::{
    wifi::{
        ClientConfiguration, Configuration, WifiController, WifiDevice, WifiEvent, WifiState,
    },
    EspWifiController,
};
use heapless::String;
use log::{debug, info, warn};
use static_cell::StaticCell;

use wifi_telemetry::link::{Credentials, Link};

use crate::constants::{RSSI_SAMPLE_SECS, WIFI_CONNECT_TIMEOUT_SECS, WIFI_RECONNECT_DELAY_MS};

static RESOURCES: StaticCell<StackResources<5>> = StaticCell::new();

// Last RSSI sampled by the connection task, i32::MIN until associated
static RSSI: AtomicI32 = AtomicI32::new(i32::MIN);

pub struct Wifi {
    pub stack: Stack<'static>,
}

#[derive(Debug)]
pub enum Error {
    WifiInitFailed,
    HostnameTooLong,
    TaskSpawnFailed,
    NotAssociated,
}

impl Wifi {
    pub async fn new(
        init: &'static EspWifiController<'static>,
        wifi: esp_hal::peripherals::WIFI<'static>,
        mut rng: Rng,
        spawner: Spawner,
        hostname: &str,
        credentials: Credentials<'static>,
    ) -> Result<Self, Error> {
        let (controller, interfaces) =
            esp_wifi::wifi::new(init, wifi).map_err(|_| Error::WifiInitFailed)?;

        let mut dhcp_config = embassy_net::DhcpConfig::default();
        dhcp_config.hostname =
            Some(String::<32>::from_str(hostname).map_err(|_| Error::HostnameTooLong)?);

        let seed = (rng.random() as u64) << 32 | rng.random() as u64;
        let config = embassy_net::Config::dhcpv4(dhcp_config);

        let resources = RESOURCES.init(StackResources::new());
        let (stack, runner) = embassy_net::new(interfaces.sta, config, resources, seed);

        spawner
            .spawn(connection(controller, credentials))
            .map_err(|_| Error::TaskSpawnFailed)?;
        spawner
            .spawn(net_task(runner))
            .map_err(|_| Error::TaskSpawnFailed)?;

        Ok(Self { stack })
    }
}

impl Link for Wifi {
    type Error = Error;

    // Association itself runs in the connection task; this waits for DHCP.
    async fn begin(&mut self, credentials: &Credentials<'_>) -> Result<(), Error> {
        debug!("Waiting for association with {:?}", credentials.ssid);
        with_timeout(
            Duration::from_secs(WIFI_CONNECT_TIMEOUT_SECS),
            self.stack.wait_config_up(),
        )
        .await
        .map_err(|_| Error::NotAssociated)
    }

    fn is_up(&self) -> bool {
        self.stack.is_link_up() && self.stack.config_v4().is_some()
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        self.stack.config_v4().map(|config| config.address.address())
    }
}

/// Signal strength of the current association in dBm.
pub fn rssi() -> Option<i32> {
    match RSSI.load(Ordering::Relaxed) {
        i32::MIN => None,
        rssi => Some(rssi),
    }
}

#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>, credentials: Credentials<'static>) {
    info!(
        "Start connection task, device capabilities: {:?}",
        controller.capabilities()
    );
    loop {
        if esp_wifi::wifi::wifi_state() == WifiState::StaConnected {
            // Sample the signal until the association drops
            loop {
                match controller.rssi() {
                    Ok(rssi) => RSSI.store(rssi, Ordering::Relaxed),
                    Err(e) => debug!("RSSI read failed: {:?}", e),
                }
                let disconnected = with_timeout(
                    Duration::from_secs(RSSI_SAMPLE_SECS),
                    controller.wait_for_event(WifiEvent::StaDisconnected),
                )
                .await;
                if disconnected.is_ok() {
                    break;
                }
            }
            RSSI.store(i32::MIN, Ordering::Relaxed);
            warn!("WiFi disconnected");
            Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
        }

        if !matches!(controller.is_started(), Ok(true)) {
            info!("Connecting to WiFi with SSID: {:?}", credentials.ssid);
            let client_config = Configuration::Client(ClientConfiguration {
                ssid: credentials.ssid.into(),
                password: credentials.psk.into(),
                ..Default::default()
            });
            if let Err(e) = controller.set_configuration(&client_config) {
                log::error!("Failed to set WiFi config: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            info!("Starting wifi");
            if let Err(e) = controller.start_async().await {
                log::error!("Failed to start WiFi: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            info!("Wifi started!");
        }

        match with_timeout(
            Duration::from_secs(WIFI_CONNECT_TIMEOUT_SECS),
            controller.connect_async(),
        )
        .await
        {
            Ok(Ok(_)) => info!("Wifi connected!"),
            Ok(Err(e)) => {
                info!("Failed to connect to wifi: {e:?}");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
            Err(_) => {
                info!("Wifi connection timed out");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
