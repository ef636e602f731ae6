#![no_std]
#![no_main]

use core::fmt::Debug;

use static_cell::StaticCell;

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Instant, Timer};

use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{self as hal};
use esp_println::logger::init_logger;
use esp_wifi::EspWifiController;

use hal::{
    rng::Rng,
    timer::timg::TimerGroup,
    uart::{RxConfig, Uart, UartRx},
    Async,
};

use wifi_telemetry::{
    broker::Connector,
    config::{Role, Security, CONFIG},
    display::{init_screen, ConsoleScreen, Screen},
    gps::{FixedPosition, Gps, NmeaGps},
    metrics::LinkProbe,
    mqtt::MqttConnector,
    node::{self, Consumer, Node, Publisher},
    probe::{Clock, HttpProbe},
};

extern crate alloc;

// Firmware modules resolve this through `crate::`
use wifi_telemetry::constants;

mod transport;
mod wifi;

use constants::*;
use transport::TcpDialer;
use wifi::Wifi;

esp_bootloader_esp_idf::esp_app_desc!();

static WIFI_INIT: StaticCell<EspWifiController<'static>> = StaticCell::new();

static MQTT_RX_BUF: StaticCell<[u8; RX_BUFFER_SIZE]> = StaticCell::new();
static MQTT_TX_BUF: StaticCell<[u8; TX_BUFFER_SIZE]> = StaticCell::new();
static PROBE_RX_BUF: StaticCell<[u8; RX_BUFFER_SIZE]> = StaticCell::new();
static PROBE_TX_BUF: StaticCell<[u8; TX_BUFFER_SIZE]> = StaticCell::new();

#[cfg(feature = "tls")]
static TLS_READ_BUF: StaticCell<[u8; TLS_BUFFER_MAX]> = StaticCell::new();
#[cfg(feature = "tls")]
static TLS_WRITE_BUF: StaticCell<[u8; TLS_BUFFER_MAX]> = StaticCell::new();

/// Milliseconds since boot.
struct Uptime;

impl Clock for Uptime {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    init_logger(log::LevelFilter::Info);
    log::info!("Starting {} v{}", CONFIG.device_id, VERSION);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    let mut rng = Rng::new(peripherals.RNG);

    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let timg1 = TimerGroup::new(peripherals.TIMG1);

    esp_hal_embassy::init(timg0.timer0);

    // possibly high transient required at init
    // https://github.com/esp-rs/esp-hal/issues/1626
    Timer::after(Duration::from_millis(1000)).await;

    let gps_port = if CONFIG.gps_enabled {
        let uart_config = hal::uart::Config::default()
            .with_rx(RxConfig::default().with_fifo_full_threshold(UART_READ_BUFFER_SIZE as u16))
            .with_baudrate(GPS_BAUD_RATE)
            .with_stop_bits(hal::uart::StopBits::_1)
            .with_data_bits(hal::uart::DataBits::_8)
            .with_parity(hal::uart::Parity::None);

        let uart = match Uart::new(peripherals.UART2, uart_config) {
            Ok(uart) => uart,
            Err(e) => halt("GPS UART configuration failed", e),
        };
        let (rx, _tx) = uart
            .with_tx(peripherals.GPIO17)
            .with_rx(peripherals.GPIO16)
            .into_async()
            .split();
        Some(rx)
    } else {
        None
    };

    let wifi_init = match esp_wifi::init(timg1.timer0, rng.clone(), peripherals.RADIO_CLK) {
        Ok(init) => WIFI_INIT.init(init),
        Err(e) => halt("WiFi radio initialization failed", e),
    };

    let wifi = match Wifi::new(
        wifi_init,
        peripherals.WIFI,
        rng.clone(),
        spawner,
        CONFIG.device_id,
        CONFIG.credentials(),
    )
    .await
    {
        Ok(wifi) => wifi,
        Err(e) => halt("WiFi setup failed", e),
    };

    let probe = HttpProbe::new(
        TcpDialer::new(
            wifi.stack,
            PROBE_RX_BUF.init([0; RX_BUFFER_SIZE]),
            PROBE_TX_BUF.init([0; TX_BUFFER_SIZE]),
        ),
        Uptime,
        CONFIG.probe_settings(),
        wifi::rssi,
    );

    let tcp = TcpDialer::new(
        wifi.stack,
        MQTT_RX_BUF.init([0; RX_BUFFER_SIZE]),
        MQTT_TX_BUF.init([0; TX_BUFFER_SIZE]),
    );
    let seed = u64::from(rng.random()) << 32 | u64::from(rng.random());

    match CONFIG.security {
        Security::Plain => {
            let connector = MqttConnector::new(tcp, CONFIG.broker_settings(), seed);
            start(wifi, connector, probe, gps_port).await
        }
        #[cfg(feature = "tls")]
        Security::Tls => {
            let dialer = match transport::TlsDialer::new(
                tcp,
                transport::HardwareRng(rng),
                CONFIG.tls_ca,
                TLS_READ_BUF.init([0; TLS_BUFFER_MAX]),
                TLS_WRITE_BUF.init([0; TLS_BUFFER_MAX]),
            ) {
                Ok(dialer) => dialer,
                Err(e) => halt("TLS setup failed", e),
            };
            let connector = MqttConnector::new(dialer, CONFIG.broker_settings(), seed);
            start(wifi, connector, probe, gps_port).await
        }
        #[cfg(not(feature = "tls"))]
        Security::Tls => halt("TLS requested but firmware built without it", "tls feature"),
    }
}

/// Builds the node for the configured role and runs it.
async fn start<C, P>(
    mut wifi: Wifi,
    mut connector: C,
    probe: P,
    gps_port: Option<UartRx<'static, Async>>,
) where
    C: Connector,
    P: LinkProbe,
{
    let mut screen = ConsoleScreen;
    if let Err(e) = init_screen(&mut screen, CONFIG.display) {
        halt("Display initialization failed", e);
    }

    match CONFIG.role {
        Role::Publisher => match gps_port {
            Some(port) => publish(&mut wifi, &mut connector, NmeaGps::new(port, Delay), probe, screen).await,
            None => {
                log::info!("GPS disabled, reporting the reference point");
                let fixed = FixedPosition {
                    latitude: CONFIG.reference_latitude,
                    longitude: CONFIG.reference_longitude,
                };
                publish(&mut wifi, &mut connector, fixed, probe, screen).await
            }
        },
        Role::Consumer => match Consumer::new(&CONFIG, screen) {
            Ok(mut consumer) => serve(&mut wifi, &mut connector, &mut consumer).await,
            Err(e) => halt("Invalid channel", e),
        },
    }
}

async fn publish<C, G, P, Sc>(wifi: &mut Wifi, connector: &mut C, gps: G, probe: P, screen: Sc)
where
    C: Connector,
    G: Gps,
    P: LinkProbe,
    Sc: Screen,
{
    match Publisher::new(&CONFIG, gps, probe, screen) {
        Ok(mut publisher) => serve(wifi, connector, &mut publisher).await,
        Err(e) => halt("Invalid channel", e),
    }
}

async fn serve<C: Connector, N: Node>(wifi: &mut Wifi, connector: &mut C, node: &mut N) {
    let mut delay = Delay;
    if let Err(e) = node::run(wifi, connector, &mut delay, node, &CONFIG.guards()).await {
        halt("Giving up", e);
    }
}

fn halt(reason: &str, error: impl Debug) -> ! {
    log::error!("{}: {:?}", reason, error);
    loop {
        core::hint::spin_loop();
    }
}
