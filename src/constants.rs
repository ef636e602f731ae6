/// Current firmware version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of the heap in DRAM (internal memory)
pub const HEAP_SIZE: usize = 72 * 1024;

/// Size of the TCP socket receive buffer
pub const RX_BUFFER_SIZE: usize = 4096;
/// Size of the TCP socket transmit buffer
pub const TX_BUFFER_SIZE: usize = 4096;

/// Maximum size for TLS processing buffer (TLS 1.3 records need 16 KiB + overhead)
pub const TLS_BUFFER_MAX: usize = 16640;

/// MQTT client transmit/receive buffer size, same as the broker buffer the nodes set
pub const MQTT_BUFFER_SIZE: usize = 2048;
/// Maximum number of MQTT v5 properties carried per packet
pub const MQTT_MAX_PROPERTIES: usize = 5;
/// MQTT keep alive announced to the broker
pub const MQTT_KEEP_ALIVE_SECS: u16 = 60;
/// Ping the broker after this long without traffic, well inside the keep-alive
pub const MQTT_PING_INTERVAL_MS: u32 = MQTT_KEEP_ALIVE_SECS as u32 * 1000 / 2;

/// Largest encoded telemetry payload
pub const PAYLOAD_CAPACITY: usize = MQTT_BUFFER_SIZE;
/// Largest topic name (`channels/<id>/publish`)
pub const TOPIC_CAPACITY: usize = 64;
/// Largest value kept per field by the consumer
pub const FIELD_CAPACITY: usize = 32;
/// ThingSpeak channels hold up to eight fields
pub const MAX_FIELDS: usize = 8;

/// Separator between `key=value` pairs
pub const FIELD_SEPARATOR: char = '&';
/// Separator between a key and its value
pub const KEY_VALUE_SEPARATOR: char = '=';

/// Decimal places used for plain float fields
pub const DEFAULT_FLOAT_PRECISION: usize = 2;
/// Decimal places used for coordinates expressed in degrees
pub const DEGREES_PRECISION: usize = 5;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Longest NMEA sentence accepted (the standard allows 82 characters)
pub const NMEA_LINE_MAX: usize = 96;

/// Width of a rendered display line in characters
pub const DISPLAY_LINE_WIDTH: usize = 32;
/// Most lines any supported display can show
pub const DISPLAY_MAX_LINES: usize = 8;

/// Bytes read per chunk while probing downlink throughput
pub const PROBE_CHUNK_SIZE: usize = 512;
/// Bytes posted while probing uplink throughput
pub const UPLOAD_PROBE_BYTES: usize = 100 * 1024;

/// Timeout of one WiFi association attempt
pub const WIFI_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Pause before the radio retries after a failed or dropped association
pub const WIFI_RECONNECT_DELAY_MS: u64 = 500;
/// Interval between RSSI samples while associated
pub const RSSI_SAMPLE_SECS: u64 = 5;

/// Socket timeout of broker and probe connections
pub const SOCKET_TIMEOUT_SECS: u64 = 30;

/// Buffer size for UART reads from the GPS module
pub const UART_READ_BUFFER_SIZE: usize = 64;
/// A GPS module sends a sentence every second; longer silence means it is gone
pub const GPS_READ_TIMEOUT_MS: u32 = 3000;
/// GPS module baud rate
pub const GPS_BAUD_RATE: u32 = 9600;
