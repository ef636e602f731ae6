use heapless::Vec;

use crate::constants::{DEFAULT_FLOAT_PRECISION, DEGREES_PRECISION, MAX_FIELDS};
use crate::payload::{Field, Value};

/// Every quantity a node can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Rssi,
    Downlink,
    Uplink,
    Latitude,
    Longitude,
    Timestamp,
    DeviceId,
}

impl Quantity {
    pub const ALL: [Quantity; 7] = [
        Quantity::Rssi,
        Quantity::Downlink,
        Quantity::Uplink,
        Quantity::Latitude,
        Quantity::Longitude,
        Quantity::Timestamp,
        Quantity::DeviceId,
    ];

    /// Key used by the tagged message format
    pub const fn tag(self) -> &'static str {
        match self {
            Quantity::Rssi => "rssi",
            Quantity::Downlink => "down",
            Quantity::Uplink => "up",
            Quantity::Latitude => "lat",
            Quantity::Longitude => "lon",
            Quantity::Timestamp => "time",
            Quantity::DeviceId => "device",
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Field order agreed between producer and consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    // rssi, down, up, lat°, lon°, device
    LinkQuality,
    // rssi, down, up, north m, east m, timestamp, device
    Survey,
    // north m, east m, timestamp
    Position,
}

impl Layout {
    pub const fn quantities(self) -> &'static [Quantity] {
        match self {
            Layout::LinkQuality => &[
                Quantity::Rssi,
                Quantity::Downlink,
                Quantity::Uplink,
                Quantity::Latitude,
                Quantity::Longitude,
                Quantity::DeviceId,
            ],
            Layout::Survey => &[
                Quantity::Rssi,
                Quantity::Downlink,
                Quantity::Uplink,
                Quantity::Latitude,
                Quantity::Longitude,
                Quantity::Timestamp,
                Quantity::DeviceId,
            ],
            Layout::Position => &[
                Quantity::Latitude,
                Quantity::Longitude,
                Quantity::Timestamp,
            ],
        }
    }

    pub fn position_of(self, quantity: Quantity) -> Option<usize> {
        self.quantities().iter().position(|q| *q == quantity)
    }

    /// Coordinates travel in degrees, otherwise as meters from the reference point.
    pub const fn uses_degrees(self) -> bool {
        matches!(self, Layout::LinkQuality)
    }

    pub const fn coordinate_precision(self) -> usize {
        if self.uses_degrees() {
            DEGREES_PRECISION
        } else {
            DEFAULT_FLOAT_PRECISION
        }
    }
}

/// One publish worth of readings. Latitude and longitude hold degrees or
/// meters depending on the layout it is encoded with.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryRecord<'a> {
    pub rssi: f32,
    pub downlink_mbps: f32,
    pub uplink_mbps: f32,
    pub latitude: f32,
    pub longitude: f32,
    pub timestamp: i64,
    pub device_id: &'a str,
}

impl<'a> TelemetryRecord<'a> {
    pub fn value(&self, quantity: Quantity, layout: Layout) -> Value<'a> {
        match quantity {
            Quantity::Rssi => Value::Float(self.rssi),
            Quantity::Downlink => Value::Float(self.downlink_mbps),
            Quantity::Uplink => Value::Float(self.uplink_mbps),
            Quantity::Latitude => Value::Fixed(self.latitude, layout.coordinate_precision()),
            Quantity::Longitude => Value::Fixed(self.longitude, layout.coordinate_precision()),
            Quantity::Timestamp => Value::Int(self.timestamp),
            Quantity::DeviceId => Value::Text(self.device_id),
        }
    }

    /// Fields in layout order, ready for the encoder
    pub fn fields(&self, layout: Layout) -> Vec<Field<'a>, MAX_FIELDS> {
        layout
            .quantities()
            .iter()
            .map(|q| Field::new(q.tag(), self.value(*q, layout)))
            .collect()
    }
}
