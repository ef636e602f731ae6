use core::f64::consts::PI;

use crate::constants::EARTH_RADIUS_M;

/// Meters-per-degree model used for the local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameModel {
    // One degree of arc on a sphere of mean Earth radius
    Spherical,
    // Survey constants: 111 132 m per degree latitude, 111 320 m at the equator for longitude
    Surveyed,
}

/// Offset from the reference point, in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Offset {
    pub north_m: f64,
    pub east_m: f64,
}

/// Flat-plane approximation around a fixed reference point.
///
/// Only meaningful within a few kilometers of the reference; this is not a
/// geodesic transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin_latitude: f64,
    origin_longitude: f64,
    m_per_deg_lat: f64,
    m_per_deg_lon: f64,
}

impl LocalFrame {
    pub fn new(model: FrameModel, origin_latitude: f64, origin_longitude: f64) -> Self {
        let cos_lat = libm::cos(origin_latitude.to_radians());
        let (m_per_deg_lat, m_per_deg_lon) = match model {
            FrameModel::Spherical => {
                let one_degree = EARTH_RADIUS_M * 2.0 * PI / 360.0;
                (one_degree, one_degree * cos_lat)
            }
            FrameModel::Surveyed => (111_132.0, 111_320.0 * cos_lat),
        };

        Self {
            origin_latitude,
            origin_longitude,
            m_per_deg_lat,
            m_per_deg_lon,
        }
    }

    pub fn to_meters(&self, latitude: f64, longitude: f64) -> Offset {
        Offset {
            north_m: (latitude - self.origin_latitude) * self.m_per_deg_lat,
            east_m: (longitude - self.origin_longitude) * self.m_per_deg_lon,
        }
    }
}
