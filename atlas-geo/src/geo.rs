//! Latitude/longitude coordinates and bounding boxes.

/// Maximum latitude representable in the Web Mercator projection.
///
/// Latitudes beyond this band project to infinity and are clamped (or
/// rejected) by the tile cover computation.
pub const LATITUDE_MAX: f64 = 85.0511287798;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east. May exceed [-180, 180] to
    /// describe coordinates in a wrapped copy of the world.
    pub longitude: f64,
}

impl LatLng {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A geographic bounding box spanned by a southwest and northeast corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLngBounds {
    sw: LatLng,
    ne: LatLng,
}

impl LatLngBounds {
    /// The smallest bounds containing both coordinates. The corners may be
    /// given in any order.
    pub fn hull(a: LatLng, b: LatLng) -> Self {
        Self {
            sw: LatLng::new(a.latitude.min(b.latitude), a.longitude.min(b.longitude)),
            ne: LatLng::new(a.latitude.max(b.latitude), a.longitude.max(b.longitude)),
        }
    }

    /// Bounds covering the entire world.
    pub fn world() -> Self {
        Self {
            sw: LatLng::new(-90.0, -180.0),
            ne: LatLng::new(90.0, 180.0),
        }
    }

    /// Bounds containing no coordinates at all.
    pub fn empty() -> Self {
        // Inverted corners; extending with hull() would fix them up.
        Self {
            sw: LatLng::new(90.0, 180.0),
            ne: LatLng::new(-90.0, -180.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sw.latitude > self.ne.latitude || self.sw.longitude > self.ne.longitude
    }

    pub fn south(&self) -> f64 {
        self.sw.latitude
    }

    pub fn west(&self) -> f64 {
        self.sw.longitude
    }

    pub fn north(&self) -> f64 {
        self.ne.latitude
    }

    pub fn east(&self) -> f64 {
        self.ne.longitude
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.sw.latitude + self.ne.latitude) / 2.0,
            (self.sw.longitude + self.ne.longitude) / 2.0,
        )
    }
}
