use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Rough metres per degree of latitude, used for probe offsets only.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Shifts the point by the given number of metres north and east.
    pub fn offset_meters(&self, north: f64, east: f64) -> LatLng {
        let lat = self.lat + north / METERS_PER_DEGREE;
        let lng = self.lng + east / (METERS_PER_DEGREE * self.lat.to_radians().cos());
        LatLng { lat, lng }
    }

    pub fn distance_to(&self, other: &LatLng) -> f64 {
        haversine(self, other)
    }
}

/// Great-circle distance in metres.
pub fn haversine(from: &LatLng, to: &LatLng) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_phi = (to.lat - from.lat).to_radians();
    let d_lambda = (to.lng - from.lng).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}
