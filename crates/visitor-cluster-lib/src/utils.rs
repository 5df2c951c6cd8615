//! Utility functions for geographic distances and coordinate validation

use geo::Point;

/// Mean Earth radius in kilometers used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Valid latitude range in degrees
pub const MAX_LATITUDE: f64 = 90.0;

/// Valid longitude range in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

/// Great-circle distance between two WGS84 positions in kilometers
///
/// # Arguments
/// * `lat1`, `lon1` - First position in degrees
/// * `lat2`, `lon2` - Second position in degrees
///
/// # Returns
/// The haversine distance on a sphere of radius [`EARTH_RADIUS_KM`]
#[inline(always)]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = ((delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2))
    .min(1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Haversine distance between two points (x = longitude, y = latitude) in kilometers
#[inline(always)]
pub fn point_distance_km(a: &Point<f64>, b: &Point<f64>) -> f64 {
    haversine_km(a.y(), a.x(), b.y(), b.x())
}

/// Check that a latitude/longitude pair is finite and inside the WGS84 ranges
#[inline(always)]
pub fn is_valid_wgs84(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat)
        && (-MAX_LONGITUDE..=MAX_LONGITUDE).contains(&lon)
}
