//! Great-circle distance, used to check decoded coordinates against the
//! builder's inputs.

const EARTH_RADIUS: f64 = 6_371_000.0;

/// Haversine distance in meters.
pub fn great_circle_distance(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> f64 {
    let sin_lat_2 = ((lat0 - lat1).to_radians() / 2.0).sin();
    let sin_lon_2 = ((lon0 - lon1).to_radians() / 2.0).sin();
    let h = sin_lat_2 * sin_lat_2
        + lat0.to_radians().cos() * lat1.to_radians().cos() * sin_lon_2 * sin_lon_2;
    EARTH_RADIUS * 2.0 * h.sqrt().asin()
}
