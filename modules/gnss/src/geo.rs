// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use geolocator::DistanceFilter;

/// Approximated distance in meters between two coordinates.
///
/// Uses an equirectangular projection, which is precise enough for the short
/// distances between consecutive fixes.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat = ((lat1 + lat2) / 2.0).to_radians();
    let dx = 111300.0 * lat.cos() * (lon1 - lon2);
    let dy = 111300.0 * (lat1 - lat2);
    (dx * dx + dy * dy).sqrt()
}

/// Initial bearing in degrees (0..360, clockwise from true north) from the
/// first to the second coordinate.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let delta_lon = (lon2 - lon1).to_radians();
    let y = delta_lon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Drops coordinates closer than the configured distance to the last
/// admitted one.
#[derive(Debug)]
pub struct MovementFilter {
    filter: DistanceFilter,
    last: Option<(f64, f64)>,
}

impl MovementFilter {
    pub fn new(filter: DistanceFilter) -> Self {
        MovementFilter { filter, last: None }
    }

    /// Returns `true` and remembers the coordinate if it passes the filter.
    pub fn admit(&mut self, latitude: f64, longitude: f64) -> bool {
        if let (DistanceFilter::Meters(min), Some((lat, lon))) = (self.filter, self.last)
            && distance(lat, lon, latitude, longitude) < min
        {
            return false;
        }
        self.last = Some((latitude, longitude));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_of_one_latitude_millidegree() {
        let d = distance(52.0, 11.0, 52.001, 11.0);
        assert!((d - 111.3).abs() < 0.01, "distance was {}", d);
    }

    #[test]
    fn bearing_of_cardinal_directions() {
        assert!((bearing(52.0, 11.0, 52.1, 11.0) - 0.0).abs() < 1e-6);
        assert!((bearing(52.0, 11.0, 52.0, 11.1) - 90.0).abs() < 0.1);
        assert!((bearing(52.0, 11.0, 51.9, 11.0) - 180.0).abs() < 1e-6);
        assert!((bearing(52.0, 11.0, 52.0, 10.9) - 270.0).abs() < 0.1);
    }

    #[test]
    fn movement_filter_drops_close_coordinates() {
        let mut filter = MovementFilter::new(DistanceFilter::Meters(50.0));
        assert!(filter.admit(52.0, 11.0));
        assert!(!filter.admit(52.0001, 11.0));
        assert!(filter.admit(52.001, 11.0));
        assert!(!filter.admit(52.0012, 11.0));
    }

    #[test]
    fn movement_filter_without_distance_admits_everything() {
        let mut filter = MovementFilter::new(DistanceFilter::None);
        assert!(filter.admit(52.0, 11.0));
        assert!(filter.admit(52.0, 11.0));
    }
}
