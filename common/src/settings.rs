// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Power related options of a single listening session.
///
/// The settings are only valid for the session they were passed to and are
/// discarded when that session stops.
///
/// # Example
///
/// ```rust
/// use common::settings::EnergySettings;
///
/// let settings = EnergySettings {
///     defer_location_updates: true,
///     deferral_distance_meters: Some(500.0),
///     ..Default::default()
/// };
/// assert!(!settings.listen_for_significant_changes);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnergySettings {
    /// Let the source batch fixes until a distance or time threshold is reached.
    pub defer_location_updates: bool,
    /// Use the low power, coarse significant change monitoring instead of
    /// standard updates.
    pub listen_for_significant_changes: bool,
    /// Distance that has to be travelled before deferred fixes are delivered.
    /// `None` means no distance limit.
    pub deferral_distance_meters: Option<f64>,
    /// Time that has to pass before deferred fixes are delivered.
    /// `None` means no time limit.
    pub deferral_time: Option<Duration>,
}

/// Provider wide configuration.
///
/// Missing JSON keys fall back to the [`Default`] values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocatorConfig {
    /// Accuracy in meters a single acquisition has to reach before it resolves.
    pub desired_accuracy_meters: f64,
    /// Allow the source to pause updates when the device doesn't move.
    pub pauses_automatically: bool,
    /// Keep delivering updates while the host application is in the background.
    pub allows_background_updates: bool,
}

impl Default for GeolocatorConfig {
    fn default() -> Self {
        GeolocatorConfig {
            desired_accuracy_meters: 100.0,
            pauses_automatically: false,
            allows_background_updates: false,
        }
    }
}

impl GeolocatorConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
