// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of the last known location of the device.
///
/// Every measured value is optional. A field is `None` until a source reading
/// carrying a valid value for it has been merged into the snapshot. Fields that
/// a later reading does not carry keep the value of the previous snapshot.
///
/// # Example
///
/// ```rust
/// use common::position::Position;
///
/// let pos = Position::default();
/// assert!(pos.latitude().is_none());
/// assert!(pos.heading().is_none());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    altitude: Option<f64>,
    altitude_accuracy: Option<f64>,
    speed: Option<f64>,
    heading: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
}

impl Position {
    /// Creates a snapshot with a horizontal fix and nothing else.
    ///
    /// # Arguments
    ///
    /// * `latitude` – Latitude in decimal degrees. Positive for northern hemisphere.
    /// * `longitude` – Longitude in decimal degrees. Positive for eastern hemisphere.
    /// * `accuracy` – Radius of the horizontal uncertainty in meters.
    /// * `timestamp` – Time of the fix in UTC.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: DateTime<Utc>) -> Self {
        Position {
            latitude: Some(latitude),
            longitude: Some(longitude),
            accuracy: Some(accuracy),
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Returns a copy of this snapshot with the valid parts of `fix` applied.
    ///
    /// Latitude, longitude and accuracy are taken only for a non negative
    /// horizontal accuracy, altitude only for a non negative vertical accuracy
    /// and speed only when it is non negative. The timestamp always follows
    /// the fix.
    pub fn with_fix(&self, fix: &RawFix) -> Position {
        let mut next = *self;
        if fix.horizontal_accuracy >= 0.0 {
            next.latitude = Some(fix.latitude);
            next.longitude = Some(fix.longitude);
            next.accuracy = Some(fix.horizontal_accuracy);
        }
        if fix.vertical_accuracy >= 0.0 {
            next.altitude = Some(fix.altitude);
            next.altitude_accuracy = Some(fix.vertical_accuracy);
        }
        if fix.speed >= 0.0 {
            next.speed = Some(fix.speed);
        }
        next.timestamp = Some(fix.timestamp);
        next
    }

    /// Returns a copy of this snapshot with the heading replaced.
    pub fn with_heading(&self, heading: &RawHeading) -> Position {
        Position {
            heading: Some(heading.true_heading),
            ..*self
        }
    }

    /// Latitude in decimal degrees.
    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    /// Longitude in decimal degrees.
    pub fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    /// Horizontal accuracy in meters.
    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    /// Altitude above sea level in meters.
    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    /// Vertical accuracy in meters.
    pub fn altitude_accuracy(&self) -> Option<f64> {
        self.altitude_accuracy
    }

    /// Speed in meters per second.
    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    /// Heading in degrees relative to true north.
    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Returns `true` if a horizontal fix has been merged into this snapshot.
    pub fn has_fix(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// A single location reading as reported by a location source.
///
/// Negative accuracies and a negative speed mark the matching values as
/// invalid for this reading.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

impl RawFix {
    /// Creates a horizontal-only reading. Altitude and speed are flagged invalid.
    pub fn horizontal(
        latitude: f64,
        longitude: f64,
        horizontal_accuracy: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        RawFix {
            latitude,
            longitude,
            altitude: 0.0,
            horizontal_accuracy,
            vertical_accuracy: -1.0,
            speed: -1.0,
            timestamp,
        }
    }

    /// Returns `true` if the reading carries a usable horizontal position.
    pub fn has_valid_horizontal(&self) -> bool {
        self.horizontal_accuracy >= 0.0
    }
}

/// A compass reading as reported by a location source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawHeading {
    /// Heading in degrees relative to true north.
    pub true_heading: f64,
    /// Maximum deviation in degrees. Negative if the reading can't be trusted.
    pub accuracy: f64,
}
