// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use crate::position::{RawFix, RawHeading};
use chrono::{DateTime, TimeZone, Utc};

/// Fixed reference time used by the sample readings.
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 8, 10, 34, 48)
        .single()
        .unwrap_or_default()
}

/// A complete reading with valid horizontal, vertical and speed values.
pub fn full_fix() -> RawFix {
    RawFix {
        latitude: 52.0270889,
        longitude: 11.2803483,
        altitude: 110.0,
        horizontal_accuracy: 5.0,
        vertical_accuracy: 8.0,
        speed: 12.5,
        timestamp: reference_time(),
    }
}

/// A reading with a valid horizontal fix of the given accuracy, taken
/// `offset_secs` after [`reference_time`].
pub fn fix_with_accuracy(accuracy: f64, offset_secs: i64) -> RawFix {
    RawFix::horizontal(
        52.0298205,
        11.2741851,
        accuracy,
        reference_time() + chrono::Duration::seconds(offset_secs),
    )
}

/// A reading where every value is flagged invalid.
pub fn invalid_fix() -> RawFix {
    RawFix {
        latitude: 0.0,
        longitude: 0.0,
        altitude: 0.0,
        horizontal_accuracy: -1.0,
        vertical_accuracy: -1.0,
        speed: -1.0,
        timestamp: reference_time() + chrono::Duration::seconds(1),
    }
}

pub fn heading(true_heading: f64) -> RawHeading {
    RawHeading {
        true_heading,
        accuracy: 5.0,
    }
}
