// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Translation of source failures into geolocation errors.
//!
//! Only a denied authorization and connectivity failures are reported to
//! callers. Every other failure cause of a source is logged and dropped.

use crate::source::{AuthorizationStatus, FailureCause};
use common::error::GeolocationError;
use tracing::debug;

/// Returns the error an authorization change causes, if any.
pub fn authorization_error(status: AuthorizationStatus) -> Option<GeolocationError> {
    if status.is_denied() {
        return Some(GeolocationError::Unauthorized);
    }
    debug!("Authorization changed to {:?}", status);
    None
}

/// Returns the error a hard failure causes, if any.
pub fn failure_error(cause: &FailureCause) -> Option<GeolocationError> {
    match cause {
        FailureCause::Network => Some(GeolocationError::PositionUnavailable),
        _ => {
            debug!("Suppressed location source failure {:?}", cause);
            None
        }
    }
}
