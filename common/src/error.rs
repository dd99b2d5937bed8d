// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Error types of the geolocation provider

/// Result type alias for geolocation operations
pub type Result<T> = std::result::Result<T, GeolocationError>;

/// Errors reported by the geolocation provider
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GeolocationError {
    /// The caller passed an argument outside of the accepted range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A listening session is already active
    #[error("Already listening")]
    AlreadyListening,

    /// The platform denied access to the location
    #[error("Access to the location is not authorized")]
    Unauthorized,

    /// The location couldn't be determined because of a connectivity failure
    #[error("Position unavailable")]
    PositionUnavailable,

    /// No position was acquired before the deadline elapsed
    #[error("Position request timed out")]
    Timeout,

    /// The position request was cancelled
    #[error("Position request cancelled")]
    Cancelled,
}
