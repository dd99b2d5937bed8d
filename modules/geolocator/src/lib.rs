// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Geolocation provider
//!
//! Turns the callbacks of a location source into single position requests
//! and a continuous stream of position changes on the event bus.

pub mod acquisition;
pub mod aggregator;
pub mod gate;
mod geolocator;
pub mod session;
pub mod source;
pub mod test_helper;
pub mod waiters;

pub use geolocator::{Geolocator, GeolocatorHandle, SessionStatus};
pub use session::{DeferralState, ListenRequest};
pub use source::{
    Accuracy, AuthorizationStatus, Capabilities, DistanceFilter, FailureCause, LocationSource,
    SourceEvent, SourceFactory, SourceSink,
};
