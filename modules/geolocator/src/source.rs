// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Interface between the geolocator and the location hardware.
//!
//! A [`SourceFactory`] creates one [`LocationSource`] per listening session or
//! per single acquisition. Every source reports its readings as
//! [`SourceEvent`]s through the channel it was created with. The receiving side
//! of that channel is owned by whoever started the source, so callbacks are
//! always handled on the owner's task.

use common::position::{RawFix, RawHeading};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Channel end a source reports its events to.
pub type SourceSink = UnboundedSender<SourceEvent>;

/// Callback events of a location source.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    /// One or more new fixes, oldest first.
    FixesUpdated(Vec<RawFix>),
    /// A new compass reading. `None` if the reading is invalid.
    HeadingUpdated(Option<RawHeading>),
    /// The platform authorization for location access changed.
    AuthorizationChanged(AuthorizationStatus),
    /// The source failed to determine the location.
    HardFailure(FailureCause),
    /// A scheduled deferral ended, optionally because of an error.
    DeferralFinished(Option<String>),
}

/// Authorization state of the location access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
    AuthorizedWhenInUse,
}

impl AuthorizationStatus {
    /// Returns `true` if the platform refuses location access.
    pub fn is_denied(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted
        )
    }

    /// Returns `true` if location access has been granted.
    pub fn is_authorized(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::AuthorizedAlways | AuthorizationStatus::AuthorizedWhenInUse
        )
    }
}

/// Reason of a hard failure reported by a source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureCause {
    /// The location couldn't be determined because of a connectivity problem.
    Network,
    /// The location is temporarily unknown.
    LocationUnknown,
    /// The heading couldn't be determined, e.g. magnetic interference.
    HeadingFailure,
    /// Any other platform specific failure.
    Other(String),
}

/// Accuracy a source is asked to deliver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Accuracy {
    /// Highest accuracy the hardware can provide.
    Best,
    /// Accuracy radius in meters.
    Meters(f64),
}

/// Minimum horizontal movement before a source reports a new fix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DistanceFilter {
    /// Report every fix.
    None,
    /// Report a fix only after moving at least this many meters.
    Meters(f64),
}

/// Optional platform features, supplied by the host environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The source can defer updates until a distance or time threshold.
    pub deferred_updates: bool,
    /// The source supports significant change monitoring.
    pub significant_changes: bool,
    /// The source honors [`LocationSource::set_allows_background_updates`].
    pub background_updates: bool,
    /// The source honors [`LocationSource::set_pauses_automatically`].
    pub pause_updates: bool,
}

impl Capabilities {
    /// Every optional feature available.
    pub fn all() -> Self {
        Capabilities {
            deferred_updates: true,
            significant_changes: true,
            background_updates: true,
            pause_updates: true,
        }
    }
}

/// A single instance of the location hardware.
///
/// Features behind a [`Capabilities`] flag have a no-op default so sources
/// without them only implement the mandatory part.
pub trait LocationSource: Send {
    fn start_updates(&mut self);
    fn stop_updates(&mut self);

    fn start_heading_updates(&mut self) {}
    fn stop_heading_updates(&mut self) {}

    fn start_significant_change_updates(&mut self) {}
    fn stop_significant_change_updates(&mut self) {}

    /// Asks the source to hold back fixes until `max_distance` meters were
    /// travelled or `max_time` passed. `None` means unbounded.
    fn schedule_deferred_updates(&mut self, _max_distance: Option<f64>, _max_time: Option<Duration>) {
    }
    fn cancel_deferred_updates(&mut self) {}

    fn set_desired_accuracy(&mut self, accuracy: Accuracy);
    fn set_distance_filter(&mut self, filter: DistanceFilter);
    fn set_pauses_automatically(&mut self, _pauses: bool) {}
    fn set_allows_background_updates(&mut self, _allowed: bool) {}
}

/// Creates location sources and answers platform wide queries.
pub trait SourceFactory: Send + Sync {
    /// Creates a new, stopped source that reports its events to `sink`.
    fn create(&self, sink: SourceSink) -> Box<dyn LocationSource>;

    /// Returns `true` if the platform provides compass headings.
    fn heading_available(&self) -> bool;

    /// Returns the current authorization status of the location access.
    fn authorization_status(&self) -> AuthorizationStatus;
}
